//! Sorter errors

use thiserror::Error;

pub type SorterResult<T> = Result<T, SorterError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SorterError {
    /// The transaction set has no entry without dependencies
    #[error("no genesis transaction found among {count} transactions")]
    NoGenesisTransaction { count: usize },
}
