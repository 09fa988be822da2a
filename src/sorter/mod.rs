//! Transaction ordering
//!
//! - `heap`: generic binary min-heap
//! - `transaction_sorter`: deterministic topological sort with leaf detection

mod errors;
mod heap;
mod transaction_sorter;

pub use errors::{SorterError, SorterResult};
pub use heap::Heap;
pub use transaction_sorter::{sort_transactions, TransactionOrdering};
