//! CLI-specific error types

use std::fmt;
use std::io;

use crate::config::SettingsError;
use crate::ledger::LedgerError;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Settings file or environment error
    ConfigError,
    /// I/O error (stdout/stderr)
    IoError,
    /// Ledger could not be opened or read
    LedgerError,
    /// A transaction failed validation
    IntegrityFailure,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "CLI_CONFIG_ERROR",
            Self::IoError => "CLI_IO_ERROR",
            Self::LedgerError => "CLI_LEDGER_ERROR",
            Self::IntegrityFailure => "CLI_INTEGRITY_FAILURE",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<SettingsError> for CliError {
    fn from(e: SettingsError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<LedgerError> for CliError {
    fn from(e: LedgerError) -> Self {
        Self::new(CliErrorCode::LedgerError, e.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Ledger(inner) => inner.into(),
            other if other.is_integrity_failure() => {
                Self::new(CliErrorCode::IntegrityFailure, other.to_string())
            }
            other => Self::new(CliErrorCode::LedgerError, other.to_string()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_errors_are_classified() {
        let err: CliError = StoreError::WrongSignature("t1".to_string()).into();
        assert_eq!(err.code(), CliErrorCode::IntegrityFailure);
        assert!(err.to_string().starts_with("CLI_INTEGRITY_FAILURE: "));

        let err: CliError = StoreError::SigningWithdrawn.into();
        assert_eq!(err.code(), CliErrorCode::LedgerError);
    }
}
