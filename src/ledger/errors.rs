//! Ledger error types
//!
//! Error codes:
//! - LEDGER_APPEND_FAILED (ERROR severity)
//! - LEDGER_IO (ERROR severity)
//! - LEDGER_CORRUPTION (FATAL severity)
//!
//! Corruption halts the load. No record after a corrupt one is replayed and
//! no repair is attempted.

use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation fails, the store stays usable
    Error,
    /// The ledger cannot be trusted until inspected
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorCode {
    /// A record could not be appended (write failure or duplicate key)
    LedgerAppendFailed,
    /// A record failed its checksum or structural validation
    LedgerCorruption,
    /// Reading or creating ledger files failed
    LedgerIo,
}

impl LedgerErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerErrorCode::LedgerAppendFailed => "LEDGER_APPEND_FAILED",
            LedgerErrorCode::LedgerCorruption => "LEDGER_CORRUPTION",
            LedgerErrorCode::LedgerIo => "LEDGER_IO",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            LedgerErrorCode::LedgerAppendFailed => Severity::Error,
            LedgerErrorCode::LedgerCorruption => Severity::Fatal,
            LedgerErrorCode::LedgerIo => Severity::Error,
        }
    }
}

impl fmt::Display for LedgerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug)]
pub struct LedgerError {
    code: LedgerErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl LedgerError {
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LedgerErrorCode::LedgerAppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// An append rejected because a record with the same key exists.
    pub fn duplicate(kind: &str, key: impl fmt::Display) -> Self {
        Self {
            code: LedgerErrorCode::LedgerAppendFailed,
            message: format!("duplicate {}", kind),
            details: Some(format!("key: {}", key)),
            source: None,
        }
    }

    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LedgerErrorCode::LedgerIo,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: LedgerErrorCode::LedgerCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: LedgerErrorCode::LedgerCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    pub fn corruption_at_sequence(sequence: u64, reason: impl Into<String>) -> Self {
        Self {
            code: LedgerErrorCode::LedgerCorruption,
            message: reason.into(),
            details: Some(format!("sequence_number: {}", sequence)),
            source: None,
        }
    }

    pub fn code(&self) -> LedgerErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
