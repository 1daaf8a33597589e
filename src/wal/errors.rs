//! Log-format error types
//!
//! Error codes:
//! - PUMP_WAL_CORRUPTION (FATAL severity)
//! - PUMP_WAL_TRUNCATED (FATAL severity)
//! - PUMP_WAL_BAD_LINK (FATAL severity)
//!
//! Every log-format violation is fatal: the wire format assumption was
//! broken and no safe continuation exists.

use std::fmt;

use super::address::LogAddress;

/// Severity levels for log-format errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, run continues
    Error,
    /// The replay run must terminate
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

/// Log-format error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogErrorCode {
    /// Page checksum mismatch, unknown record kind, malformed sub-header
    PumpWalCorruption,
    /// A read ran past the end of a page, buffer, or the fetched window
    PumpWalTruncated,
    /// A header address link contradicts the log ordering
    PumpWalBadLink,
}

impl LogErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            LogErrorCode::PumpWalCorruption => "PUMP_WAL_CORRUPTION",
            LogErrorCode::PumpWalTruncated => "PUMP_WAL_TRUNCATED",
            LogErrorCode::PumpWalBadLink => "PUMP_WAL_BAD_LINK",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        // All three indicate a violated wire-format assumption.
        Severity::Fatal
    }
}

impl fmt::Display for LogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Log-format error with positional context
#[derive(Debug, Clone)]
pub struct LogError {
    code: LogErrorCode,
    message: String,
    /// Log address at which the violation was detected, if known
    address: Option<LogAddress>,
}

impl LogError {
    /// Create a corruption error with no positional context
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::PumpWalCorruption,
            message: message.into(),
            address: None,
        }
    }

    /// Create a corruption error pinned to a log address
    pub fn corruption_at(address: LogAddress, message: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::PumpWalCorruption,
            message: message.into(),
            address: Some(address),
        }
    }

    /// Create a truncation error
    pub fn truncated(message: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::PumpWalTruncated,
            message: message.into(),
            address: None,
        }
    }

    /// Create a truncation error pinned to a log address
    pub fn truncated_at(address: LogAddress, message: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::PumpWalTruncated,
            message: message.into(),
            address: Some(address),
        }
    }

    /// Create a bad-link error pinned to the offending record's address
    pub fn bad_link(address: LogAddress, message: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::PumpWalBadLink,
            message: message.into(),
            address: Some(address),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> LogErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the address at which the violation was detected
    pub fn address(&self) -> Option<LogAddress> {
        self.address
    }

    /// Returns whether this error must terminate the run
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(address) = self.address {
            write!(f, " (at {})", address)?;
        }
        Ok(())
    }
}

impl std::error::Error for LogError {}

/// Result type for log-format operations
pub type LogResult<T> = Result<T, LogError>;
