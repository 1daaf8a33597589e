//! Savepoint error types

use std::fmt;
use std::io;

/// Savepoint persistence errors, code `PUMP_SAVEPOINT_FAILED`.
///
/// A savepoint failure is fatal for the run: continuing without a durable
/// resume position risks double-application after a crash.
#[derive(Debug)]
pub struct SavepointError {
    message: String,
    source: Option<io::Error>,
}

impl SavepointError {
    /// Create an error with no underlying IO cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an IO failure.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns the string code.
    pub fn code(&self) -> &'static str {
        "PUMP_SAVEPOINT_FAILED"
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SavepointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[FATAL] {}: {}", self.code(), self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for SavepointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for savepoint operations
pub type SavepointResult<T> = Result<T, SavepointError>;
