//! Replay Error Types
//!
//! Taxonomy of terminal run errors:
//! - Corruption: wire-format assumption violated, no safe continuation
//! - Decompress: decompression or diff reconstruction failed
//! - PageFetch: the source stopped serving pages within the bounded retries
//! - DelayExceeded: the source outran the pump beyond the configured budget
//! - Execution: the destination rejected a statement batch
//! - Savepoint: the resume position could not be made durable
//! - InvalidConfig: the run was misconfigured
//!
//! Schema/table-not-found is deliberately absent: it is a counted skip, the
//! expected outcome for migrator-internal catalogs and out-of-group rows.

use std::fmt;

use crate::checkpoint::SavepointError;
use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::wal::LogError;

/// Replay error type
#[derive(Debug, Clone)]
pub struct ReplayError {
    /// Error kind
    pub kind: ReplayErrorKind,
    /// Error message
    pub message: String,
}

/// Replay error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayErrorKind {
    /// Wire-format corruption (bad links, unknown kinds, checksum failures,
    /// overflow overruns, short reads)
    Corruption,

    /// Decompression or diff-reconstruction failure
    Decompress,

    /// Page fetch failed
    PageFetch,

    /// Replication delay exceeded the configured budget
    DelayExceeded,

    /// Destination executor rejected a batch
    Execution,

    /// Savepoint persistence failed
    Savepoint,

    /// Invalid run configuration
    InvalidConfig,
}

impl ReplayErrorKind {
    /// Returns the string code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ReplayErrorKind::Corruption => "PUMP_CORRUPTION",
            ReplayErrorKind::Decompress => "PUMP_DECOMPRESS_FAILED",
            ReplayErrorKind::PageFetch => "PUMP_PAGE_FETCH_FAILED",
            ReplayErrorKind::DelayExceeded => "PUMP_DELAY_EXCEEDED",
            ReplayErrorKind::Execution => "PUMP_EXECUTION_FAILED",
            ReplayErrorKind::Savepoint => "PUMP_SAVEPOINT_FAILED",
            ReplayErrorKind::InvalidConfig => "PUMP_CONFIG_INVALID",
        }
    }
}

impl ReplayError {
    /// Create a new replay error.
    pub fn new(kind: ReplayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(ReplayErrorKind::Corruption, message)
    }

    /// Create a page-fetch error.
    pub fn page_fetch(message: impl Into<String>) -> Self {
        Self::new(ReplayErrorKind::PageFetch, message)
    }

    /// Create a delay-exceeded error.
    pub fn delay_exceeded(message: impl Into<String>) -> Self {
        Self::new(ReplayErrorKind::DelayExceeded, message)
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ReplayErrorKind::Execution, message)
    }

    /// Returns the string code.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Whether this error must terminate the run.
    ///
    /// Every replay error is terminal; the run restarts from the savepoint.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[FATAL] {}: {}", self.code(), self.message)
    }
}

impl std::error::Error for ReplayError {}

impl From<LogError> for ReplayError {
    fn from(err: LogError) -> Self {
        ReplayError::corruption(err.to_string())
    }
}

impl From<CodecError> for ReplayError {
    fn from(err: CodecError) -> Self {
        ReplayError::new(ReplayErrorKind::Decompress, err.to_string())
    }
}

impl From<SavepointError> for ReplayError {
    fn from(err: SavepointError) -> Self {
        ReplayError::new(ReplayErrorKind::Savepoint, err.to_string())
    }
}

impl From<ConfigError> for ReplayError {
    fn from(err: ConfigError) -> Self {
        ReplayError::new(ReplayErrorKind::InvalidConfig, err.to_string())
    }
}

/// Result type for replay operations
pub type ReplayResult<T> = Result<T, ReplayError>;
