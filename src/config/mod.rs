//! Rebalance run configuration
//!
//! Configured externally (file, env, CLI, all outside this crate), immutable
//! after startup. A run replays exactly one shard group on behalf of exactly
//! one migrator; both identities are required and validated up front.

use std::fmt;
use std::time::Duration;

use crate::wal::{GroupId, MigratorId};

/// Configuration error raised by [`RebalanceConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The validation failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rebalance config: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Immutable configuration of one replication run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceConfig {
    /// Shard group being migrated; rows tagged with any other group are
    /// decoded only far enough to be skipped.
    pub group_id: GroupId,

    /// This migrator's identity. The run stops when the log carries a
    /// rebalance marker matching both this id and `group_id`.
    pub migrator_id: MigratorId,

    /// Maximum number of log pages fetched per round trip.
    pub max_window_pages: usize,

    /// Maximum tolerated replication delay. The run fails once the source
    /// outruns the pump beyond both this time budget and the page window.
    pub max_delay: Duration,

    /// Sleep between fetch attempts while caught up, and between delay
    /// governor retries.
    pub poll_interval: Duration,

    /// Bounded retry count for the delay governor and for page fetches.
    pub max_retries: u32,
}

impl RebalanceConfig {
    /// Create a configuration with defaults for the pacing knobs.
    pub fn new(group_id: GroupId, migrator_id: MigratorId) -> Self {
        Self {
            group_id,
            migrator_id,
            max_window_pages: 64,
            poll_interval: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            max_retries: 10,
        }
    }

    /// Override the page window size.
    pub fn with_window_pages(mut self, pages: usize) -> Self {
        self.max_window_pages = pages;
        self
    }

    /// Override the maximum tolerated delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Override the caught-up poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the bounded retry count.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_window_pages == 0 {
            return Err(ConfigError::new("max_window_pages must be at least 1"));
        }
        if self.max_delay.is_zero() {
            return Err(ConfigError::new("max_delay must be non-zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::new("poll_interval must be non-zero"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::new("max_retries must be at least 1"));
        }
        Ok(())
    }
}
