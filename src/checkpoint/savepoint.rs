//! Savepoint marker file handling
//!
//! The savepoint records the last fully processed and executed log position
//! of one rebalance run:
//! - group_id / migrator_id: the run's identity
//! - synced_page_id / synced_offset: address of the next record to interpret
//! - saved_at: RFC3339 timestamp
//! - format_version: always 1
//!
//! The marker is written after every transaction boundary whose effects
//! reached the destination, and read once at startup to resume. A marker
//! belonging to a different group or migrator is refused rather than
//! silently ignored: replaying someone else's position corrupts both shards.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{SavepointError, SavepointResult};
use crate::wal::{GroupId, LogAddress, MigratorId};

/// Savepoint marker data structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Savepoint {
    /// Shard group being migrated
    pub group_id: GroupId,

    /// Migrator that owns this savepoint
    pub migrator_id: MigratorId,

    /// Page id of the next record to interpret
    pub synced_page_id: u64,

    /// Body offset of the next record to interpret
    pub synced_offset: u32,

    /// Timestamp when the savepoint was persisted (RFC3339 format)
    pub saved_at: String,

    /// Format version (always 1)
    pub format_version: u8,
}

impl Savepoint {
    /// Create a savepoint for the given run identity and position.
    pub fn new(group_id: GroupId, migrator_id: MigratorId, synced: LogAddress) -> Self {
        Self {
            group_id,
            migrator_id,
            synced_page_id: synced.page_id,
            synced_offset: synced.offset,
            saved_at: chrono::Utc::now().to_rfc3339(),
            format_version: 1,
        }
    }

    /// The stored position as a log address.
    pub fn synced_address(&self) -> LogAddress {
        LogAddress::new(self.synced_page_id, self.synced_offset)
    }

    /// Serializes the savepoint to JSON
    pub fn to_json(&self) -> SavepointResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SavepointError::new(format!("failed to serialize savepoint: {}", e)))
    }

    /// Deserializes a savepoint from JSON
    pub fn from_json(json: &str) -> SavepointResult<Self> {
        let savepoint: Savepoint = serde_json::from_str(json)
            .map_err(|e| SavepointError::new(format!("failed to parse savepoint: {}", e)))?;
        if savepoint.format_version != 1 {
            return Err(SavepointError::new(format!(
                "unsupported savepoint format version: {}",
                savepoint.format_version
            )));
        }
        Ok(savepoint)
    }
}

/// Durable store for one run's savepoint marker file.
#[derive(Debug)]
pub struct SavepointStore {
    path: PathBuf,
}

impl SavepointStore {
    /// Create a store backed by the given marker file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the marker file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored savepoint, if the marker file exists.
    ///
    /// Verifies the marker belongs to the given run identity.
    pub fn load(
        &self,
        group_id: GroupId,
        migrator_id: MigratorId,
    ) -> SavepointResult<Option<Savepoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path).map_err(|e| {
            SavepointError::io(
                format!("failed to read savepoint file: {}", self.path.display()),
                e,
            )
        })?;
        let savepoint = Savepoint::from_json(&json)?;
        if savepoint.group_id != group_id || savepoint.migrator_id != migrator_id {
            return Err(SavepointError::new(format!(
                "savepoint identity mismatch: file is for group {} migrator {}, run is group {} migrator {}",
                savepoint.group_id, savepoint.migrator_id, group_id, migrator_id
            )));
        }
        Ok(Some(savepoint))
    }

    /// Persist a savepoint with fsync.
    ///
    /// The marker must be durable before the position it records is treated
    /// as applied; crash recovery resumes from whatever this file says.
    pub fn persist(&self, savepoint: &Savepoint) -> SavepointResult<()> {
        let json = savepoint.to_json()?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    SavepointError::io(
                        format!("failed to create savepoint directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let mut file = File::create(&self.path).map_err(|e| {
            SavepointError::io(
                format!("failed to create savepoint file: {}", self.path.display()),
                e,
            )
        })?;

        file.write_all(json.as_bytes()).map_err(|e| {
            SavepointError::io(
                format!("failed to write savepoint file: {}", self.path.display()),
                e,
            )
        })?;

        // fsync is mandatory
        file.sync_all().map_err(|e| {
            SavepointError::io(
                format!("failed to fsync savepoint file: {}", self.path.display()),
                e,
            )
        })?;

        Ok(())
    }
}
