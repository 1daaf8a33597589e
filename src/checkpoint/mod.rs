//! Run savepoints
//!
//! A rebalance run is expected to crash and restart; the savepoint marker is
//! what makes the restart resume instead of re-apply. Only positions whose
//! transactions fully reached the destination are ever persisted.

mod errors;
mod savepoint;

pub use errors::{SavepointError, SavepointResult};
pub use savepoint::{Savepoint, SavepointStore};
