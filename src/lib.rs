//! shardpump - online shard-rebalance log replay engine
//!
//! Tails a source node's write-ahead log, decodes every mutation that touches
//! the shard group being migrated, and replays those mutations as DML against
//! the destination node in original commit order.

pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod observability;
pub mod replication;
pub mod wal;
