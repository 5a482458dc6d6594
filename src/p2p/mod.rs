//! P2P module - peer set bookkeeping and per-peer replication tasks

mod peer;
mod replicator;

pub use peer::*;
pub use replicator::*;
