//! Mining module - candidate assembly and bounded proof-of-work rounds

mod miner;

pub use miner::*;
