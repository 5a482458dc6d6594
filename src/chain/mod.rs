//! Chain module - mempool and the chain manager

mod manager;
mod mempool;

pub use manager::*;
pub use mempool::*;
