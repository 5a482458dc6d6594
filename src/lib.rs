//! CRD ledger core library
//!
//! An account-based proof-of-work ledger carrying typed asset messages,
//! with bounded reorganization, difficulty retargeting with a message
//! bonus, and HTTP gossip/pull replication between peers.

pub mod asset;
pub mod chain;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod events;
pub mod message;
pub mod mining;
pub mod node;
pub mod p2p;
pub mod rpc;
pub mod state;
pub mod storage;

/// Protocol constants - HARD-CODED, NEVER CONFIGURABLE
pub mod constants {
    /// Base currency asset identifier
    pub const CRD: &str = "CRD";

    /// Block format version string
    pub const BLOCK_VERSION: &str = "0.0.1";

    /// Previous-hash sentinel for height-1 blocks
    pub const ZERO_HASH: &str = "0";

    /// Quantity paid out by every coinbase message
    pub const COINBASE_QUANTITY: u64 = 100;

    /// Number of blocks a message stays live after its start height
    pub const MESSAGE_TTL: u64 = 10;

    /// Depth of the undo-snapshot stack (maximum reorganization depth)
    pub const UNDO_HEIGHT: u64 = 10;

    /// Number of recent confirmed blocks kept in memory
    pub const CHARGE_SETTLE_BLOCKS: u64 = 100;

    /// Upper bound on messages per block, and on the pending mempool
    pub const MESSAGES_PER_BLOCK_MAX: usize = 10_000;

    /// Difficulty floor
    pub const MIN_DIFFICULTY: f64 = 1000.0;

    /// Retarget window size (blocks), also the timestamp-median window
    pub const TARGET_BLOCKS: usize = 10;

    /// Target wall-clock time for one retarget window, in milliseconds
    pub const TARGET_TIME: u64 = 600_000;

    /// Lower clamp on the retarget adjustment factor
    pub const TARGET_SWAY_MIN: f64 = 0.5;

    /// Upper clamp on the retarget adjustment factor
    pub const TARGET_SWAY_MAX: f64 = 2.0;

    /// Time budget for one proof-of-work round before yielding, in milliseconds
    pub const HASH_WORK_TIME: u64 = 20;

    /// Minimum number of enabled peers the replicator maintains
    pub const MIN_NUM_LIVE_PEERS: usize = 10;

    /// Delay before re-opening a failed peer listen stream, in milliseconds
    pub const PEER_RETRY_DELAY: u64 = 1_000;

    /// Interval between peer pull rounds, in milliseconds
    pub const PEER_PULL_INTERVAL: u64 = 30_000;
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
