//! Difficulty targets and retargeting
//!
//! Pure math: target derivation from a real-valued difficulty, the
//! per-hash work ratio, the ten-block retarget with clamped sway, the
//! message bonus discount, and the timestamp median rule.

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive};

use crate::constants::{
    MIN_DIFFICULTY, TARGET_BLOCKS, TARGET_SWAY_MAX, TARGET_SWAY_MIN, TARGET_TIME,
};
use crate::consensus::Block;
use crate::message::Message;

/// 2^256 - 1, the easiest possible target.
pub fn max_target() -> BigUint {
    (BigUint::one() << 256u32) - BigUint::one()
}

/// Target a hash must stay under for a claimed difficulty.
pub fn target_for(difficulty: f64) -> BigUint {
    let rounded = difficulty.round().max(1.0) as u64;
    max_target() / BigUint::from(rounded)
}

/// Whether a hex hash meets the target for `difficulty`.
pub fn meets_target(hash: &str, difficulty: f64) -> bool {
    match BigUint::parse_bytes(hash.as_bytes(), 16) {
        Some(value) => value <= target_for(difficulty),
        None => false,
    }
}

/// The hash value as a fraction of the maximum target, used for work
/// summation and the message bonus.
pub fn hash_difficulty(hash: &str) -> f64 {
    let Some(value) = BigUint::parse_bytes(hash.as_bytes(), 16) else {
        return 0.0;
    };
    let numerator = value.to_f64().unwrap_or(0.0);
    let denominator = max_target().to_f64().unwrap_or(f64::MAX);
    numerator / denominator
}

/// Accumulated work of a chain segment.
pub fn chain_work(blocks: &[Block]) -> f64 {
    blocks.iter().map(|b| hash_difficulty(&b.hash)).sum()
}

/// Difficulty discount granted for bundled messages.
pub fn message_bonus(messages: &[Message]) -> f64 {
    messages.iter().map(|m| hash_difficulty(&m.hash)).sum()
}

/// The last TARGET_BLOCKS of a chain slice.
pub fn retarget_window(blocks: &[Block]) -> &[Block] {
    let start = blocks.len().saturating_sub(TARGET_BLOCKS);
    &blocks[start..]
}

/// Base difficulty from the retarget window. Empty window yields 0,
/// overridden to MIN_DIFFICULTY at use sites.
pub fn base_difficulty(window: &[Block]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let min_ts = window.iter().map(|b| b.timestamp).min().unwrap_or(0);
    let max_ts = window.iter().map(|b| b.timestamp).max().unwrap_or(0);
    let elapsed = (max_ts - min_ts) as f64;
    let mean: f64 =
        window.iter().map(|b| b.difficulty).sum::<f64>() / window.len() as f64;
    let sway = (elapsed / TARGET_TIME as f64).clamp(TARGET_SWAY_MIN, TARGET_SWAY_MAX);
    (mean / sway).max(MIN_DIFFICULTY)
}

/// Difficulty a candidate block must claim: base minus message bonus,
/// floored at MIN_DIFFICULTY.
pub fn required_difficulty(blocks: &[Block], messages: &[Message]) -> f64 {
    let base = base_difficulty(retarget_window(blocks));
    (base - message_bonus(messages)).max(MIN_DIFFICULTY)
}

/// Median timestamp of the last TARGET_BLOCKS blocks. An even-sized
/// sample medians to the arithmetic mean of the two middle values.
pub fn median_timestamp(blocks: &[Block]) -> f64 {
    let window = retarget_window(blocks);
    if window.is_empty() {
        return 0.0;
    }
    let mut timestamps: Vec<u64> = window.iter().map(|b| b.timestamp).collect();
    timestamps.sort_unstable();
    let mid = timestamps.len() / 2;
    if timestamps.len() % 2 == 1 {
        timestamps[mid] as f64
    } else {
        (timestamps[mid - 1] as f64 + timestamps[mid] as f64) / 2.0
    }
}
