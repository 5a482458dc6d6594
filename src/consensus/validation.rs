//! Block validation
//!
//! Ordered, pure checks against the parent chain and the tip snapshot.
//! The first failed check wins. Message checks run confirmed-only, with
//! the block's earlier messages as confirming siblings.

use crate::constants::{MESSAGES_PER_BLOCK_MAX, ZERO_HASH};
use crate::consensus::{
    median_timestamp, meets_target, required_difficulty, Block,
};
use crate::error::{ChainError, ChainResult};
use crate::message::validate_with_view;
use crate::state::{Db, View};

/// Validate a block that would extend `blocks`, whose tip state is `db`.
pub fn validate_block(block: &Block, blocks: &[Block], db: &Db) -> ChainResult<()> {
    if block.compute_hash() != block.hash {
        return Err(ChainError::InvalidHash);
    }

    let expected_prev = blocks.last().map(|b| b.hash.as_str()).unwrap_or(ZERO_HASH);
    if block.prev_hash != expected_prev {
        return Err(ChainError::InvalidPrevHash);
    }

    let expected_height = blocks.last().map(|b| b.height).unwrap_or(0) + 1;
    if block.height != expected_height {
        return Err(ChainError::InvalidHeight);
    }

    if !blocks.is_empty() && (block.timestamp as f64) < median_timestamp(blocks) {
        return Err(ChainError::InvalidTimestamp);
    }

    if !meets_target(&block.hash, block.difficulty) {
        return Err(ChainError::TargetNotMet);
    }

    if block.messages.len() > MESSAGES_PER_BLOCK_MAX {
        return Err(ChainError::TooManyMessages);
    }

    if block.difficulty < required_difficulty(blocks, &block.messages) {
        return Err(ChainError::DifficultyTooLow);
    }

    let mut view = View::new(db.clone());
    for message in &block.messages {
        validate_with_view(&view, block.height, message)?;
        view.apply(message)?;
    }
    Ok(())
}
