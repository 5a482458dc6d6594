//! Candidate assembly and proof-of-work
//!
//! A candidate is a coinbase paying the miner plus as many mempool
//! messages as still validate in block context. One mining round hashes
//! root-plus-nonce for at most HASH_WORK_TIME and then yields, so the
//! caller can refresh the tail and rebuild the candidate.

use std::time::{Duration, Instant};

use crate::chain::Mempool;
use crate::constants::{
    BLOCK_VERSION, COINBASE_QUANTITY, CRD, HASH_WORK_TIME, MESSAGES_PER_BLOCK_MAX, ZERO_HASH,
};
use crate::consensus::{meets_target, median_timestamp, required_difficulty, Block};
use crate::crypto::PrivateKey;
use crate::message::{validate_with_view, Message, Payload};
use crate::state::{Db, View};

/// Build a candidate block on the current tail.
///
/// Mempool messages are replayed through a projected view and only the
/// ones that still validate are included, so the candidate always passes
/// block validation. Invalid ones stay in the pool.
pub fn assemble(
    blocks: &[Block],
    db: &Db,
    mempool: &Mempool,
    miner_address: &str,
    now: u64,
) -> Block {
    let next_height = blocks.last().map(|b| b.height).unwrap_or(0) + 1;
    let prev_hash = blocks
        .last()
        .map(|b| b.hash.clone())
        .unwrap_or_else(|| ZERO_HASH.to_string());
    // never mine a timestamp the median rule would reject
    let timestamp = now.max(median_timestamp(blocks).ceil() as u64);

    let coinbase = Message::signed(
        &Payload::Coinbase {
            address: miner_address.to_string(),
            asset: CRD.to_string(),
            quantity: COINBASE_QUANTITY,
            start_height: next_height,
            timestamp,
        },
        &PrivateKey::null(),
    );

    let mut view = View::new(db.clone());
    let mut messages = Vec::with_capacity(1 + mempool.messages.len());
    view.apply_lossy(&coinbase);
    messages.push(coinbase);
    for message in &mempool.messages {
        if messages.len() >= MESSAGES_PER_BLOCK_MAX {
            break;
        }
        if validate_with_view(&view, next_height, message).is_ok() {
            view.apply_lossy(message);
            messages.push(message.clone());
        }
    }

    let difficulty = required_difficulty(blocks, &messages);
    Block {
        hash: String::new(),
        prev_hash,
        height: next_height,
        difficulty,
        version: BLOCK_VERSION.to_string(),
        timestamp,
        messages,
        nonce: 0,
    }
}

/// One bounded proof-of-work round over a candidate. Returns the solved
/// block, or `None` when the time budget runs out.
pub fn mine_round(mut candidate: Block) -> Option<Block> {
    let root = candidate.hash_root();
    let deadline = Instant::now() + Duration::from_millis(HASH_WORK_TIME);
    let mut nonce: u32 = 0;
    loop {
        let hash = Block::hash_with_nonce(&root, nonce);
        if meets_target(&hash, candidate.difficulty) {
            candidate.nonce = nonce;
            candidate.hash = hash;
            return Some(candidate);
        }
        if Instant::now() >= deadline {
            return None;
        }
        nonce = nonce.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::validate_block;
    use crate::constants::MIN_DIFFICULTY;

    fn solve(candidate: Block) -> Block {
        loop {
            if let Some(block) = mine_round(candidate.clone()) {
                return block;
            }
        }
    }

    #[test]
    fn test_genesis_candidate_mines_and_validates() {
        let db = Db::new();
        let candidate = assemble(&[], &db, &Mempool::default(), "miner", 1_000);
        assert_eq!(candidate.height, 1);
        assert_eq!(candidate.prev_hash, ZERO_HASH);
        assert_eq!(candidate.difficulty, MIN_DIFFICULTY);
        assert_eq!(candidate.messages.len(), 1);

        let block = solve(candidate);
        assert!(meets_target(&block.hash, block.difficulty));
        assert_eq!(validate_block(&block, &[], &db), Ok(()));
    }

    #[test]
    fn test_assembly_skips_invalid_mempool_messages() {
        let db = Db::new();
        // a stray coinbase sitting in the pool would make the candidate
        // carry two coinbases; assembly must skip it
        let stray_coinbase = Message::signed(
            &Payload::Coinbase {
                address: "m".into(),
                asset: CRD.into(),
                quantity: COINBASE_QUANTITY,
                start_height: 1,
                timestamp: 50,
            },
            &PrivateKey::null(),
        );
        let mempool = Mempool {
            blocks: vec![],
            messages: vec![stray_coinbase],
        };
        let candidate = assemble(&[], &db, &mempool, "miner", 1_000);
        assert_eq!(candidate.messages.len(), 1);
    }

    #[test]
    fn test_candidate_timestamp_respects_median() {
        let db = Db::new();
        let genesis = solve(assemble(&[], &db, &Mempool::default(), "m", 5_000));
        let blocks = vec![genesis];
        // wall clock behind the chain: the candidate clamps forward
        let candidate = assemble(&blocks, &db, &Mempool::default(), "m", 1_000);
        assert!(candidate.timestamp as f64 >= median_timestamp(&blocks));
    }
}
