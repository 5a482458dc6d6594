//! Pending messages and stashed side-chain blocks

use serde::{Deserialize, Serialize};

use crate::consensus::Block;
use crate::message::Message;

/// The node's pending pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mempool {
    /// Side-chain blocks within the undo window, kept for fork tracing
    pub blocks: Vec<Block>,
    /// Messages accepted but not yet confirmed
    pub messages: Vec<Message>,
}

impl Mempool {
    /// Whether a block with this hash is stashed.
    pub fn contains_block(&self, hash: &str) -> bool {
        self.blocks.iter().any(|b| b.hash == hash)
    }

    /// Look up a stashed block by hash.
    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    /// Stash a side-chain block, deduplicating by hash.
    pub fn stash_block(&mut self, block: Block) {
        if !self.contains_block(&block.hash) {
            self.blocks.push(block);
        }
    }

    /// Drop every message a freshly confirmed block settled, matching by
    /// signature.
    pub fn evict_confirmed(&mut self, block: &Block) {
        self.messages
            .retain(|m| !block.messages.iter().any(|c| c.signature == m.signature));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BLOCK_VERSION, ZERO_HASH};
    use crate::crypto::PrivateKey;
    use crate::message::Payload;

    fn block_with(messages: Vec<Message>, hash: &str) -> Block {
        Block {
            hash: hash.into(),
            prev_hash: ZERO_HASH.into(),
            height: 1,
            difficulty: 1000.0,
            version: BLOCK_VERSION.into(),
            timestamp: 0,
            messages,
            nonce: 0,
        }
    }

    fn message(quantity: u64) -> Message {
        Message::signed(
            &Payload::Coinbase {
                address: "a".into(),
                asset: "CRD".into(),
                quantity,
                start_height: 1,
                timestamp: 0,
            },
            &PrivateKey::null(),
        )
    }

    #[test]
    fn test_stash_deduplicates() {
        let mut mempool = Mempool::default();
        mempool.stash_block(block_with(vec![], "aa"));
        mempool.stash_block(block_with(vec![], "aa"));
        assert_eq!(mempool.blocks.len(), 1);
        assert!(mempool.contains_block("aa"));
    }

    #[test]
    fn test_evict_by_signature() {
        let confirmed = message(100);
        let other = message(42);
        let mut mempool = Mempool {
            blocks: vec![],
            messages: vec![confirmed.clone(), other.clone()],
        };
        mempool.evict_confirmed(&block_with(vec![confirmed], "bb"));
        assert_eq!(mempool.messages, vec![other]);
    }
}
