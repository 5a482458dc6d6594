//! Block model and canonical hashing
//!
//! The canonical hash is a two-stage digest. The root commits to the
//! header fields and the message JSONs; the final hash appends the nonce,
//! so mining re-hashes only root-plus-nonce. Height, difficulty and
//! timestamp are framed as four little-endian bytes even though they are
//! logically wider.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::crypto::{sha256, sha256_hex};
use crate::message::Message;

/// One chain block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Canonical hash, lowercase hex
    pub hash: String,
    /// Parent hash, or the literal "0" for height 1
    pub prev_hash: String,
    /// 1-based chain height
    pub height: u64,
    /// Claimed difficulty; real-valued after retargeting
    pub difficulty: f64,
    /// Block format version
    pub version: String,
    /// Wall-clock milliseconds
    pub timestamp: u64,
    /// Confirmed messages, in application order
    pub messages: Vec<Message>,
    /// Proof-of-work nonce
    pub nonce: u32,
}

impl Block {
    /// Stage-one digest over header fields and message JSONs.
    pub fn hash_root(&self) -> [u8; 32] {
        let mut data = Vec::new();
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.push(b':');
        data.extend_from_slice(&(self.height as u32).to_le_bytes());
        data.push(b':');
        data.extend_from_slice(&(self.difficulty.round() as u32).to_le_bytes());
        data.push(b':');
        data.extend_from_slice(self.version.as_bytes());
        data.push(b':');
        data.extend_from_slice(&(self.timestamp as u32).to_le_bytes());
        data.push(b':');
        let joined = self
            .messages
            .iter()
            .map(Message::to_json)
            .collect::<Vec<_>>()
            .join("\n");
        data.extend_from_slice(joined.as_bytes());
        data.push(b':');
        sha256(&data)
    }

    /// Stage-two digest: root plus a candidate nonce, hex.
    pub fn hash_with_nonce(root: &[u8; 32], nonce: u32) -> String {
        let mut data = Vec::with_capacity(36);
        data.extend_from_slice(root);
        data.extend_from_slice(&nonce.to_le_bytes());
        sha256_hex(&data)
    }

    /// Recompute the canonical hash from scratch.
    pub fn compute_hash(&self) -> String {
        Self::hash_with_nonce(&self.hash_root(), self.nonce)
    }

    /// The hashes of the messages this block confirms.
    pub fn message_hashes(&self) -> HashSet<String> {
        self.messages.iter().map(|m| m.hash.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BLOCK_VERSION, ZERO_HASH};

    fn bare_block() -> Block {
        Block {
            hash: String::new(),
            prev_hash: ZERO_HASH.to_string(),
            height: 1,
            difficulty: 1000.0,
            version: BLOCK_VERSION.to_string(),
            timestamp: 1_700_000_000_000,
            messages: vec![],
            nonce: 0,
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let block = bare_block();
        assert_eq!(block.compute_hash(), block.compute_hash());
    }

    #[test]
    fn test_nonce_changes_hash_but_not_root() {
        let mut block = bare_block();
        let hash_zero = block.compute_hash();
        let root = block.hash_root();
        block.nonce = 1;
        assert_eq!(block.hash_root(), root);
        assert_ne!(block.compute_hash(), hash_zero);
    }

    #[test]
    fn test_every_header_field_is_committed() {
        let base = bare_block();
        let mut by_height = base.clone();
        by_height.height = 2;
        let mut by_difficulty = base.clone();
        by_difficulty.difficulty = 2000.0;
        let mut by_timestamp = base.clone();
        by_timestamp.timestamp += 1;
        let mut by_prev = base.clone();
        by_prev.prev_hash = "ff".into();
        for changed in [by_height, by_difficulty, by_timestamp, by_prev] {
            assert_ne!(changed.compute_hash(), base.compute_hash());
        }
    }

    #[test]
    fn test_fractional_difficulty_rounds_in_framing() {
        let mut a = bare_block();
        let mut b = bare_block();
        a.difficulty = 1000.2;
        b.difficulty = 1000.4;
        // both round to 1000 in the framing
        assert_eq!(a.compute_hash(), b.compute_hash());
        b.difficulty = 1000.6;
        assert_ne!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn test_block_json_roundtrip() {
        let mut block = bare_block();
        block.hash = block.compute_hash();
        let json = serde_json::to_string(&block).unwrap();
        let reparsed: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, block);
        assert_eq!(reparsed.compute_hash(), block.hash);
    }
}
