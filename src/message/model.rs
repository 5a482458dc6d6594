//! Typed asset messages
//!
//! A message is a canonical JSON payload plus its SHA-256 hash and an
//! ECDSA signature over that hash. The payload travels and is stored as
//! the exact bytes the producer chose: the hash binds those bytes, so the
//! payload is never re-serialized after ingest.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::crypto::{sha256, PrivateKey};
use crate::error::{ChainError, ChainResult};

/// A signed ledger message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Canonical payload bytes (a JSON object)
    pub payload: Box<RawValue>,
    /// Lowercase hex SHA-256 of the payload bytes
    pub hash: String,
    /// Hex ECDSA signature over the payload hash
    pub signature: String,
}

/// Who authorised a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender<'a> {
    /// The well-known null key (coinbase, get, drop)
    Null,
    /// An explicit public key, compressed SEC1 hex
    Signed(&'a str),
}

/// Decoded message payload, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Payload {
    /// Block reward paid to the miner
    Coinbase {
        address: String,
        asset: String,
        quantity: u64,
        start_height: u64,
        timestamp: u64,
    },
    /// Transfer between addresses
    Send {
        src_address: String,
        dst_address: String,
        asset: String,
        quantity: u64,
        public_key: String,
        start_height: u64,
        timestamp: u64,
    },
    /// Claim the minter role for an unclaimed base asset
    Minter {
        asset: String,
        public_key: String,
        start_height: u64,
        timestamp: u64,
    },
    /// Mint units of a basic asset
    Mint {
        asset: String,
        quantity: u64,
        public_key: String,
        start_height: u64,
        timestamp: u64,
    },
    /// Null-key mint to an explicit address (free assets only)
    Get {
        address: String,
        asset: String,
        quantity: u64,
        start_height: u64,
        timestamp: u64,
    },
    /// Destroy units held by the signer
    Burn {
        asset: String,
        quantity: u64,
        public_key: String,
        start_height: u64,
        timestamp: u64,
    },
    /// Null-key burn at an explicit address (free assets only)
    Drop {
        address: String,
        asset: String,
        quantity: u64,
        start_height: u64,
        timestamp: u64,
    },
    /// Advertise a unit price for a base asset
    Price {
        asset: String,
        price: u64,
        public_key: String,
        start_height: u64,
        timestamp: u64,
    },
    /// Buy a base asset from its minter at an advertised price
    Buy {
        asset: String,
        quantity: u64,
        price: u64,
        public_key: String,
        start_height: u64,
        timestamp: u64,
    },
}

impl Payload {
    /// First block height this message may be confirmed in.
    pub fn start_height(&self) -> u64 {
        match self {
            Payload::Coinbase { start_height, .. }
            | Payload::Send { start_height, .. }
            | Payload::Minter { start_height, .. }
            | Payload::Mint { start_height, .. }
            | Payload::Get { start_height, .. }
            | Payload::Burn { start_height, .. }
            | Payload::Drop { start_height, .. }
            | Payload::Price { start_height, .. }
            | Payload::Buy { start_height, .. } => *start_height,
        }
    }

    /// Producer wall-clock timestamp, milliseconds.
    pub fn timestamp(&self) -> u64 {
        match self {
            Payload::Coinbase { timestamp, .. }
            | Payload::Send { timestamp, .. }
            | Payload::Minter { timestamp, .. }
            | Payload::Mint { timestamp, .. }
            | Payload::Get { timestamp, .. }
            | Payload::Burn { timestamp, .. }
            | Payload::Drop { timestamp, .. }
            | Payload::Price { timestamp, .. }
            | Payload::Buy { timestamp, .. } => *timestamp,
        }
    }

    /// The key this message must be signed with.
    pub fn sender(&self) -> Sender<'_> {
        match self {
            Payload::Coinbase { .. } | Payload::Get { .. } | Payload::Drop { .. } => Sender::Null,
            Payload::Send { public_key, .. }
            | Payload::Minter { public_key, .. }
            | Payload::Mint { public_key, .. }
            | Payload::Burn { public_key, .. }
            | Payload::Price { public_key, .. }
            | Payload::Buy { public_key, .. } => Sender::Signed(public_key),
        }
    }
}

impl Message {
    /// Build and sign a message from a payload. The serialized payload
    /// becomes the canonical bytes.
    pub fn signed(payload: &Payload, key: &PrivateKey) -> Message {
        let json = serde_json::to_string(payload).expect("payload serialization");
        let digest = sha256(json.as_bytes());
        Message {
            payload: RawValue::from_string(json).expect("payload is valid JSON"),
            hash: hex::encode(digest),
            signature: key.sign(&digest),
        }
    }

    /// The canonical payload bytes.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.get().as_bytes()
    }

    /// SHA-256 of the stored payload bytes, hex.
    pub fn compute_hash(&self) -> String {
        hex::encode(sha256(self.payload_bytes()))
    }

    /// The payload digest as raw bytes, derived from the stored bytes.
    pub fn digest(&self) -> [u8; 32] {
        sha256(self.payload_bytes())
    }

    /// Decode the payload into its typed form.
    pub fn decode(&self) -> ChainResult<Payload> {
        serde_json::from_str(self.payload.get()).map_err(|_| ChainError::InvalidPayload)
    }

    /// Canonical JSON of the whole message, used in block hash framing.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("message serialization")
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.signature == other.signature
            && self.payload.get() == other.payload.get()
    }
}

impl Eq for Message {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COINBASE_QUANTITY, CRD};

    fn coinbase_payload(address: &str) -> Payload {
        Payload::Coinbase {
            address: address.to_string(),
            asset: CRD.to_string(),
            quantity: COINBASE_QUANTITY,
            start_height: 1,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_signed_message_hash_binds_payload() {
        let msg = Message::signed(&coinbase_payload("addr"), &PrivateKey::null());
        assert_eq!(msg.compute_hash(), msg.hash);
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = Payload::Send {
            src_address: "a".into(),
            dst_address: "b".into(),
            asset: "GOLD".into(),
            quantity: 5,
            public_key: "02ab".into(),
            start_height: 3,
            timestamp: 9,
        };
        let msg = Message::signed(&payload, &PrivateKey::generate());
        assert_eq!(msg.decode().unwrap(), payload);
    }

    #[test]
    fn test_payload_json_uses_wire_names() {
        let msg = Message::signed(&coinbase_payload("addr"), &PrivateKey::null());
        let json = msg.payload.get();
        assert!(json.contains("\"type\":\"coinbase\""));
        assert!(json.contains("\"startHeight\":1"));
        assert!(!json.contains("start_height"));
    }

    #[test]
    fn test_message_json_preserves_payload_bytes() {
        // A hand-written payload with unusual spacing must survive a
        // message round-trip byte for byte.
        let raw = r#"{"type":"coinbase","address":"x","asset":"CRD",  "quantity":100,"startHeight":1,"timestamp":2}"#;
        let digest = sha256(raw.as_bytes());
        let msg = Message {
            payload: RawValue::from_string(raw.to_string()).unwrap(),
            hash: hex::encode(digest),
            signature: PrivateKey::null().sign(&digest),
        };
        let reparsed: Message = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(reparsed.payload.get(), raw);
        assert_eq!(reparsed.compute_hash(), msg.hash);
    }

    #[test]
    fn test_sender_classification() {
        assert_eq!(coinbase_payload("x").sender(), Sender::Null);
        let signed = Payload::Mint {
            asset: "GOLD".into(),
            quantity: 1,
            public_key: "02ff".into(),
            start_height: 1,
            timestamp: 1,
        };
        assert_eq!(signed.sender(), Sender::Signed("02ff"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = r#"{"type":"teleport","startHeight":1,"timestamp":2}"#;
        let msg = Message {
            payload: RawValue::from_string(raw.to_string()).unwrap(),
            hash: sha256_hex_of(raw),
            signature: String::new(),
        };
        assert_eq!(msg.decode(), Err(ChainError::InvalidPayload));
    }

    fn sha256_hex_of(s: &str) -> String {
        hex::encode(sha256(s.as_bytes()))
    }
}
