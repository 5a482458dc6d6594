//! ECDSA signatures and address derivation
//!
//! Keys live on secp256k1. Public keys travel as compressed SEC1 hex,
//! signatures as fixed 64-byte hex. An address is the Base58 encoding of
//! the SHA-256 digest of the public key bytes.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::sha256;

/// Scalar of the well-known null key: coinbase, get and drop messages are
/// authorised by it. A marker, not a security construct.
const NULL_KEY_SCALAR: [u8; 32] = {
    let mut scalar = [0u8; 32];
    scalar[0] = 0xFF;
    scalar
};

/// Signature errors
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
}

/// secp256k1 private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// Compressed SEC1 public key (33 bytes)
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey([u8; 33]);

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    /// Create from a 32-byte scalar
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        SigningKey::from_bytes(bytes.into())
            .map(PrivateKey)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    /// The well-known null key
    pub fn null() -> Self {
        // The scalar 0xFF << 248 is below the curve order, so this cannot fail.
        PrivateKey::from_bytes(&NULL_KEY_SCALAR).expect("null key scalar is in range")
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        let point = self.0.verifying_key().to_encoded_point(true);
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(point.as_bytes());
        PublicKey(bytes)
    }

    /// Sign a 32-byte digest; returns the signature as hex
    pub fn sign(&self, digest: &[u8; 32]) -> String {
        let signature: Signature = self.0.sign(digest);
        hex::encode(signature.to_bytes())
    }
}

impl PublicKey {
    /// Parse a compressed SEC1 public key from hex
    pub fn from_hex(encoded: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(encoded).map_err(|_| SignatureError::InvalidPublicKey)?;
        if bytes.len() != 33 {
            return Err(SignatureError::InvalidPublicKey);
        }
        VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
        let mut arr = [0u8; 33];
        arr.copy_from_slice(&bytes);
        Ok(PublicKey(arr))
    }

    /// Hex encoding of the compressed key
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a hex signature over a 32-byte digest
    pub fn verify(&self, digest: &[u8; 32], signature_hex: &str) -> bool {
        let verifying_key = match VerifyingKey::from_sec1_bytes(&self.0) {
            Ok(vk) => vk,
            Err(_) => return false,
        };
        let bytes = match hex::decode(signature_hex) {
            Ok(b) => b,
            Err(_) => return false,
        };
        let signature = match Signature::from_slice(&bytes) {
            Ok(s) => s,
            Err(_) => return false,
        };
        verifying_key.verify(digest, &signature).is_ok()
    }

    /// Derive the address: Base58(SHA-256(public key bytes))
    pub fn address(&self) -> String {
        bs58::encode(sha256(&self.0)).into_string()
    }
}

/// Public key of the well-known null key
pub fn null_public_key() -> PublicKey {
    PrivateKey::null().public_key()
}

/// Address controlled by the null key
pub fn null_address() -> String {
    null_public_key().address()
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}
