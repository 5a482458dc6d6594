//! Cryptography module - SHA-256 hashing, ECDSA signatures, addresses

mod hash;
mod keys;

pub use hash::*;
pub use keys::*;
