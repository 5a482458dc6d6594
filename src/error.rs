//! Ledger error taxonomy
//!
//! Every validation and ingestion failure is one `ChainError` variant.
//! Each variant maps to an HTTP-like status code, and the expected
//! ingestion conditions (stale, duplicate, replay, fork discovery) are
//! tagged soft: they are silently ignored and never logged.

use thiserror::Error;

/// Result alias for chain operations
pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// Tagged validation / ingestion error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    // message validation
    #[error("invalid hash")]
    InvalidHash,
    #[error("invalid payload")]
    InvalidPayload,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("ttl expired")]
    TtlExpired,
    #[error("start height ahead")]
    StartHeightAhead,
    #[error("replayed message")]
    Replay,
    #[error("duplicate message")]
    DuplicateMessage,
    #[error("invalid asset")]
    InvalidAsset,
    #[error("invalid quantity")]
    InvalidQuantity,
    #[error("address mismatch")]
    AddressMismatch,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("minter already claimed")]
    MinterClaimed,
    #[error("not the minter")]
    NotMinter,
    #[error("minting not permitted")]
    MintForbidden,
    #[error("no minter")]
    NoMinter,
    #[error("price not advertised")]
    PriceNotAdvertised,
    #[error("invalid price")]
    InvalidPrice,
    #[error("multiple coinbase messages")]
    MultipleCoinbase,

    // block validation
    #[error("invalid previous hash")]
    InvalidPrevHash,
    #[error("invalid height")]
    InvalidHeight,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("target not met")]
    TargetNotMet,
    #[error("too many messages")]
    TooManyMessages,
    #[error("difficulty too low")]
    DifficultyTooLow,

    // block attachment
    #[error("duplicate block")]
    DuplicateBlock,
    #[error("stale block")]
    StaleBlock,
    #[error("desynchronized block")]
    Desynchronized,
    #[error("dangling block")]
    DanglingBlock,

    // resources
    #[error("mempool overloaded")]
    Overloaded,
    #[error("not found")]
    NotFound,
}

impl ChainError {
    /// HTTP-like status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ChainError::InsufficientFunds => 402,
            ChainError::NotFound => 404,
            ChainError::Overloaded => 503,
            _ => 400,
        }
    }

    /// Soft errors are expected ingestion conditions; they are ignored
    /// silently and must not be logged.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ChainError::Replay
                | ChainError::DuplicateMessage
                | ChainError::InvalidPrevHash
                | ChainError::DuplicateBlock
                | ChainError::StaleBlock
                | ChainError::Desynchronized
                | ChainError::DanglingBlock
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ChainError::InsufficientFunds.status(), 402);
        assert_eq!(ChainError::NotFound.status(), 404);
        assert_eq!(ChainError::Overloaded.status(), 503);
        assert_eq!(ChainError::TtlExpired.status(), 400);
        assert_eq!(ChainError::InvalidSignature.status(), 400);
    }

    #[test]
    fn test_soft_classification() {
        assert!(ChainError::StaleBlock.is_soft());
        assert!(ChainError::DuplicateMessage.is_soft());
        assert!(ChainError::Replay.is_soft());
        assert!(ChainError::InvalidPrevHash.is_soft());
        assert!(!ChainError::TtlExpired.is_soft());
        assert!(!ChainError::InsufficientFunds.is_soft());
    }

    #[test]
    fn test_display_messages_are_stable() {
        // Clients match on these strings; keep them frozen.
        assert_eq!(ChainError::TtlExpired.to_string(), "ttl expired");
        assert_eq!(ChainError::InsufficientFunds.to_string(), "insufficient funds");
    }
}
