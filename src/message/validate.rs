//! Context-dependent message validation
//!
//! A message is checked against a projected view: the confirmed snapshot,
//! with confirming siblings replayed first and, for the unconfirmed view,
//! the pending mempool folded in afterwards. Passing no mempool gives the
//! confirmed view used by block validation.

use crate::asset::{base_of, is_base_asset, is_basic_asset, is_mint_asset, is_valid_asset};
use crate::chain::Mempool;
use crate::constants::{COINBASE_QUANTITY, CRD, MESSAGE_TTL};
use crate::consensus::Block;
use crate::crypto::{null_address, null_public_key, PublicKey};
use crate::error::{ChainError, ChainResult};
use crate::message::{Message, Payload, Sender};
use crate::state::{Db, View};

/// Validate one message against the given context.
///
/// `siblings` are the other messages confirming alongside the candidate;
/// `mempool` folds the pending pool in (unconfirmed view) when present.
pub fn validate_message(
    db: &Db,
    blocks: &[Block],
    mempool: Option<&Mempool>,
    message: &Message,
    siblings: &[Message],
) -> ChainResult<()> {
    let mut view = View::new(db.clone());
    for sibling in siblings {
        view.apply_lossy(sibling);
    }
    if let Some(mempool) = mempool {
        for pending in &mempool.messages {
            view.fold_pending(pending);
        }
    }
    let next_height = blocks.last().map(|b| b.height).unwrap_or(0) + 1;
    validate_with_view(&view, next_height, message)
}

/// Validate a message against an already projected view. Callers that
/// replay messages incrementally (block validation, candidate assembly)
/// use this directly and fold the message in afterwards.
pub fn validate_with_view(view: &View, next_height: u64, message: &Message) -> ChainResult<()> {
    if message.compute_hash() != message.hash {
        return Err(ChainError::InvalidHash);
    }
    let payload = message.decode()?;

    let public_key = match payload.sender() {
        Sender::Null => null_public_key(),
        Sender::Signed(encoded) => {
            PublicKey::from_hex(encoded).map_err(|_| ChainError::InvalidSignature)?
        }
    };
    if !public_key.verify(&message.digest(), &message.signature) {
        return Err(ChainError::InvalidSignature);
    }

    let start_height = payload.start_height();
    if next_height < start_height {
        return Err(ChainError::StartHeightAhead);
    }
    if next_height >= start_height + MESSAGE_TTL {
        return Err(ChainError::TtlExpired);
    }

    if view.db.is_replayed(&message.hash) {
        return Err(ChainError::Replay);
    }
    if view.contains(&message.hash) {
        return Err(ChainError::DuplicateMessage);
    }

    let signer = public_key.address();
    match &payload {
        Payload::Coinbase {
            asset, quantity, ..
        } => {
            if asset != CRD {
                return Err(ChainError::InvalidAsset);
            }
            if *quantity != COINBASE_QUANTITY {
                return Err(ChainError::InvalidQuantity);
            }
            if view.coinbase_count() > 0 {
                return Err(ChainError::MultipleCoinbase);
            }
        }
        Payload::Send {
            src_address,
            asset,
            quantity,
            ..
        } => {
            if signer != *src_address {
                return Err(ChainError::AddressMismatch);
            }
            if !is_valid_asset(asset) {
                return Err(ChainError::InvalidAsset);
            }
            if *quantity == 0 || (is_mint_asset(asset) && *quantity != 1) {
                return Err(ChainError::InvalidQuantity);
            }
            if view.db.balance(src_address, asset) < *quantity {
                return Err(ChainError::InsufficientFunds);
            }
        }
        Payload::Minter { asset, .. } => {
            if !is_base_asset(asset) {
                return Err(ChainError::InvalidAsset);
            }
            if view.db.minter_claimed(asset) {
                return Err(ChainError::MinterClaimed);
            }
        }
        Payload::Mint {
            asset, quantity, ..
        } => {
            check_mintable(view, asset, *quantity, &signer)?;
        }
        Payload::Get {
            asset, quantity, ..
        } => {
            check_mintable(view, asset, *quantity, &null_address())?;
        }
        Payload::Burn {
            asset, quantity, ..
        } => {
            check_mintable(view, asset, *quantity, &signer)?;
            if view.db.balance(&signer, asset) < *quantity {
                return Err(ChainError::InsufficientFunds);
            }
        }
        Payload::Drop {
            address,
            asset,
            quantity,
            ..
        } => {
            check_mintable(view, asset, *quantity, &null_address())?;
            if view.db.balance(address, asset) < *quantity {
                return Err(ChainError::InsufficientFunds);
            }
        }
        Payload::Price { asset, .. } => {
            if !is_base_asset(asset) {
                return Err(ChainError::InvalidAsset);
            }
            if view.db.minter(asset) != Some(signer.as_str()) {
                return Err(ChainError::NotMinter);
            }
        }
        Payload::Buy {
            asset,
            quantity,
            price,
            ..
        } => {
            if !is_base_asset(asset) {
                return Err(ChainError::InvalidAsset);
            }
            if *quantity == 0 {
                return Err(ChainError::InvalidQuantity);
            }
            if *price == 0 {
                return Err(ChainError::InvalidPrice);
            }
            if view.db.minter(asset).is_none() {
                return Err(ChainError::NoMinter);
            }
            if !view.is_advertised(asset, *price) {
                return Err(ChainError::PriceNotAdvertised);
            }
            let total = quantity
                .checked_mul(*price)
                .ok_or(ChainError::InvalidQuantity)?;
            if view.db.balance(&signer, CRD) < total {
                return Err(ChainError::InsufficientFunds);
            }
        }
    }
    Ok(())
}

/// Shared gate for mint, get, burn and drop: the asset is basic, the
/// quantity positive, and the signer is either the base asset's minter or
/// the base asset is freely mintable (price zero).
fn check_mintable(view: &View, asset: &str, quantity: u64, signer: &str) -> ChainResult<()> {
    if !is_basic_asset(asset) {
        return Err(ChainError::InvalidAsset);
    }
    if quantity == 0 {
        return Err(ChainError::InvalidQuantity);
    }
    let base = base_of(asset);
    let is_minter = view.db.minter(base) == Some(signer);
    let is_free = view.db.price(base) == Some(0);
    if !is_minter && !is_free {
        return Err(ChainError::MintForbidden);
    }
    Ok(())
}
