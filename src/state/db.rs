//! Confirmed ledger state and the state projector
//!
//! `Db` is one snapshot of the confirmed state: balances, minter
//! assignments, advertised prices, and the replay-rejection window of
//! recent message hashes. Applying a message mutates the snapshot per the
//! message type; a failed application leaves the snapshot untouched.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::asset::{mint_asset_of, minted_asset};
use crate::constants::{CRD, MESSAGE_TTL};
use crate::crypto::PublicKey;
use crate::error::{ChainError, ChainResult};
use crate::message::Payload;

/// One snapshot of confirmed chain state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Db {
    /// address -> asset -> balance; zero entries are pruned
    pub balances: HashMap<String, HashMap<String, u64>>,
    /// base asset -> minter address; an entry with `null` (CRD) is
    /// permanently unclaimable, a missing entry is claimable
    pub minters: HashMap<String, Option<String>>,
    /// base asset -> advertised unit price; `null` encodes infinity
    pub prices: HashMap<String, Option<u64>>,
    /// per-block message hash sets for the last MESSAGE_TTL blocks
    pub message_hashes: Vec<HashSet<String>>,
}

impl Db {
    /// Fresh state: the base currency exists, unmintable and unpriceable.
    pub fn new() -> Self {
        Db {
            balances: HashMap::new(),
            minters: HashMap::from([(CRD.to_string(), None)]),
            prices: HashMap::from([(CRD.to_string(), None)]),
            message_hashes: Vec::new(),
        }
    }

    /// Confirmed balance, zero when absent.
    pub fn balance(&self, address: &str, asset: &str) -> u64 {
        self.balances
            .get(address)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// All non-zero balances of one address.
    pub fn balances_of(&self, address: &str) -> HashMap<String, u64> {
        self.balances.get(address).cloned().unwrap_or_default()
    }

    /// The claimed minter of a base asset, if any.
    pub fn minter(&self, asset: &str) -> Option<&str> {
        self.minters.get(asset).and_then(|m| m.as_deref())
    }

    /// Whether the minter slot exists at all (claimed or reserved).
    pub fn minter_claimed(&self, asset: &str) -> bool {
        self.minters.contains_key(asset)
    }

    /// Latest finite advertised price; `None` covers both infinity and
    /// never-priced assets.
    pub fn price(&self, asset: &str) -> Option<u64> {
        self.prices.get(asset).copied().flatten()
    }

    /// Known base assets (keys of the minter map), sorted.
    pub fn assets(&self) -> Vec<String> {
        let mut assets: Vec<String> = self.minters.keys().cloned().collect();
        assets.sort();
        assets
    }

    /// True when the hash was confirmed in one of the last
    /// MESSAGE_TTL blocks.
    pub fn is_replayed(&self, hash: &str) -> bool {
        self.message_hashes.iter().any(|set| set.contains(hash))
    }

    /// Record the message hashes of a freshly committed block, keeping at
    /// most MESSAGE_TTL layers.
    pub fn record_block_hashes(&mut self, hashes: HashSet<String>) {
        self.message_hashes.push(hashes);
        let extra = self.message_hashes.len().saturating_sub(MESSAGE_TTL as usize);
        if extra > 0 {
            self.message_hashes.drain(..extra);
        }
    }

    fn credit(&mut self, address: &str, asset: &str, quantity: u64) -> ChainResult<()> {
        let assets = self.balances.entry(address.to_string()).or_default();
        let balance = assets.entry(asset.to_string()).or_insert(0);
        *balance = balance
            .checked_add(quantity)
            .ok_or(ChainError::InvalidQuantity)?;
        Ok(())
    }

    fn debit(&mut self, address: &str, asset: &str, quantity: u64) -> ChainResult<()> {
        let assets = self
            .balances
            .get_mut(address)
            .ok_or(ChainError::InsufficientFunds)?;
        let balance = assets
            .get_mut(asset)
            .ok_or(ChainError::InsufficientFunds)?;
        if *balance < quantity {
            return Err(ChainError::InsufficientFunds);
        }
        *balance -= quantity;
        if *balance == 0 {
            assets.remove(asset);
        }
        if assets.is_empty() {
            self.balances.remove(address);
        }
        Ok(())
    }

    /// Apply one message to the snapshot. Errors leave the snapshot
    /// unchanged; the validator rules out every error on the commit path.
    pub fn apply(&mut self, payload: &Payload) -> ChainResult<()> {
        match payload {
            Payload::Coinbase {
                address,
                asset,
                quantity,
                ..
            } => self.credit(address, asset, *quantity),
            Payload::Send {
                src_address,
                dst_address,
                asset,
                quantity,
                ..
            } => {
                self.debit(src_address, asset, *quantity)?;
                self.credit(dst_address, asset, *quantity)?;
                // Transferring a mint asset hands over the minter role.
                if let Some(base) = minted_asset(asset) {
                    self.minters
                        .insert(base.to_string(), Some(dst_address.clone()));
                }
                Ok(())
            }
            Payload::Minter {
                asset, public_key, ..
            } => {
                let signer = signer_address(public_key)?;
                self.credit(&signer, &mint_asset_of(asset), 1)?;
                self.minters.insert(asset.clone(), Some(signer));
                Ok(())
            }
            Payload::Mint {
                asset,
                quantity,
                public_key,
                ..
            } => {
                let signer = signer_address(public_key)?;
                self.credit(&signer, asset, *quantity)
            }
            Payload::Get {
                address,
                asset,
                quantity,
                ..
            } => self.credit(address, asset, *quantity),
            Payload::Burn {
                asset,
                quantity,
                public_key,
                ..
            } => {
                let signer = signer_address(public_key)?;
                self.debit(&signer, asset, *quantity)
            }
            Payload::Drop {
                address,
                asset,
                quantity,
                ..
            } => self.debit(address, asset, *quantity),
            Payload::Price { asset, price, .. } => {
                self.prices.insert(asset.clone(), Some(*price));
                Ok(())
            }
            Payload::Buy {
                asset,
                quantity,
                price,
                public_key,
                ..
            } => {
                let buyer = signer_address(public_key)?;
                let seller = self
                    .minter(asset)
                    .ok_or(ChainError::NoMinter)?
                    .to_string();
                let total = quantity
                    .checked_mul(*price)
                    .ok_or(ChainError::InvalidQuantity)?;
                self.debit(&buyer, CRD, total)?;
                self.credit(&seller, CRD, total)?;
                self.credit(&buyer, asset, *quantity)
            }
        }
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

fn signer_address(public_key: &str) -> ChainResult<String> {
    PublicKey::from_hex(public_key)
        .map(|pk| pk.address())
        .map_err(|_| ChainError::InvalidPayload)
}
