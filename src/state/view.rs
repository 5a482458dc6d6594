//! Projected transient views
//!
//! Context-dependent validation works against a throwaway projection of a
//! base snapshot: confirming siblings are replayed first, then (when the
//! unconfirmed view is wanted) the pending mempool messages. The view also
//! tracks what the replay saw: advertised prices, coinbase count, and the
//! hashes already folded in.

use std::collections::{HashMap, HashSet};

use crate::error::ChainResult;
use crate::message::{Message, Payload};

use super::Db;

/// A snapshot with replayed context on top
#[derive(Debug, Clone)]
pub struct View {
    /// The projected state
    pub db: Db,
    advertised: HashMap<String, HashSet<u64>>,
    coinbase_count: usize,
    seen: HashSet<String>,
}

impl View {
    /// Project a view off a base snapshot. Confirmed prices count as
    /// advertised.
    pub fn new(db: Db) -> Self {
        let advertised = db
            .prices
            .iter()
            .filter_map(|(asset, &price)| {
                price.map(|p| (asset.clone(), HashSet::from([p])))
            })
            .collect();
        View {
            db,
            advertised,
            coinbase_count: 0,
            seen: HashSet::new(),
        }
    }

    fn fold(&mut self, message: &Message, as_sibling: bool) -> ChainResult<()> {
        let payload = message.decode()?;
        self.db.apply(&payload)?;
        match &payload {
            Payload::Price { asset, price, .. } => {
                self.advertised
                    .entry(asset.clone())
                    .or_default()
                    .insert(*price);
            }
            // the one-coinbase rule counts confirming siblings only, so
            // pending mempool coinbases stay out of the tally
            Payload::Coinbase { .. } if as_sibling => self.coinbase_count += 1,
            _ => {}
        }
        self.seen.insert(message.hash.clone());
        Ok(())
    }

    /// Fold one confirming sibling into the view.
    pub fn apply(&mut self, message: &Message) -> ChainResult<()> {
        self.fold(message, true)
    }

    /// Fold a sibling in if it still applies; drop it silently otherwise.
    pub fn apply_lossy(&mut self, message: &Message) {
        let _ = self.fold(message, true);
    }

    /// Fold a pending mempool message in if it still applies. State and
    /// duplicate tracking behave as for siblings; only the coinbase tally
    /// is exempt.
    pub fn fold_pending(&mut self, message: &Message) {
        let _ = self.fold(message, false);
    }

    /// Whether `price` is currently advertised for `asset`, counting
    /// prices replayed into this view.
    pub fn is_advertised(&self, asset: &str, price: u64) -> bool {
        self.advertised
            .get(asset)
            .is_some_and(|prices| prices.contains(&price))
    }

    /// Coinbase messages replayed into this view.
    pub fn coinbase_count(&self) -> usize {
        self.coinbase_count
    }

    /// Whether a message hash was already folded into this view.
    pub fn contains(&self, hash: &str) -> bool {
        self.seen.contains(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CRD;
    use crate::crypto::PrivateKey;

    #[test]
    fn test_confirmed_price_counts_as_advertised() {
        let mut db = Db::new();
        db.prices.insert("GOLD".into(), Some(5));
        let view = View::new(db);
        assert!(view.is_advertised("GOLD", 5));
        assert!(!view.is_advertised("GOLD", 6));
        assert!(!view.is_advertised(CRD, 0));
    }

    #[test]
    fn test_sibling_price_joins_advertised_set() {
        let key = PrivateKey::generate();
        let mut db = Db::new();
        db.prices.insert("GOLD".into(), Some(5));
        let mut view = View::new(db);
        view.apply(&Message::signed(
            &Payload::Price {
                asset: "GOLD".into(),
                price: 9,
                public_key: key.public_key().to_hex(),
                start_height: 1,
                timestamp: 0,
            },
            &key,
        ))
        .unwrap();
        // both the confirmed and the sibling price are live
        assert!(view.is_advertised("GOLD", 5));
        assert!(view.is_advertised("GOLD", 9));
    }

    #[test]
    fn test_coinbase_counting_and_seen_hashes() {
        let mut view = View::new(Db::new());
        let msg = Message::signed(
            &Payload::Coinbase {
                address: "a".into(),
                asset: CRD.into(),
                quantity: 100,
                start_height: 1,
                timestamp: 0,
            },
            &PrivateKey::null(),
        );
        assert_eq!(view.coinbase_count(), 0);
        view.apply(&msg).unwrap();
        assert_eq!(view.coinbase_count(), 1);
        assert!(view.contains(&msg.hash));
    }

    #[test]
    fn test_pending_coinbase_credits_without_counting() {
        let mut view = View::new(Db::new());
        let msg = Message::signed(
            &Payload::Coinbase {
                address: "a".into(),
                asset: CRD.into(),
                quantity: 100,
                start_height: 1,
                timestamp: 0,
            },
            &PrivateKey::null(),
        );
        view.fold_pending(&msg);
        assert_eq!(view.db.balance("a", CRD), 100);
        assert_eq!(view.coinbase_count(), 0);
        assert!(view.contains(&msg.hash));
    }

    #[test]
    fn test_lossy_apply_skips_invalid() {
        let mut view = View::new(Db::new());
        let key = PrivateKey::generate();
        let overdraft = Message::signed(
            &Payload::Send {
                src_address: key.public_key().address(),
                dst_address: "b".into(),
                asset: CRD.into(),
                quantity: 10,
                public_key: key.public_key().to_hex(),
                start_height: 1,
                timestamp: 0,
            },
            &key,
        );
        let before = view.db.clone();
        view.apply_lossy(&overdraft);
        assert_eq!(view.db, before);
    }
}
