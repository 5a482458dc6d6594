//! Peer set bookkeeping
//!
//! Peers are URLs with a two-state lifecycle: disabled or enabled. The
//! node keeps at least MIN_NUM_LIVE_PEERS enabled, topping up uniformly
//! at random from the disabled pool. The local self-URL never enters the
//! set.

use rand::seq::SliceRandom;

/// One known peer
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub url: String,
    pub enabled: bool,
}

/// The set of known peers
#[derive(Debug)]
pub struct PeerSet {
    self_url: String,
    entries: Vec<PeerEntry>,
}

impl PeerSet {
    pub fn new(self_url: impl Into<String>) -> Self {
        PeerSet {
            self_url: self_url.into(),
            entries: Vec::new(),
        }
    }

    /// Add a peer URL; duplicates and the self-URL are ignored.
    /// Returns true when the set changed.
    pub fn add(&mut self, url: &str) -> bool {
        if url == self.self_url || url.is_empty() {
            return false;
        }
        if self.entries.iter().any(|p| p.url == url) {
            return false;
        }
        self.entries.push(PeerEntry {
            url: url.to_string(),
            enabled: false,
        });
        true
    }

    /// All known peer URLs.
    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|p| p.url.clone()).collect()
    }

    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|p| p.enabled).count()
    }

    pub fn is_enabled(&self, url: &str) -> bool {
        self.entries.iter().any(|p| p.url == url && p.enabled)
    }

    pub fn set_enabled(&mut self, url: &str, enabled: bool) {
        if let Some(peer) = self.entries.iter_mut().find(|p| p.url == url) {
            peer.enabled = enabled;
        }
    }

    pub fn disable_all(&mut self) {
        for peer in &mut self.entries {
            peer.enabled = false;
        }
    }

    /// Pick one disabled peer uniformly at random.
    pub fn pick_disabled(&self) -> Option<String> {
        let disabled: Vec<&PeerEntry> = self.entries.iter().filter(|p| !p.enabled).collect();
        disabled
            .choose(&mut rand::thread_rng())
            .map(|p| p.url.clone())
    }
}
