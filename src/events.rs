//! Node event fan-out
//!
//! Everything the node accepts - blocks, messages, peers - is published
//! on a broadcast bus. Subscribers (the `/listen` stream, tests) each get
//! their own receiver; a slow subscriber lags and drops, it never
//! back-pressures the chain task.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::consensus::Block;
use crate::message::Message;

/// Capacity of each subscriber's buffer before it starts lagging
const EVENT_BUFFER: usize = 256;

/// One replication event, as framed on `/listen`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeEvent {
    /// A block joined the main chain
    Block { block: Block },
    /// A message entered the mempool
    Message { message: Message },
    /// A peer joined the peer set
    Peer { url: String },
}

/// Broadcast bus for node events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<NodeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        EventBus { sender }
    }

    /// Publish an event; dropped silently when nobody listens.
    pub fn publish(&self, event: NodeEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe from this point onward.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
