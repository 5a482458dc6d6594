//! Node wiring
//!
//! One `Node` owns the chain manager behind a mutex, the event bus, the
//! peer set with its per-peer tasks, the mining task, and the coalesced
//! save pipeline. Every other component - RPC handlers, peer tasks, the
//! miner - goes through the ingestion API here.
//!
//! Locking rule: the chain mutex is never held across an await point;
//! saves and proof-of-work run off-thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::{BlockOutcome, ChainManager, Mempool};
use crate::config::NodeConfig;
use crate::consensus::Block;
use crate::constants::MIN_NUM_LIVE_PEERS;
use crate::error::ChainResult;
use crate::events::{EventBus, NodeEvent};
use crate::message::Message;
use crate::mining;
use crate::now_millis;
use crate::p2p::{self, PeerSet};
use crate::state::Db;
use crate::storage::{Store, StoreError};

struct PeerTasks {
    listen: JoinHandle<()>,
    pull: JoinHandle<()>,
}

/// The running node
pub struct Node {
    config: NodeConfig,
    store: Store,
    chain: Mutex<ChainManager>,
    events: EventBus,
    peers: Mutex<PeerSet>,
    peer_tasks: Mutex<HashMap<String, PeerTasks>>,
    miner_task: Mutex<Option<JoinHandle<()>>>,
    mined_blocks: AtomicU64,
    save_tx: Mutex<Option<mpsc::Sender<()>>>,
    saver: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl Node {
    /// Open the store, recover the chain, seed the peer set, and start
    /// the background save task. Must run inside a tokio runtime.
    pub fn start(config: NodeConfig) -> Result<Arc<Node>, StoreError> {
        let store = Store::open(&config.data_dir)?;
        let chain = match store.recover()? {
            Some((dbs, blocks)) => {
                info!(
                    height = blocks.last().map(|b| b.height).unwrap_or(0),
                    "chain recovered from disk"
                );
                ChainManager::restore(dbs, blocks)
            }
            None => {
                info!("starting with an empty chain");
                ChainManager::new()
            }
        };

        let mut peers = PeerSet::new(config.self_url.clone());
        for url in store.load_peers() {
            peers.add(&url);
        }
        for url in &config.bootstrap_peers {
            peers.add(url);
        }

        let node = Arc::new(Node {
            config,
            store,
            chain: Mutex::new(chain),
            events: EventBus::new(),
            peers: Mutex::new(peers),
            peer_tasks: Mutex::new(HashMap::new()),
            miner_task: Mutex::new(None),
            mined_blocks: AtomicU64::new(0),
            save_tx: Mutex::new(None),
            saver: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        });
        node.spawn_saver();
        node.maintain_quorum();
        Ok(node)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // --- chain queries ---------------------------------------------------

    pub fn tail_height(&self) -> u64 {
        self.chain.lock().unwrap().tail_height()
    }

    /// Confirmed tip snapshot.
    pub fn snapshot(&self) -> Db {
        self.chain.lock().unwrap().snapshot()
    }

    /// Tip snapshot with pending messages folded in.
    pub fn unconfirmed_snapshot(&self) -> Db {
        self.chain.lock().unwrap().unconfirmed_snapshot()
    }

    pub fn mempool_snapshot(&self) -> Mempool {
        self.chain.lock().unwrap().mempool().clone()
    }

    /// A block by height: memory first, then disk.
    pub fn block_at(&self, height: u64) -> Option<Block> {
        if let Some(block) = self.chain.lock().unwrap().block_at(height) {
            return Some(block.clone());
        }
        self.store.load_block(height).ok().flatten()
    }

    pub fn block_cache(&self) -> Vec<Block> {
        self.chain.lock().unwrap().blocks().to_vec()
    }

    pub fn mined_blocks(&self) -> u64 {
        self.mined_blocks.load(Ordering::Relaxed)
    }

    // --- ingestion -------------------------------------------------------

    /// Ingest a locally submitted message; the error goes back to the
    /// caller.
    pub fn submit_message(&self, message: Message) -> ChainResult<()> {
        self.chain.lock().unwrap().submit_message(message.clone())?;
        self.events.publish(NodeEvent::Message { message });
        Ok(())
    }

    /// Ingest a block from any source.
    pub fn submit_block(&self, block: Block) -> ChainResult<BlockOutcome> {
        let outcome = self.chain.lock().unwrap().submit_block(block)?;
        self.finish_commit(&outcome);
        Ok(outcome)
    }

    /// Remote ingestion: soft errors vanish, hard errors are logged and
    /// never escalate.
    pub fn ingest_remote_block(&self, block: Block) {
        let height = block.height;
        match self.submit_block(block) {
            Ok(_) => {}
            Err(err) if err.is_soft() => {}
            Err(err) => warn!(height, %err, "rejected remote block"),
        }
    }

    /// Remote message ingestion with the same error policy.
    pub fn ingest_remote_message(&self, message: Message) {
        match self.submit_message(message) {
            Ok(_) => {}
            Err(err) if err.is_soft() => {}
            Err(err) => warn!(%err, "rejected remote message"),
        }
    }

    /// Apply one replication event from a peer stream.
    pub fn ingest_event(self: &Arc<Self>, event: NodeEvent) {
        match event {
            NodeEvent::Block { block } => self.ingest_remote_block(block),
            NodeEvent::Message { message } => self.ingest_remote_message(message),
            NodeEvent::Peer { url } => {
                self.add_peer(&url);
            }
        }
    }

    /// Save is enqueued before events go out, so a subscriber never sees
    /// a block the node would forget on crash-and-recover.
    fn finish_commit(&self, outcome: &BlockOutcome) {
        let BlockOutcome::Committed { blocks, readmitted } = outcome else {
            return;
        };
        self.enqueue_save();
        for block in blocks {
            info!(height = block.height, hash = %block.hash, "block committed");
            self.events.publish(NodeEvent::Block {
                block: block.clone(),
            });
        }
        for message in readmitted {
            self.events.publish(NodeEvent::Message {
                message: message.clone(),
            });
        }
    }

    // --- peers -----------------------------------------------------------

    /// Dedup-add a peer; persists, announces, and tops up the quorum.
    pub fn add_peer(self: &Arc<Self>, url: &str) -> bool {
        let added = self.peers.lock().unwrap().add(url);
        if added {
            debug!(url, "peer added");
            self.enqueue_save();
            self.events.publish(NodeEvent::Peer {
                url: url.to_string(),
            });
            self.maintain_quorum();
        }
        added
    }

    pub fn peer_urls(&self) -> Vec<String> {
        self.peers.lock().unwrap().urls()
    }

    pub fn peer_enabled(&self, url: &str) -> bool {
        self.peers.lock().unwrap().is_enabled(url)
    }

    /// Enable random disabled peers until the live quorum is met.
    pub fn maintain_quorum(self: &Arc<Self>) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        loop {
            let url = {
                let mut peers = self.peers.lock().unwrap();
                if peers.enabled_count() >= MIN_NUM_LIVE_PEERS {
                    return;
                }
                let Some(url) = peers.pick_disabled() else {
                    return;
                };
                peers.set_enabled(&url, true);
                url
            };
            info!(url, "peer enabled");
            let listen = tokio::spawn(p2p::run_listen(self.clone(), url.clone()));
            let pull = tokio::spawn(p2p::run_pull(self.clone(), url.clone()));
            self.peer_tasks
                .lock()
                .unwrap()
                .insert(url, PeerTasks { listen, pull });
        }
    }

    // --- mining ----------------------------------------------------------

    /// Start (or retarget) mining to `address`.
    pub fn start_mining(self: &Arc<Self>, address: String) {
        self.stop_mining();
        info!(address, "mining started");
        let node = self.clone();
        let task = tokio::spawn(async move {
            loop {
                let candidate = {
                    let chain = node.chain.lock().unwrap();
                    mining::assemble(
                        chain.blocks(),
                        &chain.snapshot(),
                        chain.mempool(),
                        &address,
                        now_millis(),
                    )
                };
                let solved = tokio::task::spawn_blocking(move || mining::mine_round(candidate))
                    .await
                    .ok()
                    .flatten();
                if let Some(block) = solved {
                    node.commit_own_block(block);
                }
            }
        });
        *self.miner_task.lock().unwrap() = Some(task);
    }

    pub fn stop_mining(&self) {
        if let Some(task) = self.miner_task.lock().unwrap().take() {
            task.abort();
            info!("mining stopped");
        }
    }

    fn commit_own_block(&self, block: Block) {
        let height = block.height;
        match self.submit_block(block) {
            Ok(BlockOutcome::Committed { .. }) => {
                self.mined_blocks.fetch_add(1, Ordering::Relaxed);
            }
            Ok(BlockOutcome::Stashed) => {}
            // the tail can move between assembly and solve; that loss is
            // expected and silent
            Err(err) if err.is_soft() => {}
            Err(err) => warn!(height, %err, "own block rejected"),
        }
    }

    // --- persistence -----------------------------------------------------

    fn spawn_saver(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        *self.save_tx.lock().unwrap() = Some(tx);
        let node = self.clone();
        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let (dbs, blocks) = {
                    let chain = node.chain.lock().unwrap();
                    (chain.snapshots().to_vec(), chain.blocks().to_vec())
                };
                let peers = node.peer_urls();
                let store = node.store.clone();
                let result = tokio::task::spawn_blocking(move || {
                    store.save_chain(&dbs, &blocks)?;
                    store.save_peers(&peers)
                })
                .await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(%err, "save failed"),
                    Err(err) => warn!(%err, "save task failed"),
                }
            }
        });
        *self.saver.lock().unwrap() = Some(handle);
    }

    /// Request a save. Back-to-back requests coalesce: the channel holds
    /// one pending save at most, and the writer picks up the freshest
    /// state when it gets there.
    pub fn enqueue_save(&self) {
        if let Some(tx) = self.save_tx.lock().unwrap().as_ref() {
            let _ = tx.try_send(());
        }
    }

    // --- shutdown --------------------------------------------------------

    /// Ordered teardown: miner, peers, then the save pipeline (draining
    /// any in-flight save).
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down");
        self.stop_mining();

        self.peers.lock().unwrap().disable_all();
        let tasks: Vec<PeerTasks> = self
            .peer_tasks
            .lock()
            .unwrap()
            .drain()
            .map(|(_, t)| t)
            .collect();
        for task in tasks {
            task.listen.abort();
            task.pull.abort();
        }

        // final save, then let the writer drain
        self.enqueue_save();
        let tx = self.save_tx.lock().unwrap().take();
        drop(tx);
        let saver = self.saver.lock().unwrap().take();
        if let Some(saver) = saver {
            let _ = saver.await;
        }
        info!("shutdown complete");
    }
}
