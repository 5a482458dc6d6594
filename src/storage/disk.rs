//! On-disk persistence
//!
//! Layout under the data directory:
//!   db/db-{height}.json       one snapshot per block in the undo window
//!   blocks/block-{height}.json one file per confirmed block
//!   peers.txt                 newline-separated peer URLs
//!
//! Every write lands in a temporary file first and is renamed into place.
//! Recovery trusts only the largest contiguous run of block files
//! starting at height 1, and requires a snapshot at that height.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consensus::Block;
use crate::constants::{CHARGE_SETTLE_BLOCKS, UNDO_HEIGHT};
use crate::state::Db;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// File-backed store rooted at a data directory
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    /// Open the store, creating the directory layout if needed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(data_dir.join("db"))?;
        fs::create_dir_all(data_dir.join("blocks"))?;
        Ok(Store { data_dir })
    }

    fn db_path(&self, height: u64) -> PathBuf {
        self.data_dir.join("db").join(format!("db-{height}.json"))
    }

    fn block_path(&self, height: u64) -> PathBuf {
        self.data_dir
            .join("blocks")
            .join(format!("block-{height}.json"))
    }

    fn peers_path(&self) -> PathBuf {
        self.data_dir.join("peers.txt")
    }

    /// Persist the undo window and the in-memory blocks, then drop disk
    /// files that fell out of the kept set.
    pub fn save_chain(&self, dbs: &[Db], blocks: &[Block]) -> Result<(), StoreError> {
        let tail_height = blocks.last().map(|b| b.height).unwrap_or(0);
        for (i, db) in dbs.iter().enumerate() {
            let height = tail_height - (dbs.len() - 1 - i) as u64;
            write_atomic(&self.db_path(height), &serde_json::to_vec(db)?)?;
        }
        for block in blocks {
            write_atomic(&self.block_path(block.height), &serde_json::to_vec(block)?)?;
        }
        self.prune(tail_height, dbs.len() as u64)?;
        Ok(())
    }

    /// Persist the peer list.
    pub fn save_peers(&self, peers: &[String]) -> Result<(), StoreError> {
        let mut text = peers.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        write_atomic(&self.peers_path(), text.as_bytes())?;
        Ok(())
    }

    /// Load the persisted peer list, empty when absent.
    pub fn load_peers(&self) -> Vec<String> {
        fs::read_to_string(self.peers_path())
            .map(|text| {
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Load one block from disk.
    pub fn load_block(&self, height: u64) -> Result<Option<Block>, StoreError> {
        match fs::read(self.block_path(height)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Crash recovery: find the best contiguous chain on disk and the
    /// snapshot run ending at its tip. Returns `None` to start empty.
    pub fn recover(&self) -> Result<Option<(Vec<Db>, Vec<Block>)>, StoreError> {
        let best = self.best_height()?;
        if best == 0 {
            return Ok(None);
        }

        // snapshots, contiguous from the top
        let mut dbs = Vec::new();
        let mut height = best;
        while height >= 1 && dbs.len() < UNDO_HEIGHT as usize {
            match fs::read(self.db_path(height)) {
                Ok(bytes) => dbs.push(serde_json::from_slice::<Db>(&bytes)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
            height -= 1;
        }
        if dbs.is_empty() {
            return Ok(None);
        }
        dbs.reverse();

        let from = best.saturating_sub(CHARGE_SETTLE_BLOCKS - 1).max(1);
        let mut blocks = Vec::new();
        for h in from..=best {
            match self.load_block(h)? {
                Some(block) => blocks.push(block),
                None => return Ok(None),
            }
        }
        Ok(Some((dbs, blocks)))
    }

    /// Largest height H such that block files 1..=H all exist.
    fn best_height(&self) -> Result<u64, StoreError> {
        let heights = scan_heights(&self.data_dir.join("blocks"), "block-")?;
        let mut best = 0;
        while heights.contains(&(best + 1)) {
            best += 1;
        }
        Ok(best)
    }

    /// Remove snapshot files outside the undo window and block files
    /// above the tail (left behind by a reorganization).
    fn prune(&self, tail_height: u64, kept_dbs: u64) -> Result<(), StoreError> {
        let low = (tail_height + 1).saturating_sub(kept_dbs);
        for height in scan_heights(&self.data_dir.join("db"), "db-")? {
            if height < low || height > tail_height {
                let _ = fs::remove_file(self.db_path(height));
            }
        }
        for height in scan_heights(&self.data_dir.join("blocks"), "block-")? {
            if height > tail_height {
                let _ = fs::remove_file(self.block_path(height));
            }
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(tmp, path)
}

fn scan_heights(dir: &Path, prefix: &str) -> Result<HashSet<u64>, StoreError> {
    let mut heights = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(height) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|digits| digits.parse().ok())
        else {
            continue;
        };
        heights.insert(height);
    }
    Ok(heights)
}
