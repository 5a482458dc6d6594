//! Node configuration
//!
//! Read once at startup from environment variables; everything has a
//! sensible single-node default.

use std::env;
use std::path::PathBuf;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Where db/, blocks/ and peers.txt live
    pub data_dir: PathBuf,
    /// HTTP port, bound on loopback
    pub port: u16,
    /// Our own advertised URL, excluded from the peer set
    pub self_url: String,
    /// Bootstrap peers, merged with the persisted peer list
    pub bootstrap_peers: Vec<String>,
}

const DEFAULT_PORT: u16 = 7420;

impl NodeConfig {
    /// Build from `CRD_DATA_DIR`, `CRD_PORT`, `CRD_SELF_URL`, `CRD_PEERS`.
    pub fn from_env() -> Self {
        let port = env::var("CRD_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let data_dir = env::var("CRD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("crd-data"));
        let self_url = env::var("CRD_SELF_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{port}"));
        let bootstrap_peers = env::var("CRD_PEERS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        NodeConfig {
            data_dir,
            port,
            self_url,
            bootstrap_peers,
        }
    }
}
