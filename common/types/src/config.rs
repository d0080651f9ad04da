use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Address;

pub const DEFAULT_P2P_PORT: u16 = 6001;
pub const DEFAULT_RPC_PORT: u16 = 3001;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn default_datadir() -> PathBuf {
    directories::ProjectDirs::from("org", "plasma", "plasma")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("plasma"))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub datadir: PathBuf,
    pub p2p_host: String,
    pub p2p_port: u16,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub peers: Vec<String>,
    /// Hex secret of the operator. Present only on the node that assembles blocks.
    pub operator_key: Option<String>,
    /// Address whose signature every non genesis header must carry.
    pub operator: Option<Address>,
    /// Seconds between automatic block assembly, operator only.
    pub block_interval: Option<u64>,
    /// Hex secrets the signing oracle holds for `/transact`.
    pub unlocked_keys: Vec<String>,
    pub log_level: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            p2p_host: DEFAULT_HOST.to_string(),
            p2p_port: DEFAULT_P2P_PORT,
            rpc_host: DEFAULT_HOST.to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            peers: vec![],
            operator_key: None,
            operator: None,
            block_interval: None,
            unlocked_keys: vec![],
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl EnvironmentConfig {
    pub fn p2p_address(&self) -> String {
        format!("{}:{}", self.p2p_host, self.p2p_port)
    }

    pub fn rpc_address(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }

    pub fn sanitize(&mut self) {
        let default = EnvironmentConfig::default();
        if self.p2p_port == 0 {
            warn!(provided = self.p2p_port, updated = default.p2p_port, "Sanitizing invalid p2p port");
            self.p2p_port = default.p2p_port
        }
        if self.rpc_port == 0 {
            warn!(provided = self.rpc_port, updated = default.rpc_port, "Sanitizing invalid rpc port");
            self.rpc_port = default.rpc_port
        }
        if self.p2p_host.trim().is_empty() {
            warn!(updated = ?default.p2p_host, "Sanitizing empty p2p host");
            self.p2p_host = default.p2p_host
        }
        if self.rpc_host.trim().is_empty() {
            warn!(updated = ?default.rpc_host, "Sanitizing empty rpc host");
            self.rpc_host = default.rpc_host.clone()
        }
        if self.block_interval == Some(0) {
            warn!("Sanitizing zero block interval, automatic assembly disabled");
            self.block_interval = None
        }
        let level = self.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            warn!(provided = ?self.log_level, updated = DEFAULT_LOG_LEVEL, "Sanitizing invalid log level");
            self.log_level = DEFAULT_LOG_LEVEL.to_string()
        } else {
            self.log_level = level
        }
        let own = self.p2p_address();
        self.peers.retain(|peer| !peer.trim().is_empty() && peer != &own);
        self.peers.dedup();
    }
}
