use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use fidx_index::IndexConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Metadata keys stripped from every listed record.
pub const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "UploadIP",
    "UploadAddress",
    "Channel",
    "ChannelName",
    "TgFileId",
    "TgChatId",
    "TgBotToken",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Root of the directory-backed store; `None` keeps records in memory.
    pub data_dir: Option<PathBuf>,
    pub sensitive_metadata_keys: Vec<String>,
    pub index: IndexConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8787)),
            data_dir: None,
            sensitive_metadata_keys: DEFAULT_SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect(),
            index: IndexConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> ServerResult<Self> {
        toml::from_str(raw).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read a TOML config file. Missing keys take their defaults.
    pub async fn load(path: &Path) -> ServerResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }
}
