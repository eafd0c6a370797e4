use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::transport::MAX_MESSAGE_BYTES;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Name reported in `serverInfo`
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Longest accepted incoming message line in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// User collection file, relative to the data directory unless absolute
    #[serde(default = "default_users_file")]
    pub users_file: String,
}

fn default_server_name() -> String {
    "userbook".to_string()
}

fn default_max_message_bytes() -> usize {
    MAX_MESSAGE_BYTES
}

fn default_users_file() -> String {
    "users.json".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
        }
    }
}

impl McpConfig {
    pub fn load(config_path: &Path, data_dir: PathBuf) -> Result<Self> {
        // Create data directory if it doesn't exist
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        // Load config file if it exists, otherwise use defaults
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self {
                data_dir: data_dir.clone(),
                server: Default::default(),
                storage: Default::default(),
            }
        };

        config.data_dir = data_dir;

        Ok(config)
    }

    /// Get the user collection path
    pub fn users_path(&self) -> PathBuf {
        // Joining an absolute path replaces the base
        self.data_dir.join(&self.storage.users_file)
    }
}
