//! Bot configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Store directory path
    pub store_path: PathBuf,

    /// External peer tool configuration
    pub wg: WgConfig,

    /// Provisioning policy
    pub policy: PolicyConfig,

    /// Two-step command sessions
    pub session: SessionConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            store_path: wgaccess_common::default_store_path(),
            wg: WgConfig::default(),
            policy: PolicyConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// External peer-management tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WgConfig {
    /// Peer-management command; the lifecycle verb and peer id are appended
    pub command: Vec<String>,

    /// Directory the tool writes peer artifacts into
    pub config_root: PathBuf,

    /// Seconds to wait for the tool before giving up
    pub timeout_secs: u64,
}

impl Default for WgConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "docker".to_string(),
                "exec".to_string(),
                "wireguard".to_string(),
                "/app/manage-peer".to_string(),
            ],
            config_root: wgaccess_common::default_config_root(),
            timeout_secs: 30,
        }
    }
}

/// Provisioning policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Require a linked token with positive balance before profile creation
    pub require_token_balance: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            require_token_balance: false,
        }
    }
}

/// Two-step command session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds an unanswered profile-name prompt stays valid
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

impl BotConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the database path
    pub fn db_path(&self) -> PathBuf {
        self.store_path.join("state.db")
    }
}
