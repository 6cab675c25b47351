// Configuration management

use crate::error::Result;
use crate::measure::library::DEFAULT_SERVERS_URL;
use crate::measure::{EnginePolicy, Target};
use crate::storage::archive::DEFAULT_MAX_FILES;
use crate::storage::store::{DEFAULT_RETENTION_DAYS, MAIN_FILE_NAME};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Overrides `data_dir` when set
pub const DATA_DIR_ENV: &str = "NETPULSE_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub interval_secs: u64,
    pub servers: Vec<String>,
    pub primary_command: String,
    pub primary_timeout_secs: u64,
    pub use_primary: bool,
    pub require_primary: bool,
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub main_retention_days: i64,
    pub archive_retention_files: usize,
    pub jitter_secs: u64,
    pub servers_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            interval_secs: 120,
            servers: Vec::new(),
            primary_command: "speedtest".to_string(),
            primary_timeout_secs: 300,
            use_primary: true,
            require_primary: false,
            max_attempts: 4,
            initial_backoff_secs: 2,
            main_retention_days: DEFAULT_RETENTION_DAYS,
            archive_retention_files: DEFAULT_MAX_FILES,
            jitter_secs: 5,
            servers_url: DEFAULT_SERVERS_URL.to_string(),
        }
    }
}

impl Config {
    /// Get default config path: ~/.config/netpulse/config.yaml
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("netpulse").join("config.yaml"))
    }

    /// Load config from path, falling back to defaults if not found.
    /// `NETPULSE_DATA_DIR` is applied on top.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(path) => Some(path),
            None => Self::default_path().ok(),
        };

        let mut config = match config_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)?;
                serde_yaml::from_str::<Config>(&contents)
                    .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?
            }
            _ => Self::default(),
        };

        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Save config to path
    pub fn save(&self, path: PathBuf) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Configured data directory or `~/.local/share/netpulse`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join("netpulse"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub fn main_path(&self) -> PathBuf {
        self.data_dir().join(MAIN_FILE_NAME)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir().join("archive")
    }

    pub fn engine_policy(&self) -> EnginePolicy {
        EnginePolicy {
            prefer_primary: self.use_primary,
            allow_fallback: !self.require_primary,
        }
    }

    /// Configured servers, or the best-server sentinel
    pub fn targets(&self) -> Result<Vec<Target>> {
        Target::parse_list(&self.servers.join(",")).map_err(|e| anyhow::anyhow!(e))
    }
}
