use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    CHECKPOINT_FILE_NAME, DEFAULT_FOLDER, DEFAULT_IMAP_PORT, DEFAULT_POLL_INTERVAL_SECS,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    /// Plain-text password; prefer the environment or the OS keyring
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub imap: ImapConfig,
    /// Mailbox folder to archive (case sensitive)
    #[serde(default = "default_folder")]
    pub folder: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: None,
            imap: ImapConfig::default(),
            folder: default_folder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub tls: bool,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: default_imap_port(),
            tls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Defaults to a hidden file inside `output_dir`
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
    /// Defaults to `logs` next to `output_dir`
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            checkpoint_path: None,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Keep polling instead of running a single pass
    #[serde(default)]
    pub daemon: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Start from the stored checkpoint (false = archive everything again)
    #[serde(default = "default_true")]
    pub resume: bool,
    /// Give up on a message after this many failed passes (unset = retry forever)
    #[serde(default)]
    pub retry_limit: Option<u32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            daemon: false,
            poll_interval_secs: default_poll_interval_secs(),
            resume: true,
            retry_limit: None,
        }
    }
}

fn default_imap_port() -> u16 {
    DEFAULT_IMAP_PORT
}

fn default_true() -> bool {
    true
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("emails")
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("mailkeep");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load `path` if given, else the default config file if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Self::config_path()?;
                if default_path.exists() {
                    Self::load_from(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Check the settings that have no usable default.
    pub fn validate(&self) -> Result<()> {
        if self.account.imap.server.trim().is_empty() {
            anyhow::bail!("No IMAP server configured. Pass --server or set [account.imap] server.");
        }
        if self.account.username.trim().is_empty() {
            anyhow::bail!("No username configured. Pass --username or set [account] username.");
        }
        if self.account.folder.trim().is_empty() {
            anyhow::bail!("Folder name must not be empty");
        }
        Ok(())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.archive
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| self.archive.output_dir.join(CHECKPOINT_FILE_NAME))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.archive
            .log_dir
            .clone()
            .unwrap_or_else(|| self.archive.output_dir.join("..").join("logs"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }
}
