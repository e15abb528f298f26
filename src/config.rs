// Configuration for the taskflow binary

use crate::kv::{FileKv, KvStore, MemoryKv, SqliteKv};
use crate::persist::{CURRENT_KEY, LEGACY_KEY, Persistence};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Settings read from `config.yml`
///
/// Every field is optional in the file; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the backend keeps its files (default: platform data dir)
    pub data_dir: Option<PathBuf>,
    pub backend: Backend,
    pub current_key: String,
    pub legacy_key: String,
    /// Delete the legacy key after a successful migration
    pub clear_legacy: bool,
    /// tracing level: error, warn, info, debug or trace
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            backend: Backend::File,
            current_key: CURRENT_KEY.to_string(),
            legacy_key: LEGACY_KEY.to_string(),
            clear_legacy: false,
            log_level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Sqlite,
    /// Nothing survives the process; useful for dry runs
    Memory,
}

impl FromStr for Backend {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Backend::File),
            "sqlite" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            _ => Err(eyre!("Unknown backend: {} (expected file, sqlite or memory)", s)),
        }
    }
}

impl Config {
    /// `<config dir>/taskflow/config.yml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("taskflow").join("config.yml"))
    }

    /// Load from an explicit path (must exist) or the default path (optional)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        config.log_level()?;
        Ok(config)
    }

    pub fn log_level(&self) -> Result<tracing::Level> {
        tracing::Level::from_str(&self.log_level).map_err(|_| eyre!("Invalid log level: {}", self.log_level))
    }

    /// Configured data dir, else `<data dir>/taskflow`, else `./.taskflow`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("taskflow")))
            .unwrap_or_else(|| PathBuf::from(".taskflow"))
    }

    pub fn open_backend(&self) -> Result<Box<dyn KvStore>> {
        let dir = self.data_dir();
        let kv: Box<dyn KvStore> = match self.backend {
            Backend::File => Box::new(
                FileKv::open(&dir).with_context(|| format!("Failed to open data directory {}", dir.display()))?,
            ),
            Backend::Sqlite => {
                fs::create_dir_all(&dir).context("Failed to create data directory")?;
                let db_path = dir.join("taskflow.db");
                Box::new(
                    SqliteKv::open(&db_path)
                        .with_context(|| format!("Failed to open SQLite database {}", db_path.display()))?,
                )
            }
            Backend::Memory => Box::new(MemoryKv::new()),
        };
        debug!(backend = ?self.backend, dir = %dir.display(), "Opened storage backend");
        Ok(kv)
    }

    pub fn persistence(&self) -> Result<Persistence<Box<dyn KvStore>>> {
        Ok(Persistence::new(self.open_backend()?)
            .with_keys(&self.current_key, &self.legacy_key)
            .clear_legacy(self.clear_legacy))
    }
}
