//! Runtime configuration loaded from `sensor-chart.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Command-line flags override whatever is loaded here.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::file_cache::CachePolicy;

pub const CONFIG_FILE_NAME: &str = "sensor-chart.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// JSON file standing in for the browser's local storage.
    pub store_path: PathBuf,
    /// The TUI owns the terminal, so logs go here.
    pub log_file: PathBuf,
    pub log_level: String,
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Keep at most this many files, evicting the oldest upload. Unset means unbounded.
    pub max_files: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("csv_store.json"),
            log_file: PathBuf::from("sensor-chart.log"),
            log_level: "info".to_string(),
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `explicit` if given, else the first default location that exists, else
    /// defaults. Also returns the path that was loaded.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let candidates = [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("config").join(CONFIG_FILE_NAME),
        ];
        for path in candidates {
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok((config, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            max_files: self.cache.max_files,
        }
    }
}
