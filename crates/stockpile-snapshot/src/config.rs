//! Configuration for stockpile.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `<config_dir>/stockpile/config.json`
//! 2. Environment variable: `STOCKPILE_CONFIG_CONTENT`
//! 3. An explicitly named file
//!
//! `STOCKPILE_DATA_DIR` then overrides the data directory from any file.

use crate::resolver::RepairPolicy;
use crate::{SnapshotError, SnapshotResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stockpile_util::LogLevel;
use tracing::debug;

/// Environment variable holding inline JSON config.
pub const CONFIG_CONTENT_ENV: &str = "STOCKPILE_CONFIG_CONTENT";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "STOCKPILE_DATA_DIR";

/// Stockpile configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of the key/value store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// How the current pointer is repaired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairPolicy>,

    /// Log level when `RUST_LOG` is not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Returns the merged config and the files it was read from.
    pub fn load(explicit: Option<&Path>) -> SnapshotResult<(Self, Vec<PathBuf>)> {
        let global = stockpile_util::path::global_config_file();
        let inline = std::env::var(CONFIG_CONTENT_ENV).ok();
        let data_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        Self::load_layers(global.as_deref(), inline.as_deref(), explicit, data_dir)
    }

    /// Merge the given layers in order. Missing global files are skipped;
    /// a missing explicit file is an error.
    pub fn load_layers(
        global: Option<&Path>,
        inline: Option<&str>,
        explicit: Option<&Path>,
        data_dir_override: Option<PathBuf>,
    ) -> SnapshotResult<(Self, Vec<PathBuf>)> {
        let mut config = Config::default();
        let mut sources = Vec::new();

        if let Some(path) = global.filter(|p| p.exists()) {
            config = config.merge(Self::load_file(path)?);
            sources.push(path.to_path_buf());
        }

        if let Some(content) = inline.filter(|c| !c.trim().is_empty()) {
            config = config.merge(Self::parse(content, "<env>")?);
        }

        if let Some(path) = explicit {
            config = config.merge(Self::load_file(path)?);
            sources.push(path.to_path_buf());
        }

        if let Some(dir) = data_dir_override {
            config.data_dir = Some(dir);
        }

        debug!(sources = sources.len(), "Loaded config");
        Ok((config, sources))
    }

    /// Load configuration from a file.
    pub fn load_file(path: &Path) -> SnapshotResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SnapshotError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse configuration text. `source` names it in errors.
    pub fn parse(content: &str, source: &str) -> SnapshotResult<Self> {
        serde_json::from_str(content).map_err(|e| SnapshotError::Config(format!("{source}: {e}")))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.repair.is_some() {
            self.repair = other.repair;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        self
    }

    /// Directory of the key/value store, falling back to the platform default.
    pub fn store_dir(&self) -> Option<PathBuf> {
        match &self.data_dir {
            Some(dir) => Some(stockpile_util::path::expand_home(dir)),
            None => stockpile_util::path::store_dir(),
        }
    }

    /// Repair policy, defaulting to [`RepairPolicy::Earliest`].
    pub fn repair_policy(&self) -> RepairPolicy {
        self.repair.unwrap_or_default()
    }
}
