//! Path utilities.
//!
//! Platform directories used by stockpile.

use std::path::{Path, PathBuf};

/// Get the stockpile configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/stockpile` if set
/// - `~/.config/stockpile` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stockpile"))
}

/// Get the stockpile data directory.
///
/// This follows XDG conventions:
/// - `$XDG_DATA_HOME/stockpile` if set
/// - `~/.local/share/stockpile` otherwise
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("stockpile"))
}

/// Get the default directory of the key/value store.
pub fn store_dir() -> Option<PathBuf> {
    data_dir().map(|p| p.join("store"))
}

/// Get the stockpile logs directory.
pub fn logs_dir() -> Option<PathBuf> {
    data_dir().map(|p| p.join("logs"))
}

/// Get the global config file path.
pub fn global_config_file() -> Option<PathBuf> {
    config_dir().map(|p| p.join("config.json"))
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
