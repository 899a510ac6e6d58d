use std::path::{Path, PathBuf};

use liblpr::ClientConfig;
use serde::Deserialize;
use tracing::warn;

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Printer host used when `--host` is not given
    pub host: Option<String>,

    /// Queue used when `--queue` is not given
    pub queue: String,

    /// Library settings
    pub client: ClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            queue: "lp".to_string(),
            client: ClientConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `path`, or the default location
    /// (~/.config/lprc/config.toml)
    pub fn load(path: Option<&Path>) -> Self {
        match path.map(Path::to_path_buf).or_else(Self::config_path) {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// A missing file gives the defaults; an unreadable one is reported
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        toml::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
            Self::default()
        })
    }

    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lprc/config.toml"))
    }
}
