//! Persistent configuration for the blueprint CLI.
//!
//! Config file lives at `~/.config/blueprint/client.toml`.
//! The session token is stored separately (see [`blueprint_sdk::FileStore`]).

use std::path::{Path, PathBuf};

use blueprint_sdk::FileStore;
use blueprint_sdk::api::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};

/// User configuration (persisted in client.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Backend base URL. Default: http://localhost:8080
    pub api_url: Option<String>,
    /// Where the session token is kept.
    pub session_file: Option<PathBuf>,
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blueprint")
        .join("client.toml")
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// A missing file is the default config; a bad one is reported and
    /// ignored.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => return c,
                    Err(e) => tracing::warn!("Bad config file {}: {e}", path.display()),
                },
                Err(e) => tracing::warn!("Can't read {}: {e}", path.display()),
            }
        }
        Self::default()
    }
}

/// Effective settings after merging CLI args > config file > defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub api_url: String,
    pub session_file: PathBuf,
}

impl Resolved {
    pub fn merge(cli_api_url: Option<&str>, cli_session_file: Option<&Path>, config: &Config) -> Self {
        let api_url = cli_api_url
            .map(str::to_string)
            .or_else(|| config.api_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let session_file = cli_session_file
            .map(Path::to_path_buf)
            .or_else(|| config.session_file.clone())
            .unwrap_or_else(FileStore::default_path);

        Self {
            api_url,
            session_file,
        }
    }
}
