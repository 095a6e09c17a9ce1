// Configuration loading and parsing (config/draft.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// draft.toml structs
// ---------------------------------------------------------------------------

/// Top-level deserialization target for draft.toml.
#[derive(Debug, Clone, Deserialize)]
struct DraftFile {
    league: LeagueConfig,
    authority: AuthorityConfig,
    #[serde(default)]
    polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    /// League identifier at the authority.
    pub id: String,
    /// Display name, used only for logging.
    pub name: String,
    /// The participant this client acts as.
    pub my_participant_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Base URL of the remote draft authority, e.g. "https://draft.example.com".
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// How often to poll the full snapshot endpoint.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
    /// How often to poll the lightweight status endpoint.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    /// Local clock tick cadence driving countdown re-derivation.
    #[serde(default = "default_tick")]
    pub tick_millis: u64,
    /// Consecutive poll failures before the view is flagged stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_failures: u32,
}

fn default_snapshot_interval() -> u64 {
    10
}
fn default_status_interval() -> u64 {
    3
}
fn default_tick() -> u64 {
    1000
}
fn default_stale_after() -> u32 {
    3
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            snapshot_interval_secs: default_snapshot_interval(),
            status_interval_secs: default_status_interval(),
            tick_millis: default_tick(),
            stale_after_failures: default_stale_after(),
        }
    }
}

/// The assembled, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub authority: AuthorityConfig,
    pub polling: PollingConfig,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/draft.toml` relative to the
/// given `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("draft.toml");
    let text = read_file(&path)?;
    let file: DraftFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        league: file.league,
        authority: file.authority,
        polling: file.polling,
    };

    validate(&config)?;
    Ok(config)
}

/// Convenience wrapper: loads from the user's config directory when one
/// exists (`~/.config/grid-draft` on Linux), falling back to the current
/// working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    if let Some(dirs) = directories::ProjectDirs::from("", "", "grid-draft") {
        let base = dirs.config_dir();
        if base.join("config").join("draft.toml").exists() {
            return load_config_from(base);
        }
    }
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_from(&cwd)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.league.id.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "league.id".into(),
            message: "must not be empty".into(),
        });
    }

    if config.league.my_participant_id.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "league.my_participant_id".into(),
            message: "must not be empty".into(),
        });
    }

    let url = &config.authority.base_url;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::ValidationError {
            field: "authority.base_url".into(),
            message: format!("must start with http:// or https://, got `{url}`"),
        });
    }

    let polling = &config.polling;
    if polling.snapshot_interval_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "polling.snapshot_interval_secs".into(),
            message: "must be greater than 0".into(),
        });
    }
    if polling.status_interval_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "polling.status_interval_secs".into(),
            message: "must be greater than 0".into(),
        });
    }
    if polling.tick_millis == 0 {
        return Err(ConfigError::ValidationError {
            field: "polling.tick_millis".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}
