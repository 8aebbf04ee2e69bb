//! Configuration management for Omnipost

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
    #[serde(default)]
    pub cron: CronConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Per-platform app registrations. A platform with no section here is
/// never dispatched to, regardless of connected accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    pub x: Option<OauthAppConfig>,
    pub facebook: Option<OauthAppConfig>,
    pub instagram: Option<OauthAppConfig>,
    pub bluesky: Option<BlueskyConfig>,
    pub linkedin: Option<OauthAppConfig>,
    pub pinterest: Option<OauthAppConfig>,
    pub tiktok: Option<OauthAppConfig>,
}

/// Client credentials for one OAuth app, used when refreshing user tokens.
///
/// `api_base` overrides the provider's production endpoint and exists for
/// integration testing against a local server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthAppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    /// PDS base URL, e.g. https://bsky.social
    pub service: String,
    /// Path to the JSON file holding the account-level DPoP signing key.
    pub dpop_key_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronConfig {
    /// Shared secret for the HTTP trigger. `OMNIPOST_CRON_SECRET` takes
    /// precedence when set.
    pub secret: Option<String>,
    pub bind: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/omnipost/omnipost.db".to_string(),
            },
            platforms: PlatformsConfig::default(),
            cron: CronConfig {
                secret: None,
                bind: Some("127.0.0.1:8787".to_string()),
            },
        }
    }

    /// The shared secret guarding the cron trigger endpoint.
    pub fn cron_secret(&self) -> Option<String> {
        std::env::var("OMNIPOST_CRON_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.cron.secret.clone())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("OMNIPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("omnipost").join("config.toml"))
}
