//! Daemon configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use encore_core::{Role, ServerMode, Settings};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Operating mode at startup
    #[serde(default)]
    pub server: ServerConfig,
    /// Session tokens
    #[serde(default)]
    pub auth: AuthConfig,
    /// Initial karaoke settings
    #[serde(default)]
    pub settings: Settings,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Socket path (optional, uses the runtime dir if not set)
    pub socket_path: Option<PathBuf>,
    /// Playback tick interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), socket_path: None, tick_ms: default_tick_ms() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_ms() -> u64 {
    1000
}

/// Server mode settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Start in limited mode
    #[serde(default)]
    pub limited: bool,
}

impl ServerConfig {
    pub fn mode(&self) -> ServerMode {
        if self.limited { ServerMode::Limited } else { ServerMode::Normal }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// A session token and the identity it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub role: Role,
    /// Display name; defaults to the role name
    pub nickname: Option<String>,
}

/// Load configuration from file or defaults.
pub fn load_config() -> Result<Config> {
    let config_path = config_path()?;

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
        Ok(config)
    } else {
        info!(?config_path, "Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "encore", "Encore")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [daemon]
            log_level = "debug"

            [server]
            limited = true

            [[auth.tokens]]
            token = "s3cret"
            role = "admin"
            nickname = "Host"

            [[auth.tokens]]
            token = "guest-pass"
            role = "user"

            [settings.karaoke]
            classicMode = true
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.tick_ms, 1000);
        assert_eq!(config.server.mode(), ServerMode::Limited);
        assert_eq!(config.auth.tokens.len(), 2);
        assert_eq!(config.auth.tokens[0].role, Role::Admin);
        assert!(config.settings.karaoke.classic_mode);
        assert_eq!(config.settings.playlist.max_songs_per_user, 5);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.mode(), ServerMode::Normal);
        assert!(config.auth.tokens.is_empty());
        assert_eq!(config.settings, Settings::default());
    }
}
