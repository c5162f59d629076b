//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Summary and translation model settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Staff authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "concierge_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// OpenAI-compatible chat completion endpoint used for summaries and
/// translation.
#[derive(Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer key. Without one every summary falls back to the basic form.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Staff authentication configuration.
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for staff bearer tokens. Staff routes answer 500 while
    /// it is unset.
    #[serde(default)]
    pub staff_jwt_secret: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "staff_jwt_secret",
                &self.staff_jwt_secret.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_db_path() -> String {
    "concierge.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CONCIERGE_HOST` overrides `server.host`
/// - `CONCIERGE_PORT` overrides `server.port`
/// - `CONCIERGE_DB_PATH` overrides `database.path`
/// - `CONCIERGE_LOG_LEVEL` overrides `logging.level`
/// - `CONCIERGE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `OPENAI_API_KEY` overrides `generation.api_key`
/// - `CONCIERGE_STAFF_JWT_SECRET` overrides `auth.staff_jwt_secret`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("CONCIERGE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("CONCIERGE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("CONCIERGE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("CONCIERGE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("CONCIERGE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.trim().is_empty() {
            config.generation.api_key = Some(key);
        }
    }
    if let Ok(secret) = std::env::var("CONCIERGE_STAFF_JWT_SECRET") {
        if !secret.trim().is_empty() {
            config.auth.staff_jwt_secret = Some(secret);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [generation]
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "concierge.db");
        assert_eq!(config.database.pool_max_size, 8);
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.timeout_secs, 60);
        assert!(config.auth.staff_jwt_secret.is_none());
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let config = Config {
            generation: GenerationConfig {
                api_key: Some("sk-live-123".to_string()),
                ..GenerationConfig::default()
            },
            auth: AuthConfig {
                staff_jwt_secret: Some("hunter2".to_string()),
            },
            ..Config::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-live-123"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.server.port, default_port());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            load_config(path.to_str()),
            Err(ConfigError::Parse(_))
        ));
    }
}
