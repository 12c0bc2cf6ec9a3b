//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use voxcast_telephony::ProviderConfig;
use voxcast_voice::{CdnConfig, TtsConfig};

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

    /// Publicly reachable base URL. The telephony provider fetches scripts
    /// from and posts callbacks to this origin, so it must not be localhost.
    #[serde(default)]
    pub public_url: String,

    /// Telephony provider credentials.
    #[serde(default)]
    pub telephony: ProviderConfig,

    /// TTS service settings.
    #[serde(default)]
    pub tts: TtsConfig,

    /// CDN upload settings.
    #[serde(default)]
    pub cdn: CdnConfig,

    /// Optional do-not-disturb registry.
    #[serde(default)]
    pub dnd: DndConfig,

    /// Dispatch engine defaults.
    #[serde(default)]
    pub engine: EngineConfig,
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

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "voxcast_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Do-not-disturb registry configuration. Absent endpoint means the check
/// resolves `unchecked`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DndConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Dispatch engine defaults, overridable per campaign.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Single documented retry-delay default: 5 minutes.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: i64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3100
}

fn default_db_path() -> String {
    "voxcast.db".to_string()
}

fn default_busy_timeout_ms() -> u32 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_concurrent() -> u32 {
    voxcast_types::broadcast::DEFAULT_MAX_CONCURRENT
}

fn default_max_retries() -> u32 {
    voxcast_types::broadcast::DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> i64 {
    voxcast_types::broadcast::DEFAULT_RETRY_DELAY_MS
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

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
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
/// - `VOXCAST_HOST`, `VOXCAST_PORT`
/// - `VOXCAST_DB_PATH`
/// - `VOXCAST_LOG_LEVEL`, `VOXCAST_LOG_JSON`
/// - `VOXCAST_PUBLIC_URL`
/// - `VOXCAST_TELEPHONY_API_BASE`, `VOXCAST_TELEPHONY_ACCOUNT_ID`,
///   `VOXCAST_TELEPHONY_AUTH_TOKEN`, `VOXCAST_TELEPHONY_FROM_NUMBER`,
///   `VOXCAST_SIGNING_SECRET`
/// - `VOXCAST_TTS_ENDPOINT`
/// - `VOXCAST_CDN_BASE_URL`, `VOXCAST_CDN_API_KEY`, `VOXCAST_CDN_FOLDER`
/// - `VOXCAST_DND_ENDPOINT`
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

    // Environment variable overrides
    if let Ok(host) = std::env::var("VOXCAST_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("VOXCAST_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("VOXCAST_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("VOXCAST_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("VOXCAST_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(url) = std::env::var("VOXCAST_PUBLIC_URL") {
        config.public_url = url;
    }
    if let Ok(v) = std::env::var("VOXCAST_TELEPHONY_API_BASE") {
        config.telephony.api_base = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_TELEPHONY_ACCOUNT_ID") {
        config.telephony.account_id = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_TELEPHONY_AUTH_TOKEN") {
        config.telephony.auth_token = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_TELEPHONY_FROM_NUMBER") {
        config.telephony.from_number = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_SIGNING_SECRET") {
        config.telephony.signing_secret = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_TTS_ENDPOINT") {
        config.tts.endpoint = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_CDN_BASE_URL") {
        config.cdn.base_url = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_CDN_API_KEY") {
        config.cdn.api_key = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_CDN_FOLDER") {
        config.cdn.folder = v;
    }
    if let Ok(v) = std::env::var("VOXCAST_DND_ENDPOINT") {
        config.dnd.endpoint = Some(v);
    }

    Ok(config)
}

/// Startup checks that do not prevent boot but must be loudly visible.
pub fn startup_warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.public_url.trim().is_empty() {
        warnings.push(
            "public_url is not set; the telephony provider cannot fetch scripts or deliver webhooks"
                .to_string(),
        );
    } else if config.public_url.contains("localhost") || config.public_url.contains("127.0.0.1") {
        warnings.push(format!(
            "public_url '{}' points at localhost; the telephony provider cannot reach it",
            config.public_url
        ));
    }

    if config.telephony.account_id.is_empty() || config.telephony.auth_token.is_empty() {
        warnings.push("telephony credentials are not configured; dialing will fail".to_string());
    }
    if config.telephony.from_number.is_empty() {
        warnings.push("telephony from_number is not configured; dialing will fail".to_string());
    }
    if config.telephony.signing_secret.is_empty() {
        warnings.push(
            "telephony signing_secret is not configured; webhook signatures cannot be verified"
                .to_string(),
        );
    }
    if config.cdn.base_url.is_empty() {
        warnings.push("cdn.base_url is not configured; audio materialization will fail".to_string());
    }

    warnings
}
