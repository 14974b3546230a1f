//! Configuration system for the SONAR CLI.

use serde::{Deserialize, Serialize};
use sonar_core::{Bitrate, EngineConfig};
use sonar_transport::AccessPoint;
use sonar_transport::resolver::ResolverConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SONAR configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Engine timeouts and buffering
    #[serde(default)]
    pub engine: EngineSection,
    /// Access-point resolution
    #[serde(default)]
    pub resolver: ResolverSection,
    /// Account storage
    #[serde(default)]
    pub account: AccountConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Handshake step timeout in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Seconds without chunk traffic before reconnecting
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_secs: u64,
    /// Reconnect attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Output pipe capacity in blocks
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
    /// Preferred bitrate (96, 160, 320 or any)
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    /// Device id sent at login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSection {
    /// Directory endpoint
    #[serde(default = "default_resolver_url")]
    pub url: String,
    /// Access point used when resolution fails (host:port)
    #[serde(default = "default_fallback")]
    pub fallback: String,
    /// Seconds a failing access point is skipped
    #[serde(default = "default_avoid_window")]
    pub avoid_window_secs: u64,
    /// Minimum seconds between directory queries
    #[serde(default = "default_resolve_cooldown")]
    pub resolve_cooldown_secs: u64,
}

/// Account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Where reusable credentials are kept
    #[serde(default = "default_credentials_path")]
    pub credentials_file: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_handshake_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    10
}

fn default_chunk_timeout() -> u64 {
    20
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_pipe_capacity() -> usize {
    64
}

fn default_bitrate() -> String {
    "160".to_string()
}

fn default_resolver_url() -> String {
    sonar_transport::DEFAULT_RESOLVER_URL.to_string()
}

fn default_fallback() -> String {
    format!(
        "{}:{}",
        sonar_transport::FALLBACK_HOST,
        sonar_transport::FALLBACK_PORT
    )
}

fn default_avoid_window() -> u64 {
    300
}

fn default_resolve_cooldown() -> u64 {
    60
}

fn default_credentials_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sonar/credentials.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout(),
            request_timeout_secs: default_request_timeout(),
            chunk_timeout_secs: default_chunk_timeout(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            pipe_capacity: default_pipe_capacity(),
            bitrate: default_bitrate(),
            device_id: None,
        }
    }
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            url: default_resolver_url(),
            fallback: default_fallback(),
            avoid_window_secs: default_avoid_window(),
            resolve_cooldown_secs: default_resolve_cooldown(),
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("sonar/config.toml")
    }

    /// Load config from the default path, falling back to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine
            .bitrate
            .parse::<Bitrate>()
            .map_err(|e| anyhow::anyhow!("Invalid bitrate: {e}"))?;

        self.resolver
            .fallback
            .parse::<AccessPoint>()
            .map_err(|e| anyhow::anyhow!("Invalid fallback access point: {e}"))?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        // timeouts, capacities and the resolver url
        self.engine_config()?.validate()?;
        Ok(())
    }

    /// Map onto the engine configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the bitrate or fallback address does not parse.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let defaults = EngineConfig::default();
        Ok(EngineConfig {
            resolver: ResolverConfig {
                url: self.resolver.url.clone(),
                fallback: self.resolver.fallback.parse()?,
                avoid_window: Duration::from_secs(self.resolver.avoid_window_secs),
                resolve_cooldown: Duration::from_secs(self.resolver.resolve_cooldown_secs),
                ..ResolverConfig::default()
            },
            handshake_timeout: Duration::from_secs(self.engine.handshake_timeout_secs),
            request_timeout: Duration::from_secs(self.engine.request_timeout_secs),
            chunk_timeout: Duration::from_secs(self.engine.chunk_timeout_secs),
            max_reconnect_attempts: self.engine.max_reconnect_attempts,
            pipe_capacity: self.engine.pipe_capacity,
            preferred_bitrate: self.engine.bitrate.parse()?,
            device_id: self.engine.device_id.clone().unwrap_or(defaults.device_id.clone()),
            ..defaults
        })
    }
}
