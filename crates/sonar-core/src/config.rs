//! Engine configuration

use crate::error::{Error, Result};
use sonar_transport::resolver::ResolverConfig;
use std::str::FromStr;
use std::time::Duration;

/// Preferred audio quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bitrate {
    /// Ogg-Vorbis 96 kbit/s
    B96,
    /// Ogg-Vorbis 160 kbit/s
    #[default]
    B160,
    /// Ogg-Vorbis 320 kbit/s
    B320,
    /// Whatever is available
    Any,
}

impl Bitrate {
    /// Nominal rate in kbit/s, `None` for [`Bitrate::Any`]
    #[must_use]
    pub fn kbps(self) -> Option<u32> {
        match self {
            Self::B96 => Some(96),
            Self::B160 => Some(160),
            Self::B320 => Some(320),
            Self::Any => None,
        }
    }
}

impl FromStr for Bitrate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "96" => Ok(Self::B96),
            "160" => Ok(Self::B160),
            "320" => Ok(Self::B320),
            "any" => Ok(Self::Any),
            other => Err(Error::InvalidConfig(format!("unknown bitrate {other:?}"))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Access-point resolution and avoidance
    pub resolver: ResolverConfig,

    /// Timeout for each handshake read
    pub handshake_timeout: Duration,

    /// Timeout for reply-expecting requests (login, metadata, key)
    pub request_timeout: Duration,

    /// A chunk download with no traffic for this long counts as stalled
    pub chunk_timeout: Duration,

    /// Period of the stall-detection tick
    pub tick_interval: Duration,

    /// Reconnect attempts before an operation fails
    pub max_reconnect_attempts: u32,

    /// Output pipe capacity per track (in blocks)
    pub pipe_capacity: usize,

    /// Device identifier sent at login
    pub device_id: String,

    /// Client version string sent at login
    pub version_string: String,

    /// Default audio quality for new sessions
    pub preferred_bitrate: Bitrate,

    /// Hashcash iteration budget
    pub hashcash_max_iterations: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            chunk_timeout: Duration::from_secs(20),
            tick_interval: Duration::from_secs(1),
            max_reconnect_attempts: 3,
            pipe_capacity: 64,
            device_id: "sonar-0000000000000000".to_string(),
            version_string: concat!("sonar-", env!("CARGO_PKG_VERSION")).to_string(),
            preferred_bitrate: Bitrate::default(),
            hashcash_max_iterations: sonar_crypto::hashcash::DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl EngineConfig {
    /// Validate configuration
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let zero = |name: &str| Error::InvalidConfig(format!("{name} must be non-zero"));

        if self.handshake_timeout.is_zero() {
            return Err(zero("handshake_timeout"));
        }
        if self.request_timeout.is_zero() {
            return Err(zero("request_timeout"));
        }
        if self.chunk_timeout.is_zero() {
            return Err(zero("chunk_timeout"));
        }
        if self.tick_interval.is_zero() {
            return Err(zero("tick_interval"));
        }
        if self.pipe_capacity == 0 {
            return Err(zero("pipe_capacity"));
        }
        if self.device_id.is_empty() {
            return Err(Error::InvalidConfig("device_id must not be empty".into()));
        }
        if !self.resolver.url.starts_with("http://") && !self.resolver.url.starts_with("https://")
        {
            return Err(Error::InvalidConfig(format!(
                "resolver url {} is not http(s)",
                self.resolver.url
            )));
        }
        Ok(())
    }
}
