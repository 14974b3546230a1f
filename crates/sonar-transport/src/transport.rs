//! Connector abstraction for access-point byte streams.
//!
//! The engine never opens sockets itself: it asks a [`Connector`] for a
//! bidirectional byte stream to a chosen [`AccessPoint`]. Hosts inject the
//! default [`TcpConnector`]; tests inject in-memory streams.

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport is closed
    #[error("Transport is closed")]
    Closed,

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connect attempt timed out
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// Malformed `host:port` string
    #[error("Invalid access point address: {0}")]
    InvalidAddress(String),

    /// HTTP collaborator failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// An access point endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPoint {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl AccessPoint {
    /// Create a new access point
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for AccessPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for AccessPoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(TransportError::InvalidAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| TransportError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// A bidirectional byte stream to an access point.
pub trait ApStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ApStream for T {}

/// Boxed access-point stream
pub type BoxedStream = Box<dyn ApStream>;

/// Opens byte streams to access points.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a stream to `ap`.
    ///
    /// # Errors
    /// Returns `TransportError` if the endpoint cannot be reached.
    async fn connect(&self, ap: &AccessPoint) -> TransportResult<BoxedStream>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    keepalive: Duration,
}

impl TcpConnector {
    /// Create a connector with the given connect timeout
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            keepalive: Duration::from_secs(60),
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, ap: &AccessPoint) -> TransportResult<BoxedStream> {
        let target = ap.to_string();
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((ap.host.as_str(), ap.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(target.clone()))?
        .map_err(|e| TransportError::ConnectionFailed(format!("{target}: {e}")))?;

        stream.set_nodelay(true)?;
        SockRef::from(&stream).set_tcp_keepalive(&TcpKeepalive::new().with_time(self.keepalive))?;

        debug!(access_point = %target, peer = ?stream.peer_addr().ok(), "TCP connected");
        Ok(Box::new(stream))
    }
}
