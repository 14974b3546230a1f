//! # SONAR Transport
//!
//! Network plumbing for the SONAR access-point client.
//!
//! This crate provides:
//! - The [`Connector`](transport::Connector) seam that opens a byte stream to
//!   an access point, with a TCP implementation
//! - The [`HttpClient`](http::HttpClient) collaborator trait injected by the
//!   host application
//! - Access-point resolution with per-server avoidance and a re-resolution
//!   cooldown

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod http;
pub mod resolver;
pub mod transport;

pub use transport::{AccessPoint, ApStream, BoxedStream, Connector, TcpConnector, TransportError};

/// Default access-point directory endpoint
pub const DEFAULT_RESOLVER_URL: &str = "https://apresolve.spotify.com/?type=accesspoint";

/// Host of the access point used when resolution fails
pub const FALLBACK_HOST: &str = "ap.spotify.com";

/// Port of the access point used when resolution fails
pub const FALLBACK_PORT: u16 = 443;
