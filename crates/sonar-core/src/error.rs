//! Error types for the SONAR engine.
//!
//! Errors are categorized to drive reconnect logic:
//!
//! - **Transient**: the connection went away or a reply never arrived. After
//!   login these trigger reconnect-and-resume before surfacing.
//! - **Protocol**: malformed data, MAC failures, rejected keys. They abort
//!   the current command with their specific kind.
//! - **Host**: stale handles, busy resources, bad configuration.

use sonar_crypto::CryptoError;
use sonar_transport::TransportError;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Error)]
pub enum Error {
    // ============ Protocol Errors ============
    /// Malformed or unexpected protocol data
    #[error("invalid protocol data: {0}")]
    InvalidData(Cow<'static, str>),

    /// Packet MAC verification failed
    #[error("decryption failed: packet MAC mismatch")]
    Decryption,

    /// Other cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// The access point refused the file key
    #[error("file key unavailable (status {0:#06x})")]
    KeyUnavailable(u16),

    /// Metadata lookup failed or no playable file exists
    #[error("track unavailable: {0}")]
    Unavailable(String),

    // ============ Connection Errors ============
    /// Writing to the access point failed
    #[error("write failed: {0}")]
    Write(String),

    /// No live connection (or the engine worker is gone)
    #[error("no connection")]
    NoConnection,

    /// A reply did not arrive in time
    #[error("timed out waiting for {0}")]
    Timeout(Cow<'static, str>),

    /// Transport layer failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    // ============ Host Errors ============
    /// Channel busy, channel table full or seek during a download
    #[error("resource occupied: {0}")]
    Occupied(Cow<'static, str>),

    /// Stale or unknown session/track handle
    #[error("no such session")]
    NoSession,

    /// Authentication was refused
    #[error("login failed: {0}")]
    LoginFailed(LoginFailure),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns true if the error may clear after reconnecting.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::NoConnection | Error::Timeout(_) | Error::Write(_) | Error::Transport(_)
        )
    }

    /// Create an invalid-data error with static context (zero allocation)
    #[must_use]
    pub const fn invalid(context: &'static str) -> Self {
        Error::InvalidData(Cow::Borrowed(context))
    }

    /// Create a timeout error with static context (zero allocation)
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        Error::Timeout(Cow::Borrowed(context))
    }

    /// Create an occupied error with static context (zero allocation)
    #[must_use]
    pub const fn occupied(context: &'static str) -> Self {
        Error::Occupied(Cow::Borrowed(context))
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MacMismatch => Error::Decryption,
            CryptoError::InvalidPublicKey
            | CryptoError::InvalidKeyLength { .. }
            | CryptoError::InvalidBase62(_) => {
                Error::InvalidData(Cow::Owned(err.to_string()))
            }
            other => Error::Crypto(other),
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::InvalidData(Cow::Owned(format!("protobuf: {err}")))
    }
}

/// Reason reported by the access point when authentication fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// Generic protocol error
    ProtocolError,
    /// Access point asked us to try another one
    TryAnotherAp,
    /// Connection id rejected
    BadConnectionId,
    /// Account used outside its country
    TravelRestriction,
    /// Account tier does not allow this client
    PremiumAccountRequired,
    /// Wrong username or password
    BadCredentials,
    /// Credentials could not be validated
    CouldNotValidateCredentials,
    /// Account already exists
    AccountExists,
    /// Extra verification required
    ExtraVerificationRequired,
    /// Application key rejected
    InvalidAppKey,
    /// Application banned
    ApplicationBanned,
    /// Code not known to this client
    Unknown(i32),
}

impl LoginFailure {
    /// Map the wire error code.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::ProtocolError,
            2 => Self::TryAnotherAp,
            5 => Self::BadConnectionId,
            9 => Self::TravelRestriction,
            11 => Self::PremiumAccountRequired,
            12 => Self::BadCredentials,
            13 => Self::CouldNotValidateCredentials,
            14 => Self::AccountExists,
            15 => Self::ExtraVerificationRequired,
            16 => Self::InvalidAppKey,
            17 => Self::ApplicationBanned,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolError => f.write_str("protocol error"),
            Self::TryAnotherAp => f.write_str("try another access point"),
            Self::BadConnectionId => f.write_str("bad connection id"),
            Self::TravelRestriction => f.write_str("travel restriction"),
            Self::PremiumAccountRequired => f.write_str("premium account required"),
            Self::BadCredentials => f.write_str("bad credentials"),
            Self::CouldNotValidateCredentials => f.write_str("could not validate credentials"),
            Self::AccountExists => f.write_str("account exists"),
            Self::ExtraVerificationRequired => f.write_str("extra verification required"),
            Self::InvalidAppKey => f.write_str("invalid application key"),
            Self::ApplicationBanned => f.write_str("application banned"),
            Self::Unknown(code) => write!(f, "unknown error code {code}"),
        }
    }
}
