//! Login credentials.

use crate::proto::{AUTH_STORED, AUTH_TOKEN, AUTH_USER_PASS};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret presented at login, paired with a username.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum Credentials {
    /// Account password
    Password(String),
    /// Reusable blob returned by an earlier login
    Stored(Vec<u8>),
    /// OAuth access token
    Token(String),
}

impl Credentials {
    /// Wire authentication type and payload.
    pub(crate) fn auth(&self) -> (i32, Vec<u8>) {
        match self {
            Self::Password(password) => (AUTH_USER_PASS, password.as_bytes().to_vec()),
            Self::Stored(blob) => (AUTH_STORED, blob.clone()),
            Self::Token(token) => (AUTH_TOKEN, token.as_bytes().to_vec()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Password(_) => "Password",
            Self::Stored(_) => "Stored",
            Self::Token(_) => "Token",
        };
        write!(f, "Credentials::{kind}(<redacted>)")
    }
}

/// Credentials the server handed back after a successful login.
///
/// Log in again with `Credentials::Stored(auth_data)` under `username`
/// without asking for the password.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoredCredentials {
    /// Canonical account name
    pub username: String,
    /// Opaque reusable blob
    pub auth_data: Vec<u8>,
}

impl StoredCredentials {
    /// Convert into login credentials.
    #[must_use]
    pub fn to_credentials(&self) -> Credentials {
        Credentials::Stored(self.auth_data.clone())
    }
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("username", &self.username)
            .field("auth_data", &format_args!("<{} bytes>", self.auth_data.len()))
            .finish()
    }
}
