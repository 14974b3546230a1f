//! Plaintext handshake and encrypted login.
//!
//! ```text
//! client                                   access point
//!   │── 00 04 | len u32 | ClientHello ─────────▶│
//!   │◀──────────── len u32 | APResponseMessage ──│  challenge or login failure
//!   │── len u32 | ClientResponsePlaintext ─────▶│  HMAC answer (+ hashcash)
//!   │════ Shannon from here on ═════════════════│
//!   │── Login(0xab) ClientResponseEncrypted ───▶│
//!   │◀─────────── APWelcome(0xac) / AuthFailure(0xad)
//! ```
//!
//! Every byte of the first two messages, length prefixes included, forms
//! the transcript the transport keys are derived from.

use crate::config::EngineConfig;
use crate::credentials::{Credentials, StoredCredentials};
use crate::error::{Error, LoginFailure, Result};
use crate::packet::Command;
use crate::proto::{
    self, ApLoginFailed, ApResponseMessage, ApWelcome, BuildInfo, ClientHello,
    ClientResponseEncrypted, ClientResponsePlaintext, CryptoResponseUnion, LoginCredentials,
    LoginCryptoDiffieHellmanHello, LoginCryptoDiffieHellmanResponse, LoginCryptoHelloUnion,
    LoginCryptoResponseUnion, PoWHashCashResponse, PoWResponseUnion, SystemInfo,
};
use bytes::{Buf, BytesMut};
use prost::Message;
use rand_core::OsRng;
use sonar_crypto::dh::{PrivateKey, PublicKey};
use sonar_crypto::shannon::{ShannonRecv, ShannonSend};
use sonar_crypto::{hashcash, kdf, random};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Version header leading the ClientHello
pub const HELLO_VERSION: [u8; 2] = [0x00, 0x04];

/// Upper bound on a plaintext handshake message
pub const MAX_HANDSHAKE_MESSAGE: usize = 64 * 1024;

/// Transport ciphers produced by a completed handshake.
pub(crate) struct Transport {
    pub(crate) send: ShannonSend,
    pub(crate) recv: ShannonRecv,
}

async fn io_step<T>(
    limit: Duration,
    what: &'static str,
    step: impl Future<Output = io::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, step).await {
        Err(_) => Err(Error::timeout(what)),
        Ok(Err(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::invalid("handshake truncated by peer"))
        }
        Ok(Err(err)) => Err(Error::Transport(err.into())),
        Ok(Ok(value)) => Ok(value),
    }
}

fn client_hello(public: &PublicKey, nonce: [u8; 16]) -> ClientHello {
    ClientHello {
        build_info: Some(BuildInfo {
            product: proto::PRODUCT_CLIENT,
            product_flags: vec![proto::PRODUCT_FLAG_NONE],
            platform: proto::PLATFORM_LINUX_X86_64,
            version: proto::BUILD_VERSION,
        }),
        fingerprints_supported: vec![],
        cryptosuites_supported: vec![proto::CRYPTO_SUITE_SHANNON],
        powschemes_supported: vec![proto::POW_HASH_CASH],
        login_crypto_hello: Some(LoginCryptoHelloUnion {
            diffie_hellman: Some(LoginCryptoDiffieHellmanHello {
                gc: public.to_bytes().to_vec(),
                server_keys_known: 1,
            }),
        }),
        client_nonce: nonce.to_vec(),
        padding: Some(vec![0x1e]),
        feature_set: None,
    }
}

/// Run the plaintext handshake and derive the transport ciphers.
///
/// # Errors
///
/// - [`Error::InvalidData`] if the reply is truncated, malformed or carries
///   an out-of-range public value
/// - [`Error::LoginFailed`] if the access point refused the hello
/// - [`Error::Timeout`] if a step exceeds `limit`
pub(crate) async fn handshake<S>(
    stream: &mut S,
    limit: Duration,
    hashcash_max_iterations: u64,
) -> Result<Transport>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let private = PrivateKey::generate(&mut OsRng);
    let nonce = random::random_16()?;

    let body = proto::encode(&client_hello(&private.public_key(), nonce));
    let size = u32::try_from(HELLO_VERSION.len() + 4 + body.len())
        .map_err(|_| Error::invalid("client hello too large"))?;
    let mut transcript = Vec::with_capacity(512);
    transcript.extend_from_slice(&HELLO_VERSION);
    transcript.extend_from_slice(&size.to_be_bytes());
    transcript.extend_from_slice(&body);

    io_step(limit, "client hello", stream.write_all(&transcript)).await?;
    io_step(limit, "client hello", stream.flush()).await?;
    debug!(bytes = transcript.len(), "Sent client hello");

    let mut header = [0u8; 4];
    io_step(limit, "access point response", stream.read_exact(&mut header)).await?;
    let size = u32::from_be_bytes(header) as usize;
    if !(4..=MAX_HANDSHAKE_MESSAGE).contains(&size) {
        return Err(Error::InvalidData(
            format!("access point response length {size}").into(),
        ));
    }
    let mut body = vec![0u8; size - 4];
    io_step(limit, "access point response", stream.read_exact(&mut body)).await?;
    transcript.extend_from_slice(&header);
    transcript.extend_from_slice(&body);

    let response = ApResponseMessage::decode(body.as_slice())?;
    if let Some(failed) = response.login_failed {
        debug!(code = failed.error_code, "Access point refused hello");
        return Err(Error::LoginFailed(LoginFailure::from_code(failed.error_code)));
    }
    let challenge = response
        .challenge
        .ok_or_else(|| Error::invalid("response carries no challenge"))?;
    let server_public = challenge
        .login_crypto_challenge
        .and_then(|c| c.diffie_hellman)
        .ok_or_else(|| Error::invalid("challenge carries no public value"))?;

    let shared = private.exchange(&PublicKey::from_slice(&server_public.gs)?)?;
    let keys = kdf::derive_session_keys(shared.as_bytes(), &transcript);

    let pow_response = match challenge.pow_challenge.and_then(|p| p.hash_cash) {
        Some(hash_cash) => {
            let prefix = hash_cash.prefix.unwrap_or_default();
            let length = u32::try_from(hash_cash.length.unwrap_or(0))
                .map_err(|_| Error::invalid("negative hashcash length"))?;
            debug!(length, "Solving hashcash challenge");
            let suffix = hashcash::solve(&transcript, &prefix, length, hashcash_max_iterations)?;
            Some(PoWResponseUnion {
                hash_cash: Some(PoWHashCashResponse {
                    hash_suffix: suffix.to_vec(),
                }),
            })
        }
        None => None,
    };

    let answer = ClientResponsePlaintext {
        login_crypto_response: Some(LoginCryptoResponseUnion {
            diffie_hellman: Some(LoginCryptoDiffieHellmanResponse {
                hmac: keys.challenge.to_vec(),
            }),
        }),
        pow_response,
        crypto_response: Some(CryptoResponseUnion {}),
    };
    let body = proto::encode(&answer);
    let size = u32::try_from(4 + body.len()).map_err(|_| Error::invalid("answer too large"))?;
    let mut packet = Vec::with_capacity(4 + body.len());
    packet.extend_from_slice(&size.to_be_bytes());
    packet.extend_from_slice(&body);
    io_step(limit, "challenge answer", stream.write_all(&packet)).await?;
    io_step(limit, "challenge answer", stream.flush()).await?;
    debug!("Handshake complete, switching to encrypted transport");

    Ok(Transport {
        send: ShannonSend::new(&keys.send_key),
        recv: ShannonRecv::new(&keys.recv_key),
    })
}

/// Encode the encrypted login request.
pub(crate) fn login_request(
    username: &str,
    credentials: &Credentials,
    config: &EngineConfig,
) -> Vec<u8> {
    let (typ, auth_data) = credentials.auth();
    proto::encode(&ClientResponseEncrypted {
        login_credentials: Some(LoginCredentials {
            username: Some(username.to_string()),
            typ,
            auth_data: Some(auth_data),
        }),
        system_info: Some(SystemInfo {
            cpu_family: proto::CPU_X86_64,
            os: proto::OS_LINUX,
            system_information_string: Some(config.version_string.clone()),
            device_id: Some(config.device_id.clone()),
        }),
        version_string: Some(config.version_string.clone()),
    })
}

/// Send the login request and wait for the verdict.
///
/// Pings that arrive ahead of the verdict are answered and other packets
/// skipped; bytes received past it stay in `buf` for the connection reader.
///
/// # Errors
///
/// Returns [`Error::LoginFailed`] on AuthFailure, [`Error::NoConnection`] if
/// the peer hangs up and [`Error::Timeout`] if no verdict arrives in time.
pub(crate) async fn authenticate<S>(
    stream: &mut S,
    transport: &mut Transport,
    buf: &mut BytesMut,
    request: &[u8],
    limit: Duration,
) -> Result<StoredCredentials>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sealed = transport.send.seal(Command::Login.into(), request)?;
    io_step(limit, "login", stream.write_all(&sealed)).await?;
    io_step(limit, "login", stream.flush()).await?;

    loop {
        while let Some(packet) = transport.recv.open(&buf[..])? {
            buf.advance(packet.consumed);
            match Command::try_from(packet.cmd) {
                Ok(Command::ApWelcome) => {
                    let welcome = ApWelcome::decode(packet.payload.as_slice())?;
                    debug!(user = %welcome.canonical_username, "Authenticated");
                    return Ok(StoredCredentials {
                        username: welcome.canonical_username,
                        auth_data: welcome.reusable_auth_credentials.unwrap_or_default(),
                    });
                }
                Ok(Command::AuthFailure) => {
                    let failed = ApLoginFailed::decode(packet.payload.as_slice())?;
                    return Err(Error::LoginFailed(LoginFailure::from_code(failed.error_code)));
                }
                Ok(Command::Ping) => {
                    trace!("Ping before login verdict");
                    let pong = transport.send.seal(Command::Pong.into(), &packet.payload)?;
                    io_step(limit, "pong", stream.write_all(&pong)).await?;
                }
                _ => trace!(cmd = packet.cmd, "Skipping packet before login verdict"),
            }
        }

        let read = io_step(limit, "login reply", stream.read_buf(buf)).await?;
        if read == 0 {
            return Err(Error::NoConnection);
        }
    }
}
