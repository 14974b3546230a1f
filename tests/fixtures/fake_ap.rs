//! In-process fake access point for integration testing
//!
//! Speaks the server side of the protocol over in-memory streams:
//! - Diffie-Hellman handshake with a hashcash challenge, then encrypted login
//! - Mercury metadata requests and file key requests
//! - Chunk requests, answered with AES-CTR encrypted file data split into
//!   random-sized packets and written in random-sized fragments
//!
//! Faults are injected on the first connection only, so reconnecting to the
//! fake succeeds unless the fault is an outage.
//!
//! # Example
//!
//! ```no_run
//! use sonar_integration_tests::fixtures::{FakeAp, FakeApConfig, FakeTrack};
//! use sonar_core::Credentials;
//! use std::io::Read;
//!
//! let track = FakeTrack::generate(1, 100_000);
//! let ap = FakeAp::start(FakeApConfig::with_tracks(vec![track.clone()]));
//! let engine = ap.start_engine(FakeAp::engine_config()).unwrap();
//! let session = engine
//!     .login("alice", Credentials::Password("secret".into()))
//!     .unwrap();
//! let (handle, mut reader) = engine.open(session, &track.uri()).unwrap();
//! engine.play(handle, None).unwrap();
//! let mut out = Vec::new();
//! reader.read_to_end(&mut out).unwrap();
//! assert_eq!(out, track.audio());
//! ```

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use prost::Message;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_core::OsRng;
use sonar_core::packet::{Command, FILE_ID_SIZE, HEADER_FILE_SIZE, MERCURY_FLAG_FINAL, MercuryFrame};
use sonar_core::proto::{
    self, AUTH_STORED, AUTH_USER_PASS, ApChallenge, ApLoginFailed, ApResponseMessage, ApWelcome,
    AudioFile, AudioFormat, ClientHello, ClientResponseEncrypted, ClientResponsePlaintext,
    LoginCryptoChallengeUnion, LoginCryptoDiffieHellmanChallenge, MercuryHeader,
    PoWChallengeUnion, PoWHashCashChallenge, Track,
};
use sonar_core::{Engine, EngineConfig, SERVICE_HEADER_SIZE};
use sonar_crypto::aes_ctr::FileCipher;
use sonar_crypto::dh::{PrivateKey, PublicKey};
use sonar_crypto::shannon::{ShannonRecv, ShannonSend};
use sonar_crypto::{FILE_KEY_SIZE, MEDIA_ID_SIZE, base62, hashcash, kdf};
use sonar_transport::http::{HttpClient, HttpRequest, HttpResponse};
use sonar_transport::resolver::ResolverConfig;
use sonar_transport::{AccessPoint, BoxedStream, Connector, TransportError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Account the fake accepts
pub const USERNAME: &str = "alice";

/// Password of [`USERNAME`]
pub const PASSWORD: &str = "secret";

/// Reusable credential blob handed out in APWelcome
pub const REUSABLE_BLOB: &[u8] = b"reusable-auth-blob";

/// Access points listed by the fake directory
pub const ACCESS_POINTS: [&str; 2] = ["ap-a.test:4070", "ap-b.test:4070"];

const HASHCASH_PREFIX: &[u8] = b"fake-ap-prefix";
const HASHCASH_BITS: i32 = 6;
const MAX_DATA_PACKET: usize = 4096;

type FakeResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

// ============================================================================
// Configuration
// ============================================================================

/// A file served by the fake.
#[derive(Debug, Clone)]
pub struct FakeTrack {
    /// Catalog id
    pub media_id: [u8; MEDIA_ID_SIZE],
    /// File id of the single Ogg 160 file
    pub file_id: [u8; FILE_ID_SIZE],
    /// File key
    pub key: [u8; FILE_KEY_SIZE],
    /// Track name
    pub name: String,
    /// Decrypted file, service header included
    pub plaintext: Vec<u8>,
}

impl FakeTrack {
    /// Deterministic pseudo-random track of `len` bytes.
    ///
    /// # Panics
    ///
    /// If `len` is not a multiple of 4 or does not exceed the service
    /// header.
    pub fn generate(seed: u64, len: usize) -> Self {
        assert_eq!(len % 4, 0, "file length must be word aligned");
        assert!(len > SERVICE_HEADER_SIZE as usize);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut media_id = [0u8; MEDIA_ID_SIZE];
        let mut file_id = [0u8; FILE_ID_SIZE];
        let mut key = [0u8; FILE_KEY_SIZE];
        let mut plaintext = vec![0u8; len];
        rng.fill_bytes(&mut media_id);
        rng.fill_bytes(&mut file_id);
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut plaintext);

        Self {
            media_id,
            file_id,
            key,
            name: format!("Fake Track {seed}"),
            plaintext,
        }
    }

    /// `spotify:track:` URI of the track
    pub fn uri(&self) -> String {
        format!("spotify:track:{}", base62::encode(&self.media_id))
    }

    /// What a reader of the whole track should yield
    pub fn audio(&self) -> &[u8] {
        &self.plaintext[SERVICE_HEADER_SIZE as usize..]
    }

    fn ciphertext(&self) -> Vec<u8> {
        let mut data = self.plaintext.clone();
        FileCipher::new(self.key).decrypt(&mut data);
        data
    }
}

/// Misbehavior injected by the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    /// Behave
    #[default]
    None,
    /// Announce a long hello reply, send three bytes of it and hang up
    TruncatedHandshake,
    /// Hang up the first connection mid-packet after this many data bytes
    DisconnectAfter(usize),
    /// Go silent on the first connection after this many data bytes
    StallAfter(usize),
    /// Hang up the first connection like `DisconnectAfter`, then refuse
    /// every later connection before the handshake
    OutageAfter(usize),
    /// Refuse every file key
    RefuseKeys,
}

/// Fake access point configuration
#[derive(Debug, Clone)]
pub struct FakeApConfig {
    /// Files served
    pub tracks: Vec<FakeTrack>,
    /// Injected fault
    pub fault: Fault,
    /// Largest write the fake issues at once
    pub max_write: usize,
    /// Seed for packet and fragment sizes
    pub seed: u64,
}

impl FakeApConfig {
    /// Well-behaved fake serving `tracks`
    pub fn with_tracks(tracks: Vec<FakeTrack>) -> Self {
        Self {
            tracks,
            fault: Fault::None,
            max_write: 1500,
            seed: 0x5eed,
        }
    }

    /// Same configuration with `fault` injected
    #[must_use]
    pub fn fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }
}

/// What the fake observed.
#[derive(Debug, Clone, Default)]
pub struct FakeApStats {
    /// Access point each connection was opened to, in order
    pub connections: Vec<String>,
    /// Credential type of each login
    pub logins: Vec<i32>,
    /// Pongs received
    pub pongs: usize,
    /// `(channel, start, end)` of every chunk request, in words
    pub chunk_requests: Vec<(u16, u32, u32)>,
}

// ============================================================================
// Fixture
// ============================================================================

/// Fake access point running on its own thread.
pub struct FakeAp {
    connector: Arc<FakeConnector>,
    directory: Arc<FakeDirectory>,
    stats: Arc<Mutex<FakeApStats>>,
}

impl FakeAp {
    /// Start the fake; it stops once every connector handle is dropped.
    ///
    /// # Panics
    ///
    /// If the fake's thread or runtime cannot be created.
    pub fn start(config: FakeApConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(FakeApStats::default()));
        let shared = Arc::new(Shared::new(config));

        let thread_stats = Arc::clone(&stats);
        thread::Builder::new()
            .name("fake-ap".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("fake access point runtime");
                runtime.block_on(accept_loop(rx, shared, thread_stats));
            })
            .expect("spawn fake access point thread");

        Self {
            connector: Arc::new(FakeConnector { tx }),
            directory: Arc::new(FakeDirectory),
            stats,
        }
    }

    /// Engine configuration with timings short enough for tests
    pub fn engine_config() -> EngineConfig {
        EngineConfig {
            resolver: ResolverConfig {
                url: "https://resolver.test/?type=accesspoint".into(),
                ..ResolverConfig::default()
            },
            handshake_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            chunk_timeout: Duration::from_secs(1),
            tick_interval: Duration::from_millis(100),
            ..EngineConfig::default()
        }
    }

    /// Start an engine wired to this fake.
    ///
    /// # Errors
    ///
    /// Whatever [`Engine::start`] returns.
    pub fn start_engine(&self, config: EngineConfig) -> sonar_core::Result<Engine> {
        Engine::start(config, self.connector(), self.http())
    }

    /// Connector opening in-memory streams to the fake
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::clone(&self.connector) as Arc<dyn Connector>
    }

    /// Directory listing [`ACCESS_POINTS`]
    pub fn http(&self) -> Arc<dyn HttpClient> {
        Arc::clone(&self.directory) as Arc<dyn HttpClient>
    }

    /// Snapshot of what the fake observed
    pub fn stats(&self) -> FakeApStats {
        self.stats.lock().expect("stats lock").clone()
    }
}

struct FakeConnector {
    tx: UnboundedSender<(AccessPoint, DuplexStream)>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, ap: &AccessPoint) -> Result<BoxedStream, TransportError> {
        let (client, server) = duplex(64 * 1024);
        self.tx
            .send((ap.clone(), server))
            .map_err(|_| TransportError::ConnectionFailed("fake access point stopped".into()))?;
        Ok(Box::new(client))
    }
}

struct FakeDirectory;

#[async_trait]
impl HttpClient for FakeDirectory {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let body = format!(
            r#"{{"accesspoint":["{}","{}"]}}"#,
            ACCESS_POINTS[0], ACCESS_POINTS[1]
        );
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: body.into(),
        })
    }
}

// ============================================================================
// Server
// ============================================================================

struct Shared {
    config: FakeApConfig,
    ciphertexts: Vec<Vec<u8>>,
}

impl Shared {
    fn new(config: FakeApConfig) -> Self {
        let ciphertexts = config.tracks.iter().map(FakeTrack::ciphertext).collect();
        Self {
            config,
            ciphertexts,
        }
    }
}

async fn accept_loop(
    mut rx: UnboundedReceiver<(AccessPoint, DuplexStream)>,
    shared: Arc<Shared>,
    stats: Arc<Mutex<FakeApStats>>,
) {
    let mut index = 0usize;
    while let Some((ap, stream)) = rx.recv().await {
        stats.lock().expect("stats lock").connections.push(ap.to_string());
        let shared = Arc::clone(&shared);
        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            if let Err(err) = serve(stream, index, &shared, &stats).await {
                tracing::debug!(index, %err, "Fake access point connection ended");
            }
        });
        index += 1;
    }
}

enum Flow {
    Continue,
    Hangup,
    Stall,
}

struct ApConnection<'a> {
    stream: DuplexStream,
    send: ShannonSend,
    recv: ShannonRecv,
    buf: BytesMut,
    rng: StdRng,
    shared: &'a Shared,
    stats: &'a Mutex<FakeApStats>,
    fault_limit: Option<usize>,
    data_sent: usize,
}

async fn serve(
    mut stream: DuplexStream,
    index: usize,
    shared: &Shared,
    stats: &Mutex<FakeApStats>,
) -> FakeResult<()> {
    if index > 0 && matches!(shared.config.fault, Fault::OutageAfter(_)) {
        return Ok(());
    }
    let Some((send, recv)) = server_handshake(&mut stream, shared.config.fault).await? else {
        return Ok(());
    };
    let fault_limit = match shared.config.fault {
        Fault::DisconnectAfter(n) | Fault::StallAfter(n) | Fault::OutageAfter(n) if index == 0 => {
            Some(n)
        }
        _ => None,
    };
    let mut conn = ApConnection {
        stream,
        send,
        recv,
        buf: BytesMut::new(),
        rng: StdRng::seed_from_u64(shared.config.seed ^ index as u64),
        shared,
        stats,
        fault_limit,
        data_sent: 0,
    };

    if !conn.login().await? {
        return Ok(());
    }

    while let Some((cmd, payload)) = conn.next_packet().await? {
        let flow = match Command::try_from(cmd) {
            Ok(Command::Pong) => {
                conn.stats.lock().expect("stats lock").pongs += 1;
                Flow::Continue
            }
            Ok(Command::MercuryReq) => conn.mercury(&payload).await?,
            Ok(Command::RequestKey) => conn.key(&payload).await?,
            Ok(Command::StreamChunk) => conn.chunk(&payload).await?,
            _ => Flow::Continue,
        };
        match flow {
            Flow::Continue => {}
            Flow::Hangup => return Ok(()),
            Flow::Stall => return conn.drain().await,
        }
    }
    Ok(())
}

fn framed(message: &impl Message) -> Vec<u8> {
    let body = message.encode_to_vec();
    let mut out = ((body.len() + 4) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(&body);
    out
}

async fn server_handshake(
    stream: &mut DuplexStream,
    fault: Fault,
) -> FakeResult<Option<(ShannonSend, ShannonRecv)>> {
    let mut head = [0u8; 6];
    stream.read_exact(&mut head).await?;
    let size = u32::from_be_bytes([head[2], head[3], head[4], head[5]]) as usize;
    let mut body = vec![0u8; size.checked_sub(head.len()).ok_or("hello shorter than its header")?];
    stream.read_exact(&mut body).await?;
    let hello = ClientHello::decode(body.as_slice())?;
    let mut transcript = head.to_vec();
    transcript.extend_from_slice(&body);

    if fault == Fault::TruncatedHandshake {
        stream.write_all(&[0, 0, 0, 100, 1, 2, 3]).await?;
        return Ok(None);
    }

    let client_public = hello
        .login_crypto_hello
        .and_then(|h| h.diffie_hellman)
        .ok_or("hello carries no public value")?
        .gc;
    let private = PrivateKey::generate(&mut OsRng);
    let response = ApResponseMessage {
        challenge: Some(ApChallenge {
            login_crypto_challenge: Some(LoginCryptoChallengeUnion {
                diffie_hellman: Some(LoginCryptoDiffieHellmanChallenge {
                    gs: private.public_key().to_bytes().to_vec(),
                    server_signature_key: None,
                    gs_signature: None,
                }),
            }),
            pow_challenge: Some(PoWChallengeUnion {
                hash_cash: Some(PoWHashCashChallenge {
                    prefix: Some(HASHCASH_PREFIX.to_vec()),
                    length: Some(HASHCASH_BITS),
                    target: None,
                }),
            }),
            server_nonce: Some(vec![0x5a; 16]),
            padding: None,
        }),
        login_failed: None,
    };
    let reply = framed(&response);
    transcript.extend_from_slice(&reply);
    stream.write_all(&reply).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    let size = u32::from_be_bytes(head) as usize;
    let mut body = vec![0u8; size.checked_sub(4).ok_or("answer shorter than its header")?];
    stream.read_exact(&mut body).await?;
    let answer = ClientResponsePlaintext::decode(body.as_slice())?;

    let shared = private.exchange(&PublicKey::from_slice(&client_public)?)?;
    let keys = kdf::derive_session_keys(shared.as_bytes(), &transcript);

    let hmac = answer
        .login_crypto_response
        .and_then(|r| r.diffie_hellman)
        .ok_or("answer carries no hmac")?
        .hmac;
    if hmac[..] != keys.challenge[..] {
        return Err("challenge answer mismatch".into());
    }
    let suffix: [u8; hashcash::SUFFIX_SIZE] = answer
        .pow_response
        .and_then(|p| p.hash_cash)
        .ok_or("answer carries no hashcash")?
        .hash_suffix
        .try_into()
        .map_err(|_| "hashcash suffix has the wrong size")?;
    if !hashcash::verify(HASHCASH_PREFIX, &suffix, HASHCASH_BITS as u32) {
        return Err("hashcash answer rejected".into());
    }

    Ok(Some((
        ShannonSend::new(&keys.recv_key),
        ShannonRecv::new(&keys.send_key),
    )))
}

impl ApConnection<'_> {
    async fn next_packet(&mut self) -> FakeResult<Option<(u8, Vec<u8>)>> {
        loop {
            if let Some(packet) = self.recv.open(&self.buf[..])? {
                self.buf.advance(packet.consumed);
                return Ok(Some((packet.cmd, packet.payload)));
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    fn seal(&mut self, cmd: Command, payload: &[u8]) -> FakeResult<Vec<u8>> {
        Ok(self.send.seal(cmd.into(), payload)?)
    }

    async fn write_fragmented(&mut self, bytes: &[u8]) -> FakeResult<()> {
        let mut rest = bytes;
        while !rest.is_empty() {
            let n = self.rng.gen_range(1..=self.shared.config.max_write).min(rest.len());
            self.stream.write_all(&rest[..n]).await?;
            rest = &rest[n..];
            tokio::task::yield_now().await;
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn write(&mut self, packets: &[(Command, &[u8])]) -> FakeResult<()> {
        let mut out = Vec::new();
        for (cmd, payload) in packets {
            out.extend(self.seal(*cmd, payload)?);
        }
        self.write_fragmented(&out).await
    }

    /// Answer the login; false if it was refused.
    async fn login(&mut self) -> FakeResult<bool> {
        let Some((cmd, payload)) = self.next_packet().await? else {
            return Ok(false);
        };
        if cmd != u8::from(Command::Login) {
            return Err(format!("expected login, got command {cmd:#04x}").into());
        }
        let request = ClientResponseEncrypted::decode(payload.as_slice())?;
        let credentials = request
            .login_credentials
            .ok_or("login carries no credentials")?;
        self.stats.lock().expect("stats lock").logins.push(credentials.typ);

        let auth_data = credentials.auth_data.unwrap_or_default();
        let accepted = credentials.username.as_deref() == Some(USERNAME)
            && match credentials.typ {
                AUTH_USER_PASS => auth_data == PASSWORD.as_bytes(),
                AUTH_STORED => auth_data == REUSABLE_BLOB,
                _ => false,
            };

        if !accepted {
            let failed = proto::encode(&ApLoginFailed {
                error_code: 12,
                retry_delay: None,
                expiry: None,
                error_description: None,
            });
            self.write(&[(Command::AuthFailure, failed.as_slice())]).await?;
            return Ok(false);
        }

        let welcome = proto::encode(&ApWelcome {
            canonical_username: USERNAME.to_string(),
            account_type_logged_in: None,
            credentials_type_logged_in: None,
            reusable_auth_credentials_type: Some(AUTH_STORED),
            reusable_auth_credentials: Some(REUSABLE_BLOB.to_vec()),
        });
        self.write(&[
            (Command::ApWelcome, welcome.as_slice()),
            (Command::CountryCode, &b"SE"[..]),
            (Command::Ping, &[0u8, 0, 0, 1][..]),
        ])
        .await?;
        Ok(true)
    }

    async fn mercury(&mut self, payload: &[u8]) -> FakeResult<Flow> {
        let frame = MercuryFrame::decode(payload)?;
        let header = MercuryHeader::decode(
            frame
                .parts
                .first()
                .ok_or("mercury request without header")?
                .as_slice(),
        )?;
        let uri = header.uri.unwrap_or_default();
        let shared = self.shared;
        let track = uri
            .strip_prefix("hm://metadata/4/track/")
            .and_then(|id| hex::decode(id).ok())
            .and_then(|id| shared.config.tracks.iter().find(|t| t.media_id[..] == id[..]));

        let status = |code| {
            proto::encode(&MercuryHeader {
                uri: None,
                content_type: None,
                method: None,
                status_code: Some(code),
            })
        };
        let parts = match track {
            Some(track) => vec![
                status(200),
                proto::encode(&Track {
                    gid: Some(track.media_id.to_vec()),
                    name: Some(track.name.clone()),
                    duration: Some(180_000),
                    file: vec![AudioFile {
                        file_id: Some(track.file_id.to_vec()),
                        format: Some(AudioFormat::OggVorbis160 as i32),
                    }],
                    alternative: vec![],
                }),
            ],
            None => vec![status(404)],
        };
        let reply = MercuryFrame {
            seq: frame.seq,
            flags: MERCURY_FLAG_FINAL,
            parts,
        }
        .encode()?;
        self.write(&[(Command::MercuryReq, reply.as_slice())]).await?;
        Ok(Flow::Continue)
    }

    async fn key(&mut self, payload: &[u8]) -> FakeResult<Flow> {
        if payload.len() < FILE_ID_SIZE + MEDIA_ID_SIZE + 4 {
            return Err("key request truncated".into());
        }
        let file_id = &payload[..FILE_ID_SIZE];
        let seq = &payload[FILE_ID_SIZE + MEDIA_ID_SIZE..FILE_ID_SIZE + MEDIA_ID_SIZE + 4];
        let shared = self.shared;
        let track = shared.config.tracks.iter().find(|t| t.file_id[..] == *file_id);

        let mut reply = seq.to_vec();
        match track {
            Some(track) if shared.config.fault != Fault::RefuseKeys => {
                reply.extend_from_slice(&track.key);
                self.write(&[(Command::AesKey, reply.as_slice())]).await?;
            }
            _ => {
                reply.extend_from_slice(&[0x00, 0x01]);
                self.write(&[(Command::AesKeyError, reply.as_slice())]).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn chunk(&mut self, payload: &[u8]) -> FakeResult<Flow> {
        if payload.len() < 46 {
            return Err("chunk request truncated".into());
        }
        let word = |at: usize| u32::from_be_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]]);
        let channel = u16::from_be_bytes([payload[0], payload[1]]);
        let file_id = &payload[18..18 + FILE_ID_SIZE];
        let (start, end) = (word(38), word(42));
        self.stats
            .lock()
            .expect("stats lock")
            .chunk_requests
            .push((channel, start, end));

        let prefix = channel.to_be_bytes();
        let Some(index) = self
            .shared
            .config
            .tracks
            .iter()
            .position(|t| t.file_id[..] == *file_id)
        else {
            let mut error = prefix.to_vec();
            error.extend_from_slice(&[0x00, 0x01]);
            self.write(&[(Command::ChannelError, error.as_slice())]).await?;
            return Ok(Flow::Continue);
        };

        let shared = self.shared;
        let data = &shared.ciphertexts[index];
        let from = (start as usize * 4).min(data.len());
        let to = (end as usize * 4).min(data.len());
        let words = (data.len() / 4) as u32;

        let mut header = prefix.to_vec();
        header.extend_from_slice(&[0x00, 0x05, HEADER_FILE_SIZE]);
        header.extend_from_slice(&words.to_be_bytes());
        let mut terminator = prefix.to_vec();
        terminator.extend_from_slice(&[0x00, 0x00]);

        let mut out = self.seal(Command::StreamChunkRes, &header)?;
        out.extend(self.seal(Command::StreamChunkRes, &terminator)?);

        let mut pos = from;
        while pos < to {
            let n = self.rng.gen_range(1..=MAX_DATA_PACKET).min(to - pos);
            let mut body = prefix.to_vec();
            body.extend_from_slice(&data[pos..pos + n]);
            let sealed = self.seal(Command::StreamChunkRes, &body)?;

            if let Some(limit) = self.fault_limit {
                if self.data_sent + n > limit {
                    let flow = match self.shared.config.fault {
                        Fault::DisconnectAfter(_) | Fault::OutageAfter(_) => {
                            out.extend_from_slice(&sealed[..sealed.len() / 2]);
                            Flow::Hangup
                        }
                        _ => Flow::Stall,
                    };
                    self.write_fragmented(&out).await?;
                    return Ok(flow);
                }
            }
            self.data_sent += n;
            out.extend(sealed);
            pos += n;
        }
        out.extend(self.seal(Command::StreamChunkRes, &prefix)?);
        self.write_fragmented(&out).await?;
        Ok(Flow::Continue)
    }

    /// Stay connected without answering until the client hangs up.
    async fn drain(mut self) -> FakeResult<()> {
        loop {
            self.buf.clear();
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Ok(());
            }
        }
    }
}
