//! Host-facing engine API.

use crate::bridge::Bridge;
use crate::channel::{ChannelState, ProgressCallback};
use crate::config::{Bitrate, EngineConfig};
use crate::credentials::{Credentials, StoredCredentials};
use crate::error::Result;
use crate::pipe::TrackReader;
use crate::proto::AudioFormat;
use crate::sequencer::Sequencer;
use crate::session::{SessionHandle, TrackHandle};
use sonar_transport::Connector;
use sonar_transport::http::HttpClient;
use std::sync::Arc;
use tracing::info;

/// Name of the engine worker thread
pub const WORKER_THREAD_NAME: &str = "sonar-engine";

/// Snapshot of an open track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    /// Consumer-visible length in bytes, known once the first chunk arrived
    pub file_length: Option<u64>,
    /// Consumer-visible bytes decrypted so far
    pub position: u64,
    /// Channel state
    pub state: ChannelState,
    /// Audio format of the selected file
    pub format: AudioFormat,
    /// Track or episode name
    pub name: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: Option<u32>,
}

/// The protocol engine.
///
/// All state lives on one worker thread; every method posts a job to it.
/// Methods returning a value block until the job completed, so they must
/// not be called from inside an async task driving the same thread.
///
/// # Examples
///
/// ```no_run
/// use sonar_core::{Credentials, Engine, EngineConfig};
/// use sonar_transport::TcpConnector;
/// # use std::sync::Arc;
/// # fn run(http: Arc<dyn sonar_transport::http::HttpClient>) -> sonar_core::Result<()> {
/// let engine = Engine::start(EngineConfig::default(), Arc::new(TcpConnector::default()), http)?;
/// let session = engine.login("alice", Credentials::Password("secret".into()))?;
/// let (track, mut reader) = engine.open(session, "spotify:track:4gtj0ZuMWRw8WioT9SXsC2")?;
/// engine.play(track, None)?;
/// std::io::copy(&mut reader, &mut std::io::sink()).ok();
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    bridge: Bridge<Sequencer>,
}

impl Engine {
    /// Validate `config` and start the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] for a bad configuration and
    /// [`crate::Error::Transport`] if the worker cannot be started.
    pub fn start(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        config.validate()?;
        let bridge = Bridge::spawn(WORKER_THREAD_NAME, move || {
            Sequencer::new(config, connector, http)
        })?;
        info!("Engine started");
        Ok(Self { bridge })
    }

    /// Authenticate and create a session.
    ///
    /// # Errors
    ///
    /// [`crate::Error::LoginFailed`] if the access point refused the
    /// credentials, or any connect/handshake failure.
    pub fn login(&self, username: &str, credentials: Credentials) -> Result<SessionHandle> {
        let username = username.to_string();
        self.bridge.exec_sync(move |state: &mut Sequencer| {
            Box::pin(async move { state.login(&username, &credentials).await })
        })
    }

    /// Tear down a session, its connection and all its tracks.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoSession`] for an unknown session.
    pub fn logout(&self, session: SessionHandle) -> Result<()> {
        self.bridge
            .exec_sync(move |state: &mut Sequencer| Box::pin(async move { state.logout(session) }))
    }

    /// Open a catalog URI on a free channel.
    ///
    /// The returned reader yields the decrypted file without its service
    /// header once the track is played.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Occupied`] if all channels are in use
    /// - [`crate::Error::Unavailable`] if no playable file exists
    /// - [`crate::Error::KeyUnavailable`] if the file key was refused
    pub fn open(&self, session: SessionHandle, uri: &str) -> Result<(TrackHandle, TrackReader)> {
        let uri = uri.to_string();
        self.bridge.exec_sync(move |state: &mut Sequencer| {
            Box::pin(async move { state.open(session, &uri).await })
        })
    }

    /// Move the read position to consumer byte `offset`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Occupied`] while a chunk download is in flight (pause
    /// first, or seek before playing); [`crate::Error::InvalidData`] past the
    /// end of the track.
    pub fn seek(&self, track: TrackHandle, offset: u64) -> Result<()> {
        self.bridge.exec_sync(move |state: &mut Sequencer| {
            Box::pin(async move { state.seek(track, offset).await })
        })
    }

    /// Start or resume downloading, optionally replacing the progress
    /// callback.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoSession`] for a stale handle.
    pub fn play(&self, track: TrackHandle, progress: Option<ProgressCallback>) -> Result<()> {
        self.bridge.exec_sync(move |state: &mut Sequencer| {
            Box::pin(async move { state.play(track, progress).await })
        })
    }

    /// Suspend downloading after the chunk in flight.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoSession`] for a stale handle.
    pub fn pause(&self, track: TrackHandle) -> Result<()> {
        self.bridge
            .exec_sync(move |state: &mut Sequencer| Box::pin(async move { state.pause(track) }))
    }

    /// Close a track. Returns once the request was queued; the channel slot
    /// is freed when its last chunk drained.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoConnection`] if the engine has shut down.
    pub fn close(&self, track: TrackHandle) -> Result<()> {
        self.bridge.exec_async("close", move |state: &mut Sequencer| {
            Box::pin(async move { state.close(track) })
        })
    }

    /// Current metadata of an open track.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoSession`] for a stale handle.
    pub fn metadata(&self, track: TrackHandle) -> Result<TrackMetadata> {
        self.bridge
            .exec_sync(move |state: &mut Sequencer| Box::pin(async move { state.metadata(track) }))
    }

    /// Quality used by subsequent `open` calls on this session.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoSession`] for an unknown session.
    pub fn set_preferred_bitrate(&self, session: SessionHandle, bitrate: Bitrate) -> Result<()> {
        self.bridge.exec_sync(move |state: &mut Sequencer| {
            Box::pin(async move { state.set_preferred_bitrate(session, bitrate) })
        })
    }

    /// Credentials for logging in again without the password.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoSession`] for an unknown session.
    pub fn reusable_credentials(&self, session: SessionHandle) -> Result<StoredCredentials> {
        self.bridge.exec_sync(move |state: &mut Sequencer| {
            Box::pin(async move { state.reusable_credentials(session) })
        })
    }

    /// Country reported by the access point, if any arrived yet.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoSession`] for an unknown session.
    pub fn country(&self, session: SessionHandle) -> Result<Option<String>> {
        self.bridge
            .exec_sync(move |state: &mut Sequencer| Box::pin(async move { state.country(session) }))
    }

    /// Stop the worker; open readers see a broken pipe.
    pub fn shutdown(mut self) {
        self.bridge.shutdown();
    }
}
