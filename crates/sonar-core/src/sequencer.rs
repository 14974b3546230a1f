//! Session sequencer: the engine state owned by the worker thread.
//!
//! Host operations run here as bridge jobs. An operation that needs a reply
//! sends its request and waits on the connection event stream; packets that
//! belong to someone else (keepalives, chunk data for other channels) are
//! handled in the background while it waits. After login, a lost connection
//! or a missing reply triggers reconnect-and-resume and the round trip is
//! retried, up to `max_reconnect_attempts` times.

use crate::bridge::Worker;
use crate::channel::{Channel, ChunkEvent, MAX_CHANNELS, ProgressCallback};
use crate::config::{Bitrate, EngineConfig};
use crate::connection::{Connection, Event};
use crate::credentials::{Credentials, StoredCredentials};
use crate::engine::TrackMetadata;
use crate::error::{Error, LoginFailure, Result};
use crate::mercury::{self, CatalogUri};
use crate::packet::{self, Command};
use crate::pipe::{TrackReader, pipe};
use crate::session::{Session, SessionHandle, TrackHandle};
use sonar_transport::Connector;
use sonar_transport::http::HttpClient;
use sonar_transport::resolver::ApResolver;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// What woke the worker between jobs.
#[derive(Debug)]
pub(crate) enum Wake {
    /// Connection traffic
    Connection(Event),
    /// A reader consumed output
    Ready,
    /// Periodic stall check
    Tick,
}

/// Reconnect request: session and the connection that failed (`None` when
/// the session is already disconnected).
type ReconnectRequest = (u64, Option<u64>);

pub(crate) struct Sequencer {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    http: Arc<dyn HttpClient>,
    resolver: ApResolver,
    sessions: HashMap<u64, Session>,
    next_session: u64,
    next_conn: u64,
    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
    ready: Arc<Notify>,
    tick: Interval,
    pending_reconnects: VecDeque<ReconnectRequest>,
}

impl Sequencer {
    /// Must be called inside the worker's runtime.
    pub(crate) fn new(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let mut tick = tokio::time::interval(config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            resolver: ApResolver::new(config.resolver.clone()),
            config,
            connector,
            http,
            sessions: HashMap::new(),
            next_session: 1,
            next_conn: 1,
            events_tx,
            events_rx,
            ready: Arc::new(Notify::new()),
            tick,
            pending_reconnects: VecDeque::new(),
        }
    }

    fn session_mut(&mut self, id: u64) -> Result<&mut Session> {
        self.sessions.get_mut(&id).ok_or(Error::NoSession)
    }

    fn take_conn_id(&mut self) -> u64 {
        let id = self.next_conn;
        self.next_conn += 1;
        id
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Pick an access point and open an authenticated connection.
    async fn connect(
        &mut self,
        session: u64,
        username: &str,
        credentials: &Credentials,
    ) -> Result<(Connection, StoredCredentials)> {
        let ap = self.resolver.pick(self.http.as_ref()).await;
        let conn_id = self.take_conn_id();
        let result = Connection::open(
            self.connector.as_ref(),
            ap.clone(),
            &self.config,
            username,
            credentials,
            session,
            conn_id,
            self.events_tx.clone(),
        )
        .await;

        match &result {
            Ok(_) => self.resolver.mark_connected(&ap),
            Err(Error::LoginFailed(reason)) => {
                warn!(%ap, %reason, "Login refused");
                if *reason == LoginFailure::TryAnotherAp {
                    self.resolver.mark_failed(&ap);
                }
            }
            Err(_) => self.resolver.mark_failed(&ap),
        }
        result
    }

    /// Replace the session's connection and resume its channels.
    async fn reconnect(&mut self, sid: u64) -> Result<()> {
        let session = self.session_mut(sid)?;
        let old_ap = session.conn.take().map(|conn| conn.ap.clone());
        let username = session.stored.username.clone();
        let credentials = session.stored.to_credentials();
        if let Some(ap) = old_ap {
            self.resolver.mark_failed(&ap);
        }

        info!(session = sid, "Reconnecting");
        let max_attempts = self.config.max_reconnect_attempts;
        let (conn, stored) = match self.connect(sid, &username, &credentials).await {
            Ok(connected) => connected,
            Err(e) => {
                let session = self.session_mut(sid)?;
                session.reconnect_failures += 1;
                if session.reconnect_failures > max_attempts {
                    error!(session = sid, error = %e, "Giving up on reconnect");
                    session.fail_channels("connection lost");
                }
                return Err(e);
            }
        };

        let session = self.session_mut(sid)?;
        if !stored.auth_data.is_empty() {
            session.stored = stored;
        }
        info!(session = sid, conn = conn.id, ap = %conn.ap, "Reconnected");
        session.conn = Some(conn);
        session.reconnect_failures = 0;

        for slot in 0..MAX_CHANNELS {
            if let Some(channel) = session.channels[slot].as_mut() {
                channel.resume();
            }
            session.reap(slot);
            session.pump(slot).await?;
        }
        Ok(())
    }

    fn queue_reconnect(&mut self, sid: u64, conn: Option<u64>) {
        if !self.pending_reconnects.contains(&(sid, conn)) {
            self.pending_reconnects.push_back((sid, conn));
        }
    }

    async fn run_reconnects(&mut self) {
        while let Some((sid, conn)) = self.pending_reconnects.pop_front() {
            let current = match self.sessions.get(&sid) {
                Some(session) => session.conn_id(),
                None => continue,
            };
            if current != conn {
                // already replaced
                continue;
            }
            if let Err(e) = self.reconnect(sid).await {
                warn!(session = sid, error = %e, "Reconnect failed");
            }
        }
    }

    // ========================================================================
    // Round trips
    // ========================================================================

    /// Send a request and wait for the reply accepted by `matcher`,
    /// reconnecting and retrying on transient failures.
    async fn roundtrip<M>(
        &mut self,
        sid: u64,
        cmd: Command,
        payload: &[u8],
        matcher: M,
    ) -> Result<(Command, Vec<u8>)>
    where
        M: Fn(Command, &[u8]) -> bool,
    {
        let mut attempts = 0;
        loop {
            let err = match self.try_roundtrip(sid, cmd, payload, &matcher).await {
                Ok(reply) => return Ok(reply),
                Err(err) => err,
            };
            if !err.is_transient() || attempts >= self.config.max_reconnect_attempts {
                return Err(err);
            }
            attempts += 1;
            warn!(session = sid, ?cmd, error = %err, attempt = attempts, "Round trip failed, reconnecting");
            if let Err(e) = self.reconnect(sid).await {
                if !e.is_transient() {
                    return Err(e);
                }
            }
        }
    }

    async fn try_roundtrip<M>(
        &mut self,
        sid: u64,
        cmd: Command,
        payload: &[u8],
        matcher: &M,
    ) -> Result<(Command, Vec<u8>)>
    where
        M: Fn(Command, &[u8]) -> bool,
    {
        let session = self.session_mut(sid)?;
        let conn = session.conn.as_mut().ok_or(Error::NoConnection)?;
        let conn_id = conn.id;
        conn.send(cmd, payload).await?;

        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let event = tokio::select! {
                event = self.events_rx.recv() => event.ok_or(Error::NoConnection)?,
                () = tokio::time::sleep_until(deadline) => {
                    return Err(Error::timeout("access point reply"));
                }
            };

            match event {
                Event::Packet {
                    session,
                    conn,
                    cmd,
                    payload,
                } if session == sid && conn == conn_id && matcher(cmd, &payload) => {
                    return Ok((cmd, payload));
                }
                Event::Closed {
                    session,
                    conn,
                    error,
                } if session == sid && conn == conn_id => {
                    debug!(session, conn, %error, "Connection closed during round trip");
                    return Err(Error::NoConnection);
                }
                other => self.handle_connection_event(other).await,
            }
        }
    }

    // ========================================================================
    // Background traffic
    // ========================================================================

    async fn handle_connection_event(&mut self, event: Event) {
        match event {
            Event::Packet {
                session,
                conn,
                cmd,
                payload,
            } => {
                let current = self.sessions.get(&session).and_then(Session::conn_id);
                if current != Some(conn) {
                    trace!(session, conn, ?cmd, "Dropping packet from stale connection");
                    return;
                }
                if let Err(e) = self.dispatch(session, cmd, payload).await {
                    warn!(session, ?cmd, error = %e, "Packet handling failed");
                    if e.is_transient() {
                        self.queue_reconnect(session, Some(conn));
                    }
                }
            }
            Event::Closed {
                session,
                conn,
                error,
            } => {
                let current = self.sessions.get(&session).and_then(Session::conn_id);
                if current == Some(conn) {
                    warn!(session, conn, %error, "Connection closed");
                    self.queue_reconnect(session, Some(conn));
                }
            }
        }
    }

    async fn dispatch(&mut self, sid: u64, cmd: Command, payload: Vec<u8>) -> Result<()> {
        let session = self.session_mut(sid)?;
        match cmd {
            Command::Ping => {
                trace!(session = sid, "Ping");
                let conn = session.conn.as_mut().ok_or(Error::NoConnection)?;
                conn.send(Command::Pong, &payload).await?;
            }
            Command::CountryCode => {
                let country = String::from_utf8_lossy(&payload).into_owned();
                debug!(session = sid, %country, "Country code");
                session.country = Some(country);
            }
            Command::StreamChunkRes => {
                let (channel, body) = packet::split_channel(&payload)?;
                let slot = usize::from(channel);
                let Some(state) = session.channels.get_mut(slot).and_then(Option::as_mut) else {
                    trace!(session = sid, channel, "Data for unallocated channel");
                    return Ok(());
                };
                match state.on_data(body) {
                    Ok(ChunkEvent::Pending) => {}
                    Ok(ChunkEvent::ChunkDone | ChunkEvent::EndOfFile) => {
                        session.reap(slot);
                        session.pump(slot).await?;
                    }
                    Err(e) => {
                        warn!(session = sid, channel, error = %e, "Chunk parse failed");
                        state.fail(e.to_string());
                        session.reap(slot);
                    }
                }
            }
            Command::ChannelError => {
                let (channel, body) = packet::split_channel(&payload)?;
                let code = body
                    .get(..2)
                    .map_or(0, |b| u16::from_be_bytes([b[0], b[1]]));
                warn!(session = sid, channel, code, "Channel error");
                let slot = usize::from(channel);
                if let Some(state) = session.channels.get_mut(slot).and_then(Option::as_mut) {
                    state.fail(format!("channel error {code}"));
                    session.reap(slot);
                }
            }
            Command::MercuryReq | Command::AesKey | Command::AesKeyError => {
                debug!(session = sid, ?cmd, "Dropping unmatched reply");
            }
            other => {
                debug!(session = sid, cmd = ?other, len = payload.len(), "Ignoring packet");
            }
        }
        Ok(())
    }

    /// Push backlogged output and restart downloads that waited for it.
    async fn on_ready(&mut self) {
        let mut failed = Vec::new();
        for (sid, session) in &mut self.sessions {
            for slot in 0..MAX_CHANNELS {
                if let Some(channel) = session.channels[slot].as_mut() {
                    let waiting = channel.is_awaiting_drain();
                    if channel.flush_backlog() && waiting {
                        trace!(session = sid, channel = slot, "Output drained, resuming download");
                    }
                }
                if session.pump(slot).await.is_err() {
                    failed.push((*sid, session.conn_id()));
                    break;
                }
            }
        }
        for (sid, conn) in failed {
            self.queue_reconnect(sid, conn);
        }
    }

    fn on_tick(&mut self) {
        let now = Instant::now();
        let timeout = self.config.chunk_timeout;
        let mut stalled = Vec::new();
        for (sid, session) in &self.sessions {
            match session.conn_id() {
                Some(conn) => {
                    if session
                        .channels
                        .iter()
                        .flatten()
                        .any(|c| c.is_stalled(now, timeout))
                    {
                        warn!(session = sid, conn, "Chunk download stalled");
                        stalled.push((*sid, Some(conn)));
                    }
                }
                None => {
                    if session.has_pending_downloads()
                        && session.reconnect_failures <= self.config.max_reconnect_attempts
                    {
                        stalled.push((*sid, None));
                    }
                }
            }
        }
        for (sid, conn) in stalled {
            self.queue_reconnect(sid, conn);
        }
    }

    // ========================================================================
    // Host operations
    // ========================================================================

    pub(crate) async fn login(
        &mut self,
        username: &str,
        credentials: &Credentials,
    ) -> Result<SessionHandle> {
        let sid = self.next_session;
        self.next_session += 1;

        let (conn, stored) = self.connect(sid, username, credentials).await?;
        info!(session = sid, user = %stored.username, ap = %conn.ap, "Logged in");
        let session = Session::new(sid, stored, conn, self.config.preferred_bitrate);
        self.sessions.insert(sid, session);
        Ok(SessionHandle(sid))
    }

    pub(crate) fn logout(&mut self, session: SessionHandle) -> Result<()> {
        let session = self.sessions.remove(&session.0).ok_or(Error::NoSession)?;
        info!(session = session.id, "Logged out");
        Ok(())
    }

    pub(crate) async fn open(
        &mut self,
        session: SessionHandle,
        uri: &str,
    ) -> Result<(TrackHandle, TrackReader)> {
        let sid = session.0;
        let uri: CatalogUri = uri.parse()?;
        let state = self.session_mut(sid)?;
        let slot = state
            .free_slot()
            .ok_or(Error::occupied("channel table full"))?;
        let bitrate = state.bitrate;

        // the channel id doubles as the Mercury sequence number
        let seq = slot as u64;
        let request = mercury::metadata_request(seq, &uri)?;
        let (_, reply) = self
            .roundtrip(sid, Command::MercuryReq, &request, |cmd, payload| {
                cmd == Command::MercuryReq && packet::mercury_seq(payload).is_ok_and(|s| s == seq)
            })
            .await?;
        let body = mercury::parse_metadata_reply(&reply)?;
        let file = mercury::select_file(&uri, &body, bitrate)?;
        debug!(
            session = sid,
            %uri,
            file = %hex::encode(file.file_id),
            format = ?file.format,
            "Selected file"
        );

        let key_seq = self.session_mut(sid)?.next_key_seq();
        let request = packet::key_request(&file.file_id, &file.media_id, key_seq);
        let (cmd, reply) = self
            .roundtrip(sid, Command::RequestKey, &request, |cmd, payload| {
                matches!(cmd, Command::AesKey | Command::AesKeyError)
                    && packet::key_reply_seq(payload).is_ok_and(|s| s == key_seq)
            })
            .await?;
        if cmd == Command::AesKeyError {
            return Err(Error::KeyUnavailable(packet::parse_key_error(&reply)));
        }
        let key = packet::parse_aes_key(&reply)?;

        let (writer, reader) = pipe(self.config.pipe_capacity, self.ready.clone());
        let state = self.session_mut(sid)?;
        let serial = state.next_serial();
        let channel = u16::try_from(slot).map_err(|_| Error::invalid("channel id overflow"))?;
        state.channels[slot] = Some(Channel::new(channel, serial, file, key, writer));
        info!(session = sid, channel, %uri, "Track opened");

        Ok((
            TrackHandle {
                session: sid,
                channel,
                serial,
            },
            reader,
        ))
    }

    /// Restart a channel's download loop, scheduling a reconnect if the
    /// request cannot be sent.
    async fn kick(&mut self, track: TrackHandle) {
        let Some(session) = self.sessions.get_mut(&track.session) else {
            return;
        };
        if let Err(e) = session.pump(usize::from(track.channel)).await {
            debug!(session = track.session, error = %e, "Chunk request deferred");
            let conn = session.conn_id();
            self.queue_reconnect(track.session, conn);
        }
    }

    pub(crate) async fn seek(&mut self, track: TrackHandle, offset: u64) -> Result<()> {
        self.session_mut(track.session)?
            .channel_mut(track)?
            .seek(offset)?;
        self.kick(track).await;
        Ok(())
    }

    pub(crate) async fn play(
        &mut self,
        track: TrackHandle,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let channel = self.session_mut(track.session)?.channel_mut(track)?;
        if progress.is_some() {
            channel.set_progress(progress);
        }
        channel.play();
        self.kick(track).await;
        Ok(())
    }

    pub(crate) fn pause(&mut self, track: TrackHandle) -> Result<()> {
        self.session_mut(track.session)?.channel_mut(track)?.pause();
        Ok(())
    }

    pub(crate) fn close(&mut self, track: TrackHandle) -> Result<()> {
        let session = self.session_mut(track.session)?;
        let slot = usize::from(track.channel);
        if session.channel_mut(track)?.close() {
            session.channels[slot] = None;
            debug!(session = track.session, channel = slot, "Channel freed");
        }
        Ok(())
    }

    pub(crate) fn metadata(&mut self, track: TrackHandle) -> Result<TrackMetadata> {
        let channel = self.session_mut(track.session)?.channel_mut(track)?;
        Ok(TrackMetadata {
            file_length: channel.visible_len(),
            position: channel.visible_position(),
            state: channel.state,
            format: channel.file.format,
            name: channel.file.name.clone(),
            duration_ms: channel.file.duration_ms,
        })
    }

    pub(crate) fn set_preferred_bitrate(
        &mut self,
        session: SessionHandle,
        bitrate: Bitrate,
    ) -> Result<()> {
        self.session_mut(session.0)?.bitrate = bitrate;
        Ok(())
    }

    pub(crate) fn reusable_credentials(&mut self, session: SessionHandle) -> Result<StoredCredentials> {
        Ok(self.session_mut(session.0)?.stored.clone())
    }

    pub(crate) fn country(&mut self, session: SessionHandle) -> Result<Option<String>> {
        Ok(self.session_mut(session.0)?.country.clone())
    }
}

impl Worker for Sequencer {
    type Event = Wake;

    async fn next_event(&mut self) -> Wake {
        tokio::select! {
            Some(event) = self.events_rx.recv() => Wake::Connection(event),
            () = self.ready.notified() => Wake::Ready,
            _ = self.tick.tick() => Wake::Tick,
        }
    }

    async fn handle_event(&mut self, event: Wake) {
        match event {
            Wake::Connection(event) => self.handle_connection_event(event).await,
            Wake::Ready => self.on_ready().await,
            Wake::Tick => self.on_tick(),
        }
        self.run_reconnects().await;
    }

    async fn on_shutdown(&mut self) {
        let count = self.sessions.len();
        self.sessions.clear();
        if count > 0 {
            info!(sessions = count, "Dropped sessions at shutdown");
        }
    }
}
