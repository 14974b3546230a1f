//! Live encrypted connection to an access point.
//!
//! The worker owns the write half and the send cipher, so packets leave in
//! the order the worker seals them. A reader task on the same runtime owns
//! the read half and the receive cipher; it only decrypts packets and
//! forwards them to the worker as [`Event`]s.

use crate::config::EngineConfig;
use crate::credentials::{Credentials, StoredCredentials};
use crate::error::{Error, Result};
use crate::handshake::{self, Transport};
use crate::packet::Command;
use bytes::{Buf, BytesMut};
use sonar_crypto::shannon::{ShannonRecv, ShannonSend};
use sonar_transport::{AccessPoint, BoxedStream, Connector};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Initial read buffer capacity
const READ_BUFFER: usize = 16 * 1024;

/// Something the worker must react to.
#[derive(Debug)]
pub(crate) enum Event {
    /// A decrypted packet
    Packet {
        session: u64,
        conn: u64,
        cmd: Command,
        payload: Vec<u8>,
    },
    /// The connection is gone
    Closed {
        session: u64,
        conn: u64,
        error: Error,
    },
}

/// An authenticated connection.
pub(crate) struct Connection {
    pub(crate) id: u64,
    pub(crate) ap: AccessPoint,
    writer: WriteHalf<BoxedStream>,
    send: ShannonSend,
    reader: JoinHandle<()>,
    write_timeout: Duration,
}

impl Connection {
    /// Connect, handshake and log in.
    ///
    /// Returns the connection together with the reusable credentials from
    /// APWelcome. Packets arriving after the welcome are forwarded on
    /// `events` tagged with `session` and `id`.
    ///
    /// # Errors
    ///
    /// Any connect, handshake or login failure.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn open(
        connector: &dyn Connector,
        ap: AccessPoint,
        config: &EngineConfig,
        username: &str,
        credentials: &Credentials,
        session: u64,
        id: u64,
        events: UnboundedSender<Event>,
    ) -> Result<(Self, StoredCredentials)> {
        debug!(%ap, conn = id, "Connecting");
        let mut stream = connector.connect(&ap).await?;

        let mut transport = handshake::handshake(
            &mut stream,
            config.handshake_timeout,
            config.hashcash_max_iterations,
        )
        .await?;

        let request = handshake::login_request(username, credentials, config);
        let mut buf = BytesMut::with_capacity(READ_BUFFER);
        let stored = handshake::authenticate(
            &mut stream,
            &mut transport,
            &mut buf,
            &request,
            config.request_timeout,
        )
        .await?;

        let Transport { send, recv } = transport;
        let (read_half, writer) = tokio::io::split(stream);
        let reader = tokio::spawn(read_loop(read_half, recv, buf, session, id, events));

        Ok((
            Self {
                id,
                ap,
                writer,
                send,
                reader,
                write_timeout: config.request_timeout,
            },
            stored,
        ))
    }

    /// Seal and write one packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] if the socket write fails and
    /// [`Error::Timeout`] if it does not complete in time.
    pub(crate) async fn send(&mut self, cmd: Command, payload: &[u8]) -> Result<()> {
        trace!(conn = self.id, ?cmd, payload = %hex::encode(payload), "Sending packet");
        let sealed = self.send.seal(cmd.into(), payload)?;

        let write = async {
            self.writer.write_all(&sealed).await?;
            self.writer.flush().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Err(_) => Err(Error::timeout("packet write")),
            Ok(Err(err)) => Err(Error::Write(err.to_string())),
            Ok(Ok(())) => Ok(()),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: ReadHalf<BoxedStream>,
    mut recv: ShannonRecv,
    mut buf: BytesMut,
    session: u64,
    conn: u64,
    events: UnboundedSender<Event>,
) {
    let error = loop {
        match drain(&mut recv, &mut buf, session, conn, &events) {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => break err,
        }

        match stream.read_buf(&mut buf).await {
            Ok(0) => break Error::NoConnection,
            Ok(_) => {}
            Err(err) => break Error::Transport(err.into()),
        }
    };

    warn!(conn, %error, "Connection lost");
    let _ = events.send(Event::Closed {
        session,
        conn,
        error,
    });
}

/// Forward every complete packet in `buf`; false once the worker is gone.
fn drain(
    recv: &mut ShannonRecv,
    buf: &mut BytesMut,
    session: u64,
    conn: u64,
    events: &UnboundedSender<Event>,
) -> Result<bool> {
    while let Some(packet) = recv.open(&buf[..])? {
        buf.advance(packet.consumed);
        trace!(conn, cmd = packet.cmd, payload = %hex::encode(&packet.payload), "Received packet");

        let Ok(cmd) = Command::try_from(packet.cmd) else {
            debug!(conn, cmd = packet.cmd, "Ignoring unknown command");
            continue;
        };
        let event = Event::Packet {
            session,
            conn,
            cmd,
            payload: packet.payload,
        };
        if events.send(event).is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}
