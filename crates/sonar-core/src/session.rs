//! Logged-in sessions and their channel tables.

use crate::channel::{Channel, ChannelState, MAX_CHANNELS};
use crate::config::Bitrate;
use crate::connection::Connection;
use crate::credentials::StoredCredentials;
use crate::error::{Error, Result};
use crate::packet::Command;
use std::fmt;

/// Handle to a logged-in session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub(crate) u64);

impl SessionHandle {
    /// Numeric session id
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Handle to an open track.
///
/// The serial distinguishes successive tracks that reuse a channel slot, so
/// a handle outliving its track is rejected instead of reaching the next
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    pub(crate) session: u64,
    pub(crate) channel: u16,
    pub(crate) serial: u64,
}

impl TrackHandle {
    /// Session the track belongs to
    #[must_use]
    pub fn session(self) -> SessionHandle {
        SessionHandle(self.session)
    }

    /// Channel slot
    #[must_use]
    pub fn channel(self) -> u16 {
        self.channel
    }
}

/// One logged-in identity.
pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) stored: StoredCredentials,
    pub(crate) conn: Option<Connection>,
    pub(crate) channels: [Option<Channel>; MAX_CHANNELS],
    pub(crate) bitrate: Bitrate,
    pub(crate) country: Option<String>,
    pub(crate) reconnect_failures: u32,
    next_key_seq: u32,
    next_serial: u64,
}

impl Session {
    pub(crate) fn new(id: u64, stored: StoredCredentials, conn: Connection, bitrate: Bitrate) -> Self {
        Self {
            id,
            stored,
            conn: Some(conn),
            channels: Default::default(),
            bitrate,
            country: None,
            reconnect_failures: 0,
            next_key_seq: 0,
            next_serial: 0,
        }
    }

    pub(crate) fn conn_id(&self) -> Option<u64> {
        self.conn.as_ref().map(|c| c.id)
    }

    pub(crate) fn free_slot(&self) -> Option<usize> {
        self.channels.iter().position(Option::is_none)
    }

    pub(crate) fn next_key_seq(&mut self) -> u32 {
        let seq = self.next_key_seq;
        self.next_key_seq = self.next_key_seq.wrapping_add(1);
        seq
    }

    pub(crate) fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Look up the channel a handle refers to.
    pub(crate) fn channel_mut(&mut self, track: TrackHandle) -> Result<&mut Channel> {
        self.channels
            .get_mut(usize::from(track.channel))
            .and_then(Option::as_mut)
            .filter(|c| c.serial == track.serial && c.state != ChannelState::Closing)
            .ok_or(Error::NoSession)
    }

    /// Whether a channel still has bytes to fetch
    pub(crate) fn has_pending_downloads(&self) -> bool {
        self.channels
            .iter()
            .flatten()
            .any(|c| c.state == ChannelState::Playing && !c.is_eof())
    }

    /// Issue the next chunk request for `slot` if the channel wants one.
    ///
    /// On a send failure the request is forgotten so the channel resumes
    /// cleanly after a reconnect.
    pub(crate) async fn pump(&mut self, slot: usize) -> Result<()> {
        let Some(channel) = self.channels[slot].as_mut() else {
            return Ok(());
        };
        if !channel.wants_request() {
            return Ok(());
        }
        let Some(payload) = channel.begin_request() else {
            channel.fail("offset beyond addressable range".into());
            return Ok(());
        };

        let sent = match self.conn.as_mut() {
            Some(conn) => conn.send(Command::StreamChunk, &payload).await,
            None => Err(Error::NoConnection),
        };
        if sent.is_err() {
            if let Some(channel) = self.channels[slot].as_mut() {
                channel.resume();
            }
        }
        sent
    }

    /// Free a closing slot once its last chunk drained.
    pub(crate) fn reap(&mut self, slot: usize) {
        let done = self.channels[slot]
            .as_ref()
            .is_some_and(|c| c.state == ChannelState::Closing && !c.is_in_flight());
        if done {
            tracing::debug!(session = self.id, channel = slot, "Channel freed");
            self.channels[slot] = None;
        }
    }

    /// Fail every live channel with `reason`.
    pub(crate) fn fail_channels(&mut self, reason: &str) {
        for slot in 0..MAX_CHANNELS {
            if let Some(channel) = self.channels[slot].as_mut() {
                channel.fail(reason.to_string());
            }
            self.reap(slot);
        }
    }
}
