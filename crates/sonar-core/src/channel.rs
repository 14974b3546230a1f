//! Audio channels: chunked download state machine.
//!
//! A channel downloads one encrypted file in [`CHUNK_SIZE`] ranges. Each
//! StreamChunkRes reply starts with header entries (`len u16 | id u8 |
//! payload`, a zero length switches to data mode), followed by data packets
//! and an empty packet marking the end of the chunk. Data is decrypted with
//! the file's AES-CTR cipher; the first [`SERVICE_HEADER_SIZE`] bytes of the
//! file and any bytes before a seek target are dropped before reaching the
//! output pipe.
//!
//! ```text
//! Opened ──play──▶ Playing ◀──play── Paused
//!                     │                 ▲
//!                     └──pause──────────┘  (deferred while a chunk is in flight)
//! any ──close──▶ Closing (until the in-flight chunk ends) ──▶ freed
//! ```

use crate::error::{Error, Result};
use crate::packet::{self, CHUNK_SIZE, FILE_ID_SIZE, HEADER_FILE_SIZE};
use crate::pipe::{Offer, PipeWriter};
use crate::proto::AudioFormat;
use bytes::Buf;
use sonar_crypto::aes_ctr::FileCipher;
use sonar_crypto::{FILE_KEY_SIZE, MEDIA_ID_SIZE};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Bytes of service header at the start of every file
pub const SERVICE_HEADER_SIZE: u64 = 0xa7;

/// Size of the fixed channel table
pub const MAX_CHANNELS: usize = 8;

/// Progress callback: `(bytes_done, bytes_total)`, total 0 while unknown.
pub type ProgressCallback = Box<dyn FnMut(u64, u64) + Send>;

/// Channel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Opened, not yet downloading
    Opened,
    /// Downloading
    Playing,
    /// Download suspended
    Paused,
    /// Failed or finished
    Stopped,
    /// Closed by the host, waiting for the in-flight chunk to drain
    Closing,
}

/// The file selected for a track.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    /// File id
    pub file_id: [u8; FILE_ID_SIZE],
    /// Media id (track or episode gid)
    pub media_id: [u8; MEDIA_ID_SIZE],
    /// Audio format
    pub format: AudioFormat,
    /// Track or episode name
    pub name: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: Option<u32>,
}

/// What a data packet meant for the download loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkEvent {
    /// More packets expected for this chunk
    Pending,
    /// Chunk finished; another range remains
    ChunkDone,
    /// Chunk finished at end of file
    EndOfFile,
}

/// Parse header entries; returns true once the terminator was seen.
fn parse_header_entries(mut body: &[u8], total_len: &mut Option<u64>) -> Result<bool> {
    while !body.is_empty() {
        if body.len() < 2 {
            return Err(Error::invalid("chunk header entry truncated"));
        }
        let len = usize::from(body.get_u16());
        if len == 0 {
            return Ok(true);
        }
        if body.len() < len {
            return Err(Error::invalid("chunk header entry truncated"));
        }
        let id = body[0];
        let payload = &body[1..len];
        if id == HEADER_FILE_SIZE {
            if payload.len() < 4 {
                return Err(Error::invalid("file size header truncated"));
            }
            let words = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            *total_len = Some(u64::from(words) * 4);
        } else {
            trace!(id, len, "Ignoring chunk header entry");
        }
        body.advance(len);
    }
    Ok(false)
}

/// One open track.
pub(crate) struct Channel {
    pub(crate) id: u16,
    pub(crate) serial: u64,
    pub(crate) file: SelectedFile,
    pub(crate) state: ChannelState,
    cipher: FileCipher,
    total_len: Option<u64>,
    deliver_from: u64,
    next_offset: u64,
    request_end: u64,
    in_flight: bool,
    header_mode: bool,
    pause_pending: bool,
    awaiting_drain: bool,
    eof: bool,
    end_pending: bool,
    fail_pending: Option<String>,
    last_activity: Instant,
    pipe: PipeWriter,
    backlog: VecDeque<Vec<u8>>,
    progress: Option<ProgressCallback>,
}

impl Channel {
    pub(crate) fn new(
        id: u16,
        serial: u64,
        file: SelectedFile,
        key: [u8; FILE_KEY_SIZE],
        pipe: PipeWriter,
    ) -> Self {
        Self {
            id,
            serial,
            file,
            state: ChannelState::Opened,
            cipher: FileCipher::new(key),
            total_len: None,
            deliver_from: SERVICE_HEADER_SIZE,
            next_offset: 0,
            request_end: 0,
            in_flight: false,
            header_mode: false,
            pause_pending: false,
            awaiting_drain: false,
            eof: false,
            end_pending: false,
            fail_pending: None,
            last_activity: Instant::now(),
            pipe,
            backlog: VecDeque::new(),
            progress: None,
        }
    }

    /// Consumer-visible length, once the server reported the file size.
    pub(crate) fn visible_len(&self) -> Option<u64> {
        self.total_len
            .map(|total| total.saturating_sub(SERVICE_HEADER_SIZE))
    }

    /// Consumer-visible bytes decrypted so far.
    pub(crate) fn visible_position(&self) -> u64 {
        self.cipher.position().saturating_sub(SERVICE_HEADER_SIZE)
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    pub(crate) fn set_progress(&mut self, progress: Option<ProgressCallback>) {
        self.progress = progress;
    }

    /// Whether the download loop should issue the next request now.
    pub(crate) fn wants_request(&self) -> bool {
        self.state == ChannelState::Playing
            && !self.in_flight
            && !self.eof
            && self.backlog.is_empty()
    }

    /// Start the next chunk request; returns the StreamChunk payload.
    pub(crate) fn begin_request(&mut self) -> Option<Vec<u8>> {
        if self.in_flight || self.eof {
            return None;
        }

        let start = self.next_offset & !3;
        let end = (start / CHUNK_SIZE + 1) * CHUNK_SIZE;
        // offsets above 16 GiB do not fit the word-addressed request
        let start_words = u32::try_from(start / 4).ok()?;
        let end_words = u32::try_from(end / 4).ok()?;

        if self.cipher.position() != start {
            self.cipher.seek(start);
        }
        self.in_flight = true;
        self.header_mode = true;
        self.awaiting_drain = false;
        self.request_end = end;
        self.last_activity = Instant::now();

        debug!(channel = self.id, start, end, "Requesting chunk");
        Some(packet::chunk_request(
            self.id,
            &self.file.file_id,
            start_words,
            end_words,
        ))
    }

    /// Feed one StreamChunkRes body.
    pub(crate) fn on_data(&mut self, body: &[u8]) -> Result<ChunkEvent> {
        if !self.in_flight {
            debug!(channel = self.id, len = body.len(), "Dropping unsolicited chunk data");
            return Ok(ChunkEvent::Pending);
        }
        self.last_activity = Instant::now();

        if self.header_mode {
            if parse_header_entries(body, &mut self.total_len)? {
                self.header_mode = false;
                trace!(channel = self.id, total = ?self.total_len, "Chunk headers complete");
            }
            return Ok(ChunkEvent::Pending);
        }

        if body.is_empty() {
            return Ok(self.finish_chunk());
        }

        let offset = self.cipher.position();
        let mut data = body.to_vec();
        self.cipher.decrypt(&mut data);

        if self.state != ChannelState::Closing {
            let skip = self.deliver_from.saturating_sub(offset).min(data.len() as u64) as usize;
            if skip < data.len() {
                if skip > 0 {
                    data.drain(..skip);
                }
                self.deliver(data);
            }
        }
        Ok(ChunkEvent::Pending)
    }

    fn finish_chunk(&mut self) -> ChunkEvent {
        self.in_flight = false;
        let reached = self.cipher.position();

        let short = reached < self.request_end;
        let past_total = self.total_len.is_some_and(|total| reached >= total);
        self.next_offset = reached;

        if self.pause_pending {
            self.pause_pending = false;
            if self.state == ChannelState::Playing {
                self.state = ChannelState::Paused;
            }
        }

        if let Some(progress) = self.progress.as_mut() {
            let done = reached.saturating_sub(SERVICE_HEADER_SIZE);
            progress(done, self.total_len.map_or(0, |t| t.saturating_sub(SERVICE_HEADER_SIZE)));
        }

        if short || past_total {
            self.eof = true;
            self.end_pending = true;
            self.flush_backlog();
            debug!(channel = self.id, bytes = reached, "End of file");
            ChunkEvent::EndOfFile
        } else {
            if !self.backlog.is_empty() {
                self.awaiting_drain = true;
            }
            ChunkEvent::ChunkDone
        }
    }

    fn deliver(&mut self, bytes: Vec<u8>) {
        if !self.backlog.is_empty() {
            self.backlog.push_back(bytes);
            return;
        }
        match self.pipe.offer(bytes) {
            Offer::Accepted => {}
            Offer::Full(bytes) => self.backlog.push_back(bytes),
            Offer::Closed => trace!(channel = self.id, "Reader gone, dropping data"),
        }
    }

    /// Push backlogged blocks into the pipe; true once everything is out.
    pub(crate) fn flush_backlog(&mut self) -> bool {
        if let Some(reason) = self.fail_pending.take() {
            self.fail_pending = self.pipe.fail(reason);
            return self.fail_pending.is_none();
        }
        while let Some(bytes) = self.backlog.pop_front() {
            match self.pipe.offer(bytes) {
                Offer::Accepted => {}
                Offer::Full(bytes) => {
                    self.backlog.push_front(bytes);
                    return false;
                }
                Offer::Closed => {
                    self.backlog.clear();
                    break;
                }
            }
        }
        if self.end_pending && self.pipe.finish() {
            self.end_pending = false;
        }
        !self.end_pending
    }

    /// A chunk completed while output was backlogged; resume once drained.
    pub(crate) fn is_awaiting_drain(&self) -> bool {
        self.awaiting_drain
    }

    /// Reposition at consumer byte `offset`.
    pub(crate) fn seek(&mut self, offset: u64) -> Result<()> {
        if self.in_flight {
            return Err(Error::occupied("seek while a chunk download is in flight"));
        }
        if self.state == ChannelState::Closing {
            return Err(Error::NoSession);
        }
        if let Some(len) = self.visible_len() {
            if offset > len {
                return Err(Error::invalid("seek beyond end of track"));
            }
        }

        let target = offset + SERVICE_HEADER_SIZE;
        let start = target & !3;
        self.cipher.seek(start);
        self.next_offset = start;
        self.deliver_from = target;
        self.eof = false;
        self.end_pending = false;
        self.fail_pending = None;
        self.awaiting_drain = false;
        self.backlog.clear();
        let generation = self.pipe.flush();

        debug!(channel = self.id, offset, start, skip = target - start, generation, "Seek");
        Ok(())
    }

    pub(crate) fn play(&mut self) {
        self.pause_pending = false;
        if self.state != ChannelState::Closing {
            self.state = ChannelState::Playing;
        }
    }

    pub(crate) fn pause(&mut self) {
        if self.in_flight {
            self.pause_pending = true;
        } else if self.state == ChannelState::Playing {
            self.state = ChannelState::Paused;
        }
    }

    /// Mark closed; returns true if the slot can be freed right away.
    pub(crate) fn close(&mut self) -> bool {
        self.state = ChannelState::Closing;
        self.backlog.clear();
        !self.in_flight
    }

    /// The server failed the channel.
    ///
    /// Undelivered output is dropped; if the pipe is full the failure is
    /// held until the reader makes room.
    pub(crate) fn fail(&mut self, reason: String) {
        self.in_flight = false;
        if self.state != ChannelState::Closing {
            self.state = ChannelState::Stopped;
        }
        self.backlog.clear();
        self.end_pending = false;
        self.awaiting_drain = false;
        self.fail_pending = Some(reason);
        self.flush_backlog();
    }

    /// Forget the in-flight request after losing the connection; the next
    /// request restarts at the last decrypted byte without flushing output.
    pub(crate) fn resume(&mut self) -> bool {
        if !self.in_flight {
            return false;
        }
        let pos = self.cipher.position();
        self.next_offset = pos & !3;
        self.deliver_from = self.deliver_from.max(pos);
        self.in_flight = false;
        self.header_mode = false;
        debug!(channel = self.id, offset = pos, "Resuming after reconnect");
        true
    }

    pub(crate) fn is_stalled(&self, now: Instant, timeout: Duration) -> bool {
        self.in_flight && now.saturating_duration_since(self.last_activity) > timeout
    }
}
