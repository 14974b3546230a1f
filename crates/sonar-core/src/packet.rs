//! Wire codec for post-handshake packets.
//!
//! Every encrypted packet carries a one-byte command followed by a
//! command-specific payload. This module names the commands and encodes or
//! decodes the payloads the engine exchanges:
//!
//! ```text
//! StreamChunk  (0x08): channel u16 | 00 01 | 00 00 | 00000000 | 00009c40 |
//!                      00020000 | file id [20] | start u32 | end u32
//! StreamChunkRes (0x09): channel u16 | data
//! RequestKey   (0x0c): file id [20] | media id [16] | seq u32 | 00 00
//! AesKey       (0x0d): seq u32 | key [16]
//! AesKeyError  (0x0e): seq u32 | status u16
//! MercuryReq   (0xb2): seq_len u16 | seq [seq_len] | flags u8 |
//!                      part count u16 | (len u16 | part)*
//! ```
//!
//! All integers are big-endian. Chunk offsets are counted in 4-byte words.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut};
use sonar_crypto::{FILE_KEY_SIZE, MEDIA_ID_SIZE};

/// Size of a file id
pub const FILE_ID_SIZE: usize = 20;

/// Chunk size requested per round trip (32 KiB)
pub const CHUNK_SIZE: u64 = 0x8000;

/// Chunk header entry id carrying the file size in words
pub const HEADER_FILE_SIZE: u8 = 0x03;

/// Mercury flag marking the final frame of a message
pub const MERCURY_FLAG_FINAL: u8 = 0x01;

/// Packet command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Server secret block
    SecretBlock = 0x02,
    /// Keepalive from the server
    Ping = 0x04,
    /// Request a byte range of a file
    StreamChunk = 0x08,
    /// Chunk header or data
    StreamChunkRes = 0x09,
    /// Channel failed on the server
    ChannelError = 0x0a,
    /// Abort a channel
    ChannelAbort = 0x0b,
    /// Request a file key
    RequestKey = 0x0c,
    /// File key reply
    AesKey = 0x0d,
    /// File key refused
    AesKeyError = 0x0e,
    /// Image data
    Image = 0x19,
    /// Account country
    CountryCode = 0x1b,
    /// Keepalive answer
    Pong = 0x49,
    /// Keepalive acknowledgment
    PongAck = 0x4a,
    /// Playback paused elsewhere
    Pause = 0x4b,
    /// Account product attributes (XML)
    ProductInfo = 0x50,
    /// Legacy welcome
    LegacyWelcome = 0x69,
    /// License version
    LicenseVersion = 0x76,
    /// Encrypted login
    Login = 0xab,
    /// Login accepted
    ApWelcome = 0xac,
    /// Login refused
    AuthFailure = 0xad,
    /// Mercury request
    MercuryReq = 0xb2,
    /// Mercury subscribe
    MercurySub = 0xb3,
    /// Mercury unsubscribe
    MercuryUnsub = 0xb4,
    /// Mercury event
    MercuryEvent = 0xb5,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x02 => Ok(Self::SecretBlock),
            0x04 => Ok(Self::Ping),
            0x08 => Ok(Self::StreamChunk),
            0x09 => Ok(Self::StreamChunkRes),
            0x0a => Ok(Self::ChannelError),
            0x0b => Ok(Self::ChannelAbort),
            0x0c => Ok(Self::RequestKey),
            0x0d => Ok(Self::AesKey),
            0x0e => Ok(Self::AesKeyError),
            0x19 => Ok(Self::Image),
            0x1b => Ok(Self::CountryCode),
            0x49 => Ok(Self::Pong),
            0x4a => Ok(Self::PongAck),
            0x4b => Ok(Self::Pause),
            0x50 => Ok(Self::ProductInfo),
            0x69 => Ok(Self::LegacyWelcome),
            0x76 => Ok(Self::LicenseVersion),
            0xab => Ok(Self::Login),
            0xac => Ok(Self::ApWelcome),
            0xad => Ok(Self::AuthFailure),
            0xb2 => Ok(Self::MercuryReq),
            0xb3 => Ok(Self::MercurySub),
            0xb4 => Ok(Self::MercuryUnsub),
            0xb5 => Ok(Self::MercuryEvent),
            other => Err(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

fn need(buf: &[u8], len: usize, what: &'static str) -> Result<()> {
    if buf.len() < len {
        return Err(Error::invalid(what));
    }
    Ok(())
}

// ============================================================================
// Chunks
// ============================================================================

/// Encode a StreamChunk request for `[start, end)` in 4-byte words.
#[must_use]
pub fn chunk_request(channel: u16, file_id: &[u8; FILE_ID_SIZE], start: u32, end: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(46);
    buf.put_u16(channel);
    buf.put_u16(0x0001);
    buf.put_u16(0x0000);
    buf.put_u32(0x0000_0000);
    buf.put_u32(0x0000_9c40);
    buf.put_u32(0x0002_0000);
    buf.put_slice(file_id);
    buf.put_u32(start);
    buf.put_u32(end);
    buf
}

/// Split a StreamChunkRes / ChannelError payload into channel id and body.
///
/// # Errors
/// Returns [`Error::InvalidData`] if the payload is shorter than the id.
pub fn split_channel(payload: &[u8]) -> Result<(u16, &[u8])> {
    need(payload, 2, "channel payload shorter than its id")?;
    let mut buf = payload;
    let channel = buf.get_u16();
    Ok((channel, buf))
}

// ============================================================================
// File keys
// ============================================================================

/// Encode a RequestKey payload.
#[must_use]
pub fn key_request(file_id: &[u8; FILE_ID_SIZE], media_id: &[u8; MEDIA_ID_SIZE], seq: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FILE_ID_SIZE + MEDIA_ID_SIZE + 6);
    buf.put_slice(file_id);
    buf.put_slice(media_id);
    buf.put_u32(seq);
    buf.put_u16(0x0000);
    buf
}

/// Sequence number leading an AesKey / AesKeyError payload.
///
/// # Errors
/// Returns [`Error::InvalidData`] if the payload is too short.
pub fn key_reply_seq(payload: &[u8]) -> Result<u32> {
    need(payload, 4, "key reply shorter than its sequence")?;
    let mut buf = payload;
    Ok(buf.get_u32())
}

/// Extract the file key from an AesKey payload.
///
/// # Errors
/// Returns [`Error::InvalidData`] if the payload is too short.
pub fn parse_aes_key(payload: &[u8]) -> Result<[u8; FILE_KEY_SIZE]> {
    need(payload, 4 + FILE_KEY_SIZE, "file key reply truncated")?;
    let mut key = [0u8; FILE_KEY_SIZE];
    key.copy_from_slice(&payload[4..4 + FILE_KEY_SIZE]);
    Ok(key)
}

/// Status code carried by an AesKeyError payload.
#[must_use]
pub fn parse_key_error(payload: &[u8]) -> u16 {
    match payload.get(4..6) {
        Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
        _ => 0,
    }
}

// ============================================================================
// Mercury
// ============================================================================

/// A Mercury frame: sequence number, flags and parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MercuryFrame {
    /// Sequence number
    pub seq: u64,
    /// Frame flags
    pub flags: u8,
    /// Parts; part 0 is the serialized header
    pub parts: Vec<Vec<u8>>,
}

impl MercuryFrame {
    /// Encode the frame.
    ///
    /// # Errors
    /// Returns [`Error::InvalidData`] if a part or the part count does not
    /// fit in 16 bits.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.parts.len()).map_err(|_| Error::invalid("too many parts"))?;
        let mut buf = Vec::with_capacity(13 + self.parts.iter().map(|p| p.len() + 2).sum::<usize>());
        buf.put_u16(8);
        buf.put_u64(self.seq);
        buf.put_u8(self.flags);
        buf.put_u16(count);
        for part in &self.parts {
            let len = u16::try_from(part.len()).map_err(|_| Error::invalid("part too large"))?;
            buf.put_u16(len);
            buf.put_slice(part);
        }
        Ok(buf)
    }

    /// Decode a frame.
    ///
    /// # Errors
    /// Returns [`Error::InvalidData`] on truncated input.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        need(buf, 2, "mercury frame truncated")?;
        let seq_len = buf.get_u16() as usize;
        need(buf, seq_len + 3, "mercury frame truncated")?;

        let mut seq_bytes = [0u8; 8];
        let take = seq_len.min(8);
        seq_bytes[8 - take..].copy_from_slice(&buf[seq_len - take..seq_len]);
        buf.advance(seq_len);
        let seq = u64::from_be_bytes(seq_bytes);

        let flags = buf.get_u8();
        let count = buf.get_u16();
        let mut parts = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            need(buf, 2, "mercury part truncated")?;
            let len = buf.get_u16() as usize;
            need(buf, len, "mercury part truncated")?;
            parts.push(buf[..len].to_vec());
            buf.advance(len);
        }

        Ok(Self { seq, flags, parts })
    }
}

/// Mercury sequence number of a reply, without decoding the parts.
///
/// # Errors
/// Returns [`Error::InvalidData`] on truncated input.
pub fn mercury_seq(payload: &[u8]) -> Result<u64> {
    need(payload, 2, "mercury frame truncated")?;
    let seq_len = usize::from(u16::from_be_bytes([payload[0], payload[1]]));
    need(payload, 2 + seq_len, "mercury frame truncated")?;
    let take = seq_len.min(8);
    let mut seq_bytes = [0u8; 8];
    seq_bytes[8 - take..].copy_from_slice(&payload[2 + seq_len - take..2 + seq_len]);
    Ok(u64::from_be_bytes(seq_bytes))
}
