//! Mercury metadata lookups and audio file selection.

use crate::channel::SelectedFile;
use crate::config::Bitrate;
use crate::error::{Error, Result};
use crate::packet::{FILE_ID_SIZE, MERCURY_FLAG_FINAL, MercuryFrame};
use crate::proto::{self, AudioFile, AudioFormat, Episode, MercuryHeader, Track};
use prost::Message;
use sonar_crypto::{MEDIA_ID_SIZE, base62};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Kind of catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Music track
    Track,
    /// Podcast episode
    Episode,
}

impl MediaKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Episode => "episode",
        }
    }
}

/// A parsed catalog URI (`spotify:track:<base62>` or an `open.spotify.com`
/// link).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUri {
    /// Item kind
    pub kind: MediaKind,
    /// Decoded media id
    pub media_id: [u8; MEDIA_ID_SIZE],
}

impl CatalogUri {
    /// Mercury path of the item's metadata
    #[must_use]
    pub fn metadata_path(&self) -> String {
        format!(
            "hm://metadata/4/{}/{}",
            self.kind.as_str(),
            hex::encode(self.media_id)
        )
    }
}

impl fmt::Display for CatalogUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spotify:{}:{}",
            self.kind.as_str(),
            base62::encode(&self.media_id)
        )
    }
}

impl FromStr for CatalogUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (kind, id) = if let Some(rest) = s.strip_prefix("spotify:") {
            rest.split_once(':')
                .ok_or_else(|| Error::InvalidData(format!("malformed uri {s}").into()))?
        } else if let Some(rest) = s
            .strip_prefix("https://open.spotify.com/")
            .or_else(|| s.strip_prefix("http://open.spotify.com/"))
        {
            let rest = rest.split(['?', '#']).next().unwrap_or(rest);
            rest.split_once('/')
                .ok_or_else(|| Error::InvalidData(format!("malformed link {s}").into()))?
        } else {
            return Err(Error::InvalidData(format!("unsupported uri {s}").into()));
        };

        let kind = match kind {
            "track" => MediaKind::Track,
            "episode" => MediaKind::Episode,
            other => {
                return Err(Error::InvalidData(
                    format!("unsupported item kind {other}").into(),
                ));
            }
        };
        let media_id = base62::decode(id)?;
        Ok(Self { kind, media_id })
    }
}

/// Encode a metadata GET as a MercuryReq payload.
///
/// # Errors
/// Returns [`Error::InvalidData`] if the frame cannot be encoded.
pub fn metadata_request(seq: u64, uri: &CatalogUri) -> Result<Vec<u8>> {
    let header = MercuryHeader {
        uri: Some(uri.metadata_path()),
        content_type: None,
        method: Some("GET".to_string()),
        status_code: None,
    };
    MercuryFrame {
        seq,
        flags: MERCURY_FLAG_FINAL,
        parts: vec![proto::encode(&header)],
    }
    .encode()
}

/// Check a Mercury reply and return its first payload part.
///
/// # Errors
/// Returns [`Error::Unavailable`] for non-2xx statuses or empty replies and
/// [`Error::InvalidData`] for malformed frames.
pub fn parse_metadata_reply(payload: &[u8]) -> Result<Vec<u8>> {
    let frame = MercuryFrame::decode(payload)?;
    let mut parts = frame.parts.into_iter();
    let header_bytes = parts
        .next()
        .ok_or_else(|| Error::invalid("mercury reply without header"))?;
    let header = MercuryHeader::decode(header_bytes.as_slice())?;

    let status = header.status_code.unwrap_or(200);
    if !(200..300).contains(&status) {
        return Err(Error::Unavailable(format!(
            "metadata lookup returned status {status}"
        )));
    }

    parts
        .next()
        .ok_or_else(|| Error::Unavailable("metadata reply carried no item".into()))
}

fn ogg_kbps(format: AudioFormat) -> Option<u32> {
    match format {
        AudioFormat::OggVorbis96 => Some(96),
        AudioFormat::OggVorbis160 => Some(160),
        AudioFormat::OggVorbis320 => Some(320),
        _ => None,
    }
}

/// Pick the Ogg-Vorbis file closest to the preferred bitrate.
fn best_file(files: &[AudioFile], bitrate: Bitrate) -> Option<(AudioFormat, [u8; FILE_ID_SIZE])> {
    let candidates = files.iter().filter_map(|file| {
        let format = AudioFormat::try_from(file.format?).ok()?;
        let kbps = ogg_kbps(format)?;
        let id: [u8; FILE_ID_SIZE] = file.file_id.as_deref()?.try_into().ok()?;
        Some((kbps, format, id))
    });

    let best = match bitrate.kbps() {
        Some(wanted) => candidates.min_by_key(|(kbps, _, _)| {
            // nearest first, higher rate breaks ties
            (kbps.abs_diff(wanted), u32::MAX - kbps)
        }),
        None => candidates.max_by_key(|(kbps, _, _)| *kbps),
    };
    best.map(|(_, format, id)| (format, id))
}

fn gid(raw: Option<&Vec<u8>>, fallback: &[u8; MEDIA_ID_SIZE]) -> [u8; MEDIA_ID_SIZE] {
    raw.and_then(|g| g.as_slice().try_into().ok())
        .unwrap_or(*fallback)
}

/// Select the file to stream from a metadata reply body.
///
/// Tracks fall back to their listed alternatives when the track itself has
/// no usable file.
///
/// # Errors
/// Returns [`Error::InvalidData`] if the body does not decode and
/// [`Error::Unavailable`] if no Ogg-Vorbis file is listed.
pub fn select_file(uri: &CatalogUri, body: &[u8], bitrate: Bitrate) -> Result<SelectedFile> {
    match uri.kind {
        MediaKind::Track => {
            let track = Track::decode(body)?;
            let candidates = std::iter::once(&track).chain(track.alternative.iter());
            for (i, candidate) in candidates.enumerate() {
                if let Some((format, file_id)) = best_file(&candidate.file, bitrate) {
                    if i > 0 {
                        debug!(alternative = i, "Using alternative track");
                    }
                    return Ok(SelectedFile {
                        file_id,
                        media_id: gid(candidate.gid.as_ref(), &uri.media_id),
                        format,
                        name: track.name.clone(),
                        duration_ms: track.duration.and_then(|d| u32::try_from(d).ok()),
                    });
                }
            }
            Err(Error::Unavailable(format!("no playable file for {uri}")))
        }
        MediaKind::Episode => {
            let episode = Episode::decode(body)?;
            let (format, file_id) = best_file(&episode.audio, bitrate)
                .ok_or_else(|| Error::Unavailable(format!("no playable file for {uri}")))?;
            Ok(SelectedFile {
                file_id,
                media_id: gid(episode.gid.as_ref(), &uri.media_id),
                format,
                name: episode.name.clone(),
                duration_ms: episode.duration.and_then(|d| u32::try_from(d).ok()),
            })
        }
    }
}
