//! Output pipe between the engine worker and a host reader.
//!
//! The worker is the only writer and the host the only reader. Blocks travel
//! over a bounded channel tagged with a generation number; a seek bumps the
//! generation so blocks already queued for the old position are dropped by
//! the reader instead of being delivered. Every block the reader takes
//! signals readiness to the worker so it can flush its backlog.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) enum PipeMsg {
    Data { generation: u64, bytes: Vec<u8> },
    End { generation: u64 },
    Failed { generation: u64, reason: String },
}

impl PipeMsg {
    fn generation(&self) -> u64 {
        match self {
            Self::Data { generation, .. }
            | Self::End { generation }
            | Self::Failed { generation, .. } => *generation,
        }
    }
}

/// Worker-side half of a pipe.
pub(crate) struct PipeWriter {
    tx: Sender<PipeMsg>,
    generation: Arc<AtomicU64>,
}

/// Outcome of a non-blocking write.
pub(crate) enum Offer {
    Accepted,
    Full(Vec<u8>),
    Closed,
}

impl PipeWriter {
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate everything queued so far.
    pub(crate) fn flush(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn offer(&self, bytes: Vec<u8>) -> Offer {
        let msg = PipeMsg::Data {
            generation: self.generation(),
            bytes,
        };
        match self.tx.try_send(msg) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(PipeMsg::Data { bytes, .. })) => Offer::Full(bytes),
            Err(_) => Offer::Closed,
        }
    }

    /// Signal end of file; false if the pipe is full or closed.
    pub(crate) fn finish(&self) -> bool {
        self.tx
            .try_send(PipeMsg::End {
                generation: self.generation(),
            })
            .is_ok()
    }

    /// Signal a failure; hands the reason back if the pipe is full.
    pub(crate) fn fail(&self, reason: String) -> Option<String> {
        let msg = PipeMsg::Failed {
            generation: self.generation(),
            reason,
        };
        match self.tx.try_send(msg) {
            Err(TrySendError::Full(PipeMsg::Failed { reason, .. })) => Some(reason),
            _ => None,
        }
    }
}

/// Host-side reader for a track's decrypted bytes.
///
/// Implements [`io::Read`]: `read` blocks until data is available, returns
/// `Ok(0)` once the whole track was delivered, and fails with
/// [`io::ErrorKind::BrokenPipe`] if the track was closed before its end.
#[derive(Debug)]
pub struct TrackReader {
    rx: Receiver<PipeMsg>,
    generation: Arc<AtomicU64>,
    ready: Arc<Notify>,
    current: Vec<u8>,
    current_generation: u64,
    pos: usize,
    finished_generation: Option<u64>,
    timeout: Option<Duration>,
}

impl TrackReader {
    /// Fail reads that wait longer than `timeout` with
    /// [`io::ErrorKind::TimedOut`].
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn recv(&self) -> io::Result<Option<PipeMsg>> {
        let msg = match self.timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data from engine"));
                }
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.rx.recv().ok(),
        };
        if msg.is_some() {
            self.ready.notify_one();
        }
        Ok(msg)
    }
}

impl io::Read for TrackReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let generation = self.generation.load(Ordering::Acquire);

            if self.current_generation == generation && self.pos < self.current.len() {
                let n = buf.len().min(self.current.len() - self.pos);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            if self.finished_generation == Some(generation) {
                return Ok(0);
            }

            let Some(msg) = self.recv()? else {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "track closed"));
            };

            if msg.generation() != self.generation.load(Ordering::Acquire) {
                continue;
            }

            match msg {
                PipeMsg::Data { generation, bytes } => {
                    self.current = bytes;
                    self.current_generation = generation;
                    self.pos = 0;
                }
                PipeMsg::End { generation } => {
                    self.finished_generation = Some(generation);
                }
                PipeMsg::Failed { reason, .. } => {
                    return Err(io::Error::other(reason));
                }
            }
        }
    }
}

/// Create a pipe holding up to `capacity` blocks.
pub(crate) fn pipe(capacity: usize, ready: Arc<Notify>) -> (PipeWriter, TrackReader) {
    let (tx, rx) = bounded(capacity);
    let generation = Arc::new(AtomicU64::new(0));
    (
        PipeWriter {
            tx,
            generation: generation.clone(),
        },
        TrackReader {
            rx,
            generation,
            ready,
            current: Vec::new(),
            current_generation: 0,
            pos: 0,
            finished_generation: None,
            timeout: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn accepted(offer: Offer) -> bool {
        matches!(offer, Offer::Accepted)
    }

    #[test]
    fn test_read_in_order_then_eof() {
        let (writer, mut reader) = pipe(8, Arc::new(Notify::new()));
        assert!(accepted(writer.offer(b"hello ".to_vec())));
        assert!(accepted(writer.offer(b"world".to_vec())));
        assert!(writer.finish());

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
        assert_eq!(reader.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn test_small_reads_split_blocks() {
        let (writer, mut reader) = pipe(2, Arc::new(Notify::new()));
        assert!(accepted(writer.offer(vec![1, 2, 3, 4, 5])));

        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [3, 4]);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 5);
    }

    #[test]
    fn test_full_pipe_returns_block() {
        let (writer, _reader) = pipe(1, Arc::new(Notify::new()));
        assert!(accepted(writer.offer(vec![1])));
        match writer.offer(vec![2, 3]) {
            Offer::Full(bytes) => assert_eq!(bytes, vec![2, 3]),
            _ => panic!("expected full pipe"),
        }
    }

    #[test]
    fn test_flush_discards_stale_blocks() {
        let (writer, mut reader) = pipe(8, Arc::new(Notify::new()));
        assert!(accepted(writer.offer(b"stale".to_vec())));
        writer.flush();
        assert!(accepted(writer.offer(b"fresh".to_vec())));
        assert!(writer.finish());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"fresh");
    }

    #[test]
    fn test_flush_discards_partially_read_block() {
        let (writer, mut reader) = pipe(8, Arc::new(Notify::new()));
        assert!(accepted(writer.offer(b"abcdef".to_vec())));

        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        writer.flush();
        assert!(accepted(writer.offer(b"xyz".to_vec())));

        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"xyz");
    }

    #[test]
    fn test_writer_dropped_is_broken_pipe() {
        let (writer, mut reader) = pipe(8, Arc::new(Notify::new()));
        drop(writer);
        let err = reader.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_failure_surfaces_as_error() {
        let (writer, mut reader) = pipe(8, Arc::new(Notify::new()));
        assert_eq!(writer.fail("channel error".into()), None);
        let err = reader.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.to_string(), "channel error");
    }

    #[test]
    fn test_failure_on_full_pipe_is_returned() {
        let (writer, mut reader) = pipe(1, Arc::new(Notify::new()));
        assert!(accepted(writer.offer(vec![1, 2])));
        assert_eq!(writer.fail("lost".into()).as_deref(), Some("lost"));

        assert_eq!(reader.read(&mut [0u8; 4]).unwrap(), 2);
        assert_eq!(writer.fail("lost".into()), None);
        assert_eq!(reader.read(&mut [0u8; 4]).unwrap_err().to_string(), "lost");
    }

    #[test]
    fn test_read_timeout() {
        let (_writer, mut reader) = pipe(8, Arc::new(Notify::new()));
        reader.set_read_timeout(Some(Duration::from_millis(10)));
        let err = reader.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_reader_signals_readiness() {
        let ready = Arc::new(Notify::new());
        let (writer, mut reader) = pipe(8, ready.clone());
        assert!(accepted(writer.offer(vec![1])));

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read_exact(&mut buf).unwrap();
        });

        tokio::time::timeout(Duration::from_secs(5), ready.notified())
            .await
            .unwrap();
        handle.join().unwrap();
    }
}
