//! # SONAR Core
//!
//! Protocol engine for the SONAR access-point client.
//!
//! This crate provides:
//! - Packet codec (command ids, chunk and key requests, Mercury frames,
//!   protobuf messages)
//! - Handshake, encrypted login and the live connection
//! - Chunked AES-CTR audio channels with seek, backpressure and
//!   reconnect-resume
//! - The command bridge that runs every operation on one worker thread
//! - The host-facing [`Engine`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  host threads: Engine::{login, open, seek, play, ...}           │
//! │                TrackReader (io::Read)                           │
//! ├──────────────────────── bridge (job queue) ─────────────────────┤
//! │  worker thread: Sequencer                                       │
//! │    sessions ─▶ connection (Shannon) ─▶ channels ─▶ pipes        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  reader tasks: decrypt packets, forward events to the worker    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod bridge;
pub mod channel;
pub mod config;
mod connection;
pub mod credentials;
mod engine;
pub mod error;
mod handshake;
pub mod mercury;
pub mod packet;
mod pipe;
pub mod proto;
mod sequencer;
mod session;

pub use channel::{ChannelState, MAX_CHANNELS, ProgressCallback, SERVICE_HEADER_SIZE, SelectedFile};
pub use config::{Bitrate, EngineConfig};
pub use credentials::{Credentials, StoredCredentials};
pub use engine::{Engine, TrackMetadata, WORKER_THREAD_NAME};
pub use error::{Error, LoginFailure, Result};
pub use handshake::{HELLO_VERSION, MAX_HANDSHAKE_MESSAGE};
pub use mercury::{CatalogUri, MediaKind};
pub use packet::{CHUNK_SIZE, Command};
pub use pipe::TrackReader;
pub use session::{SessionHandle, TrackHandle};
