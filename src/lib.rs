//! # LAN Audio Relay
//!
//! Relays a live audio signal from a capture device on one machine to a
//! playback device on another over a single persistent TCP connection.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────┐          ┌──────────────────────────────┐
//! │          SENDER PC           │          │         RECEIVER PC          │
//! │  ┌────────────┐              │          │              ┌────────────┐  │
//! │  │ Microphone │              │          │              │  Speakers/ │  │
//! │  └─────┬──────┘              │          │              │Virtual Dev │  │
//! │        │ PCM chunks          │          │              └─────▲──────┘  │
//! │        ▼                     │          │                    │         │
//! │  ┌────────────┐              │          │              ┌─────┴──────┐  │
//! │  │CpalCapture │              │          │              │CpalPlayback│  │
//! │  └─────┬──────┘              │          │              └─────▲──────┘  │
//! │        ▼                     │          │                    │         │
//! │  ┌────────────┐   TCP (one   │  framed  │              ┌─────┴──────┐  │
//! │  │SenderAgent ├──connection──┼──or raw──┼──────────────► Receiver   │  │
//! │  │ (listens)  │              │  PCM     │              │ Agent      │  │
//! │  └────────────┘              │          │              └────────────┘  │
//! └──────────────────────────────┘          └──────────────────────────────┘
//! ```
//!
//! Each agent runs its transfer loop on one dedicated thread; socket and
//! device calls are blocking and sequential within a loop iteration. The
//! receiver periodically tears down and re-establishes the connection when
//! its drift counter trips, bounding the latency that accumulates in the OS
//! receive buffer when playback falls behind capture.

pub mod audio;
pub mod config;
pub mod error;
pub mod net;
pub mod protocol;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio transfer
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Default chunk size in frames per device read/write
    pub const DEFAULT_CHUNK_FRAMES: usize = 512;

    /// Bytes per sample (16-bit signed PCM)
    pub const SAMPLE_WIDTH: usize = 2;

    /// Default TCP port the sender listens on
    pub const DEFAULT_PORT: u16 = 9998;

    /// Size of the wire length prefix in bytes (big-endian u64)
    pub const LENGTH_PREFIX_BYTES: usize = 8;

    /// Default number of payload-read iterations before the receiver
    /// proactively reconnects to shed buffered latency
    pub const DEFAULT_DRIFT_THRESHOLD: u64 = 100;

    /// Capacity of the channels bridging device callbacks and the
    /// transfer thread, in chunks
    pub const CHUNK_CHANNEL_CAPACITY: usize = 64;
}
