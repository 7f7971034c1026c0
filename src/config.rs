//! Configuration for both agents
//!
//! Defaults match the reference deployment: 16-bit mono PCM at 44100 Hz in
//! 512-frame chunks, framed wire format, sender listening on port 9998.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use crate::constants::*;
use crate::error::{Error, Result};

/// PCM format shared by capture, wire, and playback.
///
/// Both peers must be configured identically. The wire carries no format
/// description, so a mismatch (different chunk size, rate, or channel count)
/// is not detected — it plays back as garbled audio with no explicit error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    /// Samples per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Frames per chunk handed to/from the device
    pub chunk_frames: usize,
}

impl AudioFormat {
    /// Size of one chunk on the wire (16-bit samples)
    pub fn chunk_bytes(&self) -> usize {
        self.channels as usize * SAMPLE_WIDTH * self.chunk_frames
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
        }
    }
}

/// Wire format variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Each chunk is preceded by an 8-byte big-endian length prefix.
    /// Survives arbitrary TCP segmentation and enables drift recovery.
    Framed,
    /// Raw chunks with no prefix; both sides must use the exact same
    /// chunk size or the frame boundary silently desynchronizes.
    Fixed,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the sender binds / the receiver connects to
    pub address: IpAddr,
    /// TCP port
    pub port: u16,
    /// Wire format both peers use
    pub wire_format: WireFormat,
    /// Payload-read iterations before the receiver reconnects to shed
    /// buffered latency. Policy parameter, framed variant only.
    pub drift_reconnect_after: u64,
    /// When true the sender returns to listening after a session ends,
    /// instead of stopping.
    pub always_on: bool,
}

impl NetworkConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            wire_format: WireFormat::Framed,
            drift_reconnect_after: DEFAULT_DRIFT_THRESHOLD,
            always_on: true,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Optional substring used to pick a non-default capture device
    pub capture_device: Option<String>,
    /// Optional substring used to pick a non-default playback device,
    /// e.g. "CABLE Input" for a virtual cable
    pub playback_device: Option<String>,
    pub audio: AudioFormat,
    pub network: NetworkConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }
}
