//! Error types for the audio relay

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors establishing a session
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Bind to {addr} failed: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(std::io::Error),

    #[error("Connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
}

/// Errors during steady-state transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Socket read failed: {0}")]
    Read(std::io::Error),

    #[error("Socket write failed: {0}")]
    Write(std::io::Error),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(u64),
}

/// Capture/playback device errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Device stream closed")]
    Closed,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
