//! The error taxonomy shared across the control loops.
//!
//! A single [`ControlError`] enum spans the library seams: configuration
//! parsing, hardware bring-up, disk preflight, capture retries, tracking
//! loss and the `std::io` errors raised while writing run artifacts.

use thiserror::Error;

/// Errors surfaced by the mount tracker control stack.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A recorder subprocess failed its health check on the given attempt.
    #[error("transient capture failure on attempt {attempt}")]
    TransientCapture { attempt: u32 },

    /// Hardware could not be brought up.
    #[error("hardware init failed: {0}")]
    HardwareInit(String),

    /// Not enough free space remains to record the next segment.
    #[error("disk space exhausted: need {required} bytes, {available} available")]
    DiskSpaceExhausted { required: u64, available: u64 },

    /// The guidance engine lost the target for too many ticks.
    #[error("tracking lost for {ticks} ticks")]
    TrackingLost { ticks: u32 },

    /// The settings file did not parse.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// An underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
