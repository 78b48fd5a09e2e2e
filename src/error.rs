//! Error taxonomy for the relay core.
//!
//! Plumbing (config loading, server startup) stays on `anyhow`. The variants here
//! are the failures callers are expected to branch on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The capture process could not be spawned (or the supervisor gave up on it).
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// No complete frame was found before the extraction buffer hit its ceiling.
    #[error("stream corrupt: discarded {discarded} bytes without an end-of-image marker")]
    StreamCorrupt { discarded: usize },

    /// The serial link is absent or a write to it failed.
    #[error("serial link unavailable: {0}")]
    SerialUnavailable(String),

    /// A single telemetry metric could not be sampled.
    #[error("{metric} unavailable: {reason}")]
    TelemetryUnavailable {
        metric: &'static str,
        reason: String,
    },

    /// Unknown direction or service name.
    #[error("invalid command '{0}'")]
    InvalidCommand(String),

    /// A service-control shell command ran but failed.
    #[error("service command failed: {0}")]
    ServiceCommand(String),
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;
