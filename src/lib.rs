//! Rover relay core.
//!
//! Relays the MJPEG output of a single camera process to any number of HTTP
//! viewers and forwards drive commands to a motor controller over serial.
//!
//! # Architecture
//!
//! - `camera`: supervision of the one capture process (start, stop, flip,
//!   crash recovery)
//! - `ingest`: MJPEG byte stream to discrete JPEG frames
//! - `frame`: latest-frame-wins broadcaster and per-viewer subscribers
//! - `motion`: direction commands to the serial line protocol
//! - `telemetry`: CPU and temperature sampling with per-metric degradation
//! - `service`: allowlisted systemd restarts
//! - `api`: the HTTP surface
//! - `config`: file and environment configuration for `roverd`
//!
//! Frames only ever flow one way: process stdout, extractor, broadcaster,
//! viewers. Viewers never slow the capture side down; a slow viewer skips
//! frames instead.

pub mod api;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod service;
pub mod telemetry;

pub use camera::{
    CameraCommand, CameraEvent, CameraLauncher, CameraState, CameraSupervisor, CaptureProcess,
    CommandLauncher, Orientation, StubLauncher, SupervisorConfig,
};
pub use error::{RelayError, RelayResult};
pub use frame::{Frame, FrameBroadcaster, FrameSubscriber, Frames};
pub use ingest::FrameExtractor;
pub use motion::{Direction, MotionBridge, MotionCommand, SerialLink, SerialSettings};
pub use service::ServiceControl;
pub use telemetry::{HostProbe, SystemProbe, SystemStats, Telemetry, TelemetrySampler};
