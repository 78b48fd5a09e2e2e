//! Frame ingestion.
//!
//! The capture process writes raw MJPEG to a pipe. This layer turns that byte
//! stream into discrete JPEG frames. It is responsible for:
//! - Reassembling frames across arbitrary read boundaries
//! - Bounding memory when the stream is corrupt
//!
//! The ingestion layer MUST NOT:
//! - Decode or re-encode images
//! - Store frames to disk
//! - Log frame content

pub mod mjpeg;

pub use mjpeg::{ExtractorStats, FrameExtractor, MAX_FRAME_BYTES};
