//! MJPEG frame extraction.
//!
//! The capture process writes a bare concatenation of JPEG images. `FrameExtractor`
//! splits that byte stream on the SOI/EOI markers. Chunks may be any size; markers
//! that straddle two chunks are found because every scan runs over the
//! accumulated buffer.
//!
//! The extractor MUST NOT grow without bound: a partial frame that passes
//! `max_frame_bytes` without an EOI is dropped and reported as `StreamCorrupt`.
//! The ceiling is checked in `next_frame`, so between a `push` and the following
//! `next_frame` the buffer may exceed it by at most the size of that one chunk.
//! Callers read with a fixed chunk size, which bounds the total.

use crate::error::{RelayError, RelayResult};

/// Default ceiling for a single partial frame.
pub const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

pub struct FrameExtractor {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    /// Where the next EOI scan resumes. Only meaningful while `buffer` starts at SOI.
    eoi_scan_from: usize,
    frames: u64,
    discarded_bytes: u64,
}

impl FrameExtractor {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            max_frame_bytes,
            eoi_scan_from: 0,
            frames: 0,
            discarded_bytes: 0,
        }
    }

    /// Append a raw chunk from the capture stream.
    ///
    /// Drain with `next_frame` after every push; the ceiling is only enforced
    /// there, so pushing again first lets the buffer grow past it.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pull the next complete frame out of the buffer.
    ///
    /// Call repeatedly after each `push` until it returns `Ok(None)`. An
    /// `Err(StreamCorrupt)` means the buffer was discarded; extraction continues
    /// with the next pushed chunk.
    pub fn next_frame(&mut self) -> RelayResult<Option<Vec<u8>>> {
        match find_marker(&self.buffer, SOI, 0) {
            Some(0) => {}
            Some(start) => {
                self.discard_prefix(start);
            }
            None => {
                // A trailing 0xFF may be the first half of the next SOI.
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                self.discard_prefix(self.buffer.len() - keep);
                return Ok(None);
            }
        }

        let from = self.eoi_scan_from.max(SOI.len());
        if let Some(end) = find_marker(&self.buffer, EOI, from) {
            let frame: Vec<u8> = self.buffer.drain(..end + EOI.len()).collect();
            self.eoi_scan_from = 0;
            self.frames += 1;
            return Ok(Some(frame));
        }

        if self.buffer.len() > self.max_frame_bytes {
            let discarded = self.buffer.len();
            self.reset();
            self.discarded_bytes += discarded as u64;
            return Err(RelayError::StreamCorrupt { discarded });
        }
        // Everything before the last byte has been checked for an EOI.
        self.eoi_scan_from = self.buffer.len().saturating_sub(1);
        Ok(None)
    }

    /// Drop any partially accumulated frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.eoi_scan_from = 0;
    }

    /// Bytes currently held waiting for an end marker.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> ExtractorStats {
        ExtractorStats {
            frames_extracted: self.frames,
            bytes_discarded: self.discarded_bytes,
        }
    }

    fn discard_prefix(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.buffer.drain(..len);
        self.discarded_bytes += len as u64;
        self.eoi_scan_from = 0;
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(MAX_FRAME_BYTES)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractorStats {
    pub frames_extracted: u64,
    pub bytes_discarded: u64,
}

fn find_marker(buffer: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if buffer.len() < from + 2 {
        return None;
    }
    buffer[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}
