//! Frame handoff between the extractor and HTTP viewers.
//!
//! - `Frame`: one immutable JPEG image with its sequence number.
//! - `FrameBroadcaster`: single-slot holder for the latest frame.
//! - `FrameSubscriber`: per-viewer cursor over the broadcaster.
//! - `Frames`: iterator over a subscriber that ends on a caller-supplied condition.
//!
//! Backpressure policy is latest-frame-wins. The broadcaster keeps exactly one
//! frame; publishing replaces it. There is no per-viewer queue, so a slow viewer
//! skips frames instead of slowing the extractor or other viewers.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

// ----------------------------------------------------------------------------
// Frame: immutable encoded image
// ----------------------------------------------------------------------------

/// One extracted JPEG image. Never mutated after publication.
#[derive(Debug)]
pub struct Frame {
    sequence: u64,
    jpeg: Vec<u8>,
    captured_at: SystemTime,
}

impl Frame {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Wall-clock time at which the extractor completed this frame.
    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }
}

// ----------------------------------------------------------------------------
// FrameBroadcaster: latest-frame-wins slot
// ----------------------------------------------------------------------------

struct Slot {
    latest: Option<Arc<Frame>>,
    sequence: u64,
}

/// Holds the most recent frame and the sequence counter.
///
/// Sequence numbers start at 1, increase by exactly one per published frame and
/// keep counting across camera restarts. The lock is only held to swap the
/// `Arc`; frame bytes are never copied under it.
pub struct FrameBroadcaster {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl FrameBroadcaster {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                latest: None,
                sequence: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Publish a new frame, replacing the previous one. Returns its sequence.
    pub fn publish(&self, jpeg: Vec<u8>) -> u64 {
        let sequence = {
            let mut slot = self.lock();
            slot.sequence += 1;
            slot.latest = Some(Arc::new(Frame {
                sequence: slot.sequence,
                jpeg,
                captured_at: SystemTime::now(),
            }));
            slot.sequence
        };
        self.changed.notify_all();
        log::trace!("published frame #{}", sequence);
        sequence
    }

    /// Latest frame, if any has been published.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.lock().latest.clone()
    }

    /// Sequence number of the latest frame (0 before the first frame).
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    /// Block until a frame newer than `after` exists or `timeout` elapses.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<Arc<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if slot.sequence > after {
                return slot.latest.clone();
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = match self.changed.wait_timeout(slot, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Attach a new viewer. The cursor starts before the current frame, so the
    /// first pull returns whatever is latest.
    pub fn subscribe(self: &Arc<Self>) -> FrameSubscriber {
        FrameSubscriber {
            broadcaster: Arc::clone(self),
            last_seen: 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot holds no invariant a panicking publisher could break.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FrameBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// FrameSubscriber: per-connection cursor
// ----------------------------------------------------------------------------

/// Pull-based view of the broadcaster for a single viewer.
///
/// Dropping the subscriber detaches it; the broadcaster keeps no registry.
pub struct FrameSubscriber {
    broadcaster: Arc<FrameBroadcaster>,
    last_seen: u64,
}

impl FrameSubscriber {
    /// Wait up to `timeout` for a frame newer than the last one returned.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Arc<Frame>> {
        let frame = self.broadcaster.wait_newer(self.last_seen, timeout)?;
        self.last_seen = frame.sequence();
        Some(frame)
    }

    /// Sequence of the last frame handed to this subscriber.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

impl FrameSubscriber {
    /// Turn the cursor into an iterator. Each `next` waits in `poll` slices and
    /// yields the newest frame; it returns `None` once `done` reports true.
    /// `done` is checked before every wait, so a busy stream still ends promptly.
    pub fn frames<F>(self, poll: Duration, done: F) -> Frames<F>
    where
        F: FnMut() -> bool,
    {
        Frames {
            subscriber: self,
            poll,
            done,
        }
    }
}

/// Blocking iterator returned by `FrameSubscriber::frames`.
pub struct Frames<F> {
    subscriber: FrameSubscriber,
    poll: Duration,
    done: F,
}

impl<F> Frames<F> {
    pub fn last_seen(&self) -> u64 {
        self.subscriber.last_seen()
    }
}

impl<F: FnMut() -> bool> Iterator for Frames<F> {
    type Item = Arc<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if (self.done)() {
                return None;
            }
            if let Some(frame) = self.subscriber.next_timeout(self.poll) {
                return Some(frame);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
