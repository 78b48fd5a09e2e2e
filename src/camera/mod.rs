//! Camera process supervision.
//!
//! `CameraSupervisor` owns the one capture process, the thread that extracts
//! frames from its output, and the crash-recovery policy:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!                           |
//!                           +-> Crashed -> Starting (retry with backoff)
//!                                  |
//!                                  +-> Failed (terminal until reset/start)
//! ```
//!
//! Lifecycle operations are serialized by a lifecycle lock, and every spawn is
//! preceded by reaping the previous process, so at most one process is alive.
//! Each process gets a fresh `FrameExtractor`; nothing accumulated from an old
//! process survives a restart.

mod launcher;
pub mod stub;

pub use launcher::{CameraCommand, CameraLauncher, CaptureProcess, CommandLauncher, Orientation};
pub use stub::StubLauncher;

use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{RelayError, RelayResult};
use crate::frame::FrameBroadcaster;
use crate::ingest::{FrameExtractor, MAX_FRAME_BYTES};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
    Failed,
}

impl CameraState {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraState::Stopped => "stopped",
            CameraState::Starting => "starting",
            CameraState::Running => "running",
            CameraState::Stopping => "stopping",
            CameraState::Crashed => "crashed",
            CameraState::Failed => "failed",
        }
    }
}

/// Lifecycle notifications delivered to `subscribe_events` receivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraEvent {
    Started { pid: u32, orientation: Orientation },
    Stopped,
    Crashed { reason: String, attempt: u32 },
    Failed { reason: String },
}

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Grace period between SIGTERM and SIGKILL.
    pub stop_timeout: Duration,
    /// Automatic restarts after a crash before giving up.
    pub max_restarts: u32,
    /// First restart delay; doubles per attempt.
    pub restart_backoff: Duration,
    pub max_restart_backoff: Duration,
    /// Extraction buffer ceiling.
    pub max_frame_bytes: usize,
    pub read_chunk_bytes: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(3),
            max_restarts: 3,
            restart_backoff: Duration::from_millis(500),
            max_restart_backoff: Duration::from_secs(5),
            max_frame_bytes: MAX_FRAME_BYTES,
            read_chunk_bytes: 16 * 1024,
        }
    }
}

struct CameraProcessHandle {
    process: Box<dyn CaptureProcess>,
    orientation: Orientation,
    started_at: Instant,
}

struct Inner {
    state: CameraState,
    orientation: Orientation,
    /// Bumped on every spawn and stop; reader threads compare against it.
    generation: u64,
    handle: Option<CameraProcessHandle>,
    restarts: u32,
    last_error: Option<String>,
}

struct Shared {
    launcher: Box<dyn CameraLauncher>,
    broadcaster: Arc<FrameBroadcaster>,
    config: SupervisorConfig,
    lifecycle: Mutex<()>,
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<Sender<CameraEvent>>>,
}

/// Owner of the capture process. Create one and pass it to whoever needs it.
pub struct CameraSupervisor {
    shared: Arc<Shared>,
}

impl CameraSupervisor {
    pub fn new(
        launcher: Box<dyn CameraLauncher>,
        broadcaster: Arc<FrameBroadcaster>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                launcher,
                broadcaster,
                config,
                lifecycle: Mutex::new(()),
                inner: Mutex::new(Inner {
                    state: CameraState::Stopped,
                    orientation: Orientation::Normal,
                    generation: 0,
                    handle: None,
                    restarts: 0,
                    last_error: None,
                }),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Ensure the camera is running with `orientation`. No-op if it already is.
    pub fn start(&self, orientation: Orientation) -> RelayResult<()> {
        let _lifecycle = self.shared.lifecycle();
        {
            let inner = self.shared.inner();
            if inner.state == CameraState::Running && inner.orientation == orientation {
                return Ok(());
            }
        }
        self.shared.stop_locked();
        self.shared.inner().restarts = 0;
        self.shared.spawn_locked(orientation).map(|_| ())
    }

    /// Terminate the process (SIGTERM, bounded wait, SIGKILL) and close its stream.
    pub fn stop(&self) {
        let _lifecycle = self.shared.lifecycle();
        self.shared.stop_locked();
    }

    /// Stop, then start with `orientation`. Active viewers see a short gap.
    pub fn restart(&self, orientation: Orientation) -> RelayResult<()> {
        let _lifecycle = self.shared.lifecycle();
        log::info!("restarting camera ({})", orientation.as_str());
        self.shared.stop_locked();
        self.shared.inner().restarts = 0;
        self.shared.spawn_locked(orientation).map(|_| ())
    }

    /// Restart with the opposite orientation. Returns the new orientation.
    pub fn flip(&self) -> RelayResult<Orientation> {
        let _lifecycle = self.shared.lifecycle();
        let next = self.shared.inner().orientation.toggled();
        log::info!("flipping camera to {}", next.as_str());
        self.shared.stop_locked();
        self.shared.inner().restarts = 0;
        self.shared.spawn_locked(next)?;
        Ok(next)
    }

    /// Operator action: clear a `Failed` (or stopped) camera and start it again.
    pub fn reset(&self) -> RelayResult<()> {
        let _lifecycle = self.shared.lifecycle();
        let orientation = {
            let mut inner = self.shared.inner();
            match inner.state {
                CameraState::Failed | CameraState::Stopped => {}
                _ => return Ok(()),
            }
            inner.restarts = 0;
            inner.state = CameraState::Stopped;
            inner.orientation
        };
        log::info!("camera reset requested");
        self.shared.spawn_locked(orientation).map(|_| ())
    }

    pub fn state(&self) -> CameraState {
        self.shared.inner().state
    }

    /// True when no frames will arrive without operator action: the camera is
    /// `Failed`, or `Stopped` with no start, flip or restart in progress.
    pub fn is_down(&self) -> bool {
        let _lifecycle = match self.shared.lifecycle.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        matches!(self.state(), CameraState::Stopped | CameraState::Failed)
    }

    /// Desired orientation (the one the next or current process runs with).
    pub fn orientation(&self) -> Orientation {
        self.shared.inner().orientation
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.inner().last_error.clone()
    }

    /// How long the current process has been running, if any.
    pub fn uptime(&self) -> Option<Duration> {
        self.shared
            .inner()
            .handle
            .as_ref()
            .map(|handle| handle.started_at.elapsed())
    }

    pub fn broadcaster(&self) -> &Arc<FrameBroadcaster> {
        &self.shared.broadcaster
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe_events(&self) -> Receiver<CameraEvent> {
        let (tx, rx) = mpsc::channel();
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(tx);
        rx
    }
}

impl Drop for CameraSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn emit(&self, event: CameraEvent) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Caller holds the lifecycle lock.
    fn spawn_locked(self: &Arc<Self>, orientation: Orientation) -> RelayResult<u64> {
        let stale = self.inner().handle.take();
        if let Some(handle) = stale {
            self.shutdown_process(handle);
        }

        let generation = {
            let mut inner = self.inner();
            inner.generation += 1;
            inner.state = CameraState::Starting;
            inner.orientation = orientation;
            inner.generation
        };

        let mut process = match self.launcher.launch(orientation) {
            Ok(process) => process,
            Err(err) => {
                return Err(self.spawn_failed(format!("failed to spawn capture process: {}", err)))
            }
        };
        let pid = process.id();
        let Some(output) = process.take_output() else {
            if let Err(err) = process.kill() {
                log::warn!("failed to kill camera process {}: {}", pid, err);
            }
            return Err(self.spawn_failed("capture process has no output stream".to_string()));
        };

        {
            let mut inner = self.inner();
            inner.handle = Some(CameraProcessHandle {
                process,
                orientation,
                started_at: Instant::now(),
            });
            inner.state = CameraState::Running;
            inner.last_error = None;
        }

        let shared = Arc::clone(self);
        let reader = thread::Builder::new()
            .name(format!("camera-reader-{}", generation))
            .spawn(move || shared.pump(generation, output));
        if let Err(err) = reader {
            let handle = self.inner().handle.take();
            if let Some(handle) = handle {
                self.shutdown_process(handle);
            }
            return Err(self.spawn_failed(format!("failed to spawn reader thread: {}", err)));
        }

        log::info!("camera process {} started ({})", pid, orientation.as_str());
        self.emit(CameraEvent::Started { pid, orientation });
        Ok(generation)
    }

    fn spawn_failed(&self, reason: String) -> RelayError {
        log::error!("{}", reason);
        let mut inner = self.inner();
        inner.state = CameraState::Stopped;
        inner.last_error = Some(reason.clone());
        RelayError::CameraUnavailable(reason)
    }

    /// Caller holds the lifecycle lock.
    fn stop_locked(&self) {
        let handle = {
            let mut inner = self.inner();
            inner.generation += 1;
            let handle = inner.handle.take();
            if handle.is_some() {
                inner.state = CameraState::Stopping;
            }
            handle
        };
        let stopped = handle.is_some();
        if let Some(handle) = handle {
            self.shutdown_process(handle);
        }
        self.inner().state = CameraState::Stopped;
        if stopped {
            self.emit(CameraEvent::Stopped);
        }
    }

    fn shutdown_process(&self, mut handle: CameraProcessHandle) {
        let pid = handle.process.id();
        log::info!(
            "stopping camera process {} ({}, up {:?})",
            pid,
            handle.orientation.as_str(),
            handle.started_at.elapsed()
        );
        if let Err(err) = handle.process.terminate() {
            log::warn!("failed to signal camera process {}: {}", pid, err);
        }
        let deadline = Instant::now() + self.config.stop_timeout;
        loop {
            match handle.process.try_wait() {
                Ok(true) => return,
                Ok(false) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(20));
                }
                Ok(false) => {
                    log::warn!(
                        "camera process {} ignored SIGTERM for {:?}; killing",
                        pid,
                        self.config.stop_timeout
                    );
                    break;
                }
                Err(err) => {
                    log::warn!("failed to poll camera process {}: {}", pid, err);
                    break;
                }
            }
        }
        if let Err(err) = handle.process.kill() {
            log::warn!("failed to kill camera process {}: {}", pid, err);
        }
    }

    /// Reader thread body: extract frames until the stream ends.
    fn pump(self: Arc<Self>, generation: u64, mut output: Box<dyn Read + Send>) {
        let mut extractor = FrameExtractor::new(self.config.max_frame_bytes);
        let mut chunk = vec![0u8; self.config.read_chunk_bytes.max(1)];
        let reason = loop {
            let read = match output.read(&mut chunk) {
                Ok(0) => break "capture stream ended".to_string(),
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break format!("capture stream read failed: {}", err),
            };
            extractor.push(&chunk[..read]);
            loop {
                match extractor.next_frame() {
                    Ok(Some(jpeg)) => {
                        if !self.publish_current(generation, jpeg) {
                            log::debug!("camera reader {} superseded", generation);
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!("{}; resynchronizing", err);
                        break;
                    }
                }
            }
        };
        drop(output);
        let stats = extractor.stats();
        log::debug!(
            "camera reader {} done: {} frames, {} bytes discarded",
            generation,
            stats.frames_extracted,
            stats.bytes_discarded
        );
        self.on_stream_end(generation, reason);
    }

    /// Publish `jpeg` unless `generation` has been superseded. The state lock
    /// is held across the publish so a stop or flip cannot slip in between.
    /// A good frame after a crash refills the restart budget.
    fn publish_current(&self, generation: u64, jpeg: Vec<u8>) -> bool {
        let mut inner = self.inner();
        if inner.generation != generation {
            return false;
        }
        if inner.restarts > 0 {
            log::info!("camera recovered after {} restart(s)", inner.restarts);
            inner.restarts = 0;
        }
        self.broadcaster.publish(jpeg);
        true
    }

    fn on_stream_end(self: &Arc<Self>, generation: u64, reason: String) {
        {
            let mut inner = self.inner();
            if inner.generation != generation || inner.state != CameraState::Running {
                log::debug!("camera reader {} exited: {}", generation, reason);
                return;
            }
            inner.state = CameraState::Crashed;
            inner.last_error = Some(reason.clone());
        }
        log::warn!("camera process crashed: {}", reason);
        self.recover(generation, reason);
    }

    fn recover(self: &Arc<Self>, mut generation: u64, mut reason: String) {
        loop {
            let attempt = {
                let mut inner = self.inner();
                if inner.generation != generation || inner.state != CameraState::Crashed {
                    return;
                }
                inner.restarts += 1;
                inner.restarts
            };
            self.emit(CameraEvent::Crashed {
                reason: reason.clone(),
                attempt,
            });

            if attempt > self.config.max_restarts {
                let _lifecycle = self.lifecycle();
                let handle = {
                    let mut inner = self.inner();
                    if inner.generation != generation || inner.state != CameraState::Crashed {
                        return;
                    }
                    inner.handle.take()
                };
                if let Some(handle) = handle {
                    self.shutdown_process(handle);
                }
                let message = format!(
                    "camera failed after {} restart attempts: {}",
                    self.config.max_restarts, reason
                );
                {
                    let mut inner = self.inner();
                    inner.state = CameraState::Failed;
                    inner.last_error = Some(message.clone());
                }
                log::error!("{}", message);
                self.emit(CameraEvent::Failed { reason: message });
                return;
            }

            let delay = self.backoff(attempt);
            log::warn!(
                "restarting camera in {:?} (attempt {}/{})",
                delay,
                attempt,
                self.config.max_restarts
            );
            thread::sleep(delay);

            let _lifecycle = self.lifecycle();
            let (orientation, handle) = {
                let mut inner = self.inner();
                if inner.generation != generation || inner.state != CameraState::Crashed {
                    return;
                }
                (inner.orientation, inner.handle.take())
            };
            if let Some(handle) = handle {
                self.shutdown_process(handle);
            }
            match self.spawn_locked(orientation) {
                Ok(_) => return,
                Err(err) => {
                    let mut inner = self.inner();
                    inner.state = CameraState::Crashed;
                    generation = inner.generation;
                    reason = err.to_string();
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.config
            .restart_backoff
            .saturating_mul(factor)
            .min(self.config.max_restart_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(body);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            stop_timeout: Duration::from_millis(200),
            max_restarts: 2,
            restart_backoff: Duration::from_millis(10),
            max_restart_backoff: Duration::from_millis(40),
            ..SupervisorConfig::default()
        }
    }

    fn supervisor(launcher: &StubLauncher) -> CameraSupervisor {
        CameraSupervisor::new(
            Box::new(launcher.clone()),
            Arc::new(FrameBroadcaster::new()),
            test_config(),
        )
    }

    #[test]
    fn frames_flow_from_process_to_subscribers() {
        let launcher = StubLauncher::new();
        let camera = supervisor(&launcher);
        let mut sub = camera.broadcaster().subscribe();

        camera.start(Orientation::Normal).unwrap();
        assert_eq!(camera.state(), CameraState::Running);

        let frame = jpeg(b"hello");
        assert!(launcher.feed(&frame[..3]));
        assert!(launcher.feed(&frame[3..]));
        let got = sub.next_timeout(Duration::from_secs(2)).expect("frame");
        assert_eq!(got.jpeg(), frame.as_slice());
        assert_eq!(got.sequence(), 1);
    }

    #[test]
    fn flipping_twice_restores_orientation_with_one_process() {
        let launcher = StubLauncher::new();
        let camera = supervisor(&launcher);
        camera.start(Orientation::Normal).unwrap();

        assert_eq!(camera.flip().unwrap(), Orientation::Rotated);
        assert_eq!(launcher.live(), 1);
        assert_eq!(camera.flip().unwrap(), Orientation::Normal);
        assert_eq!(launcher.live(), 1);

        assert_eq!(camera.orientation(), Orientation::Normal);
        assert_eq!(camera.state(), CameraState::Running);
        assert_eq!(
            launcher.launches(),
            vec![Orientation::Normal, Orientation::Rotated, Orientation::Normal]
        );
        assert_eq!(launcher.max_live(), 1);

        camera.stop();
        assert_eq!(launcher.live(), 0);
        assert_eq!(camera.state(), CameraState::Stopped);
    }

    #[test]
    fn start_is_idempotent_for_same_orientation() {
        let launcher = StubLauncher::new();
        let camera = supervisor(&launcher);
        camera.start(Orientation::Rotated).unwrap();
        camera.start(Orientation::Rotated).unwrap();
        assert_eq!(launcher.launches().len(), 1);
        camera.start(Orientation::Normal).unwrap();
        assert_eq!(launcher.launches().len(), 2);
        assert_eq!(launcher.max_live(), 1);
    }

    #[test]
    fn spawn_failure_is_camera_unavailable() {
        let launcher = StubLauncher::new();
        launcher.fail_after(0);
        let camera = supervisor(&launcher);
        let err = camera.start(Orientation::Normal).unwrap_err();
        assert!(matches!(err, RelayError::CameraUnavailable(_)));
        assert_eq!(camera.state(), CameraState::Stopped);
        assert!(camera.last_error().is_some());
    }

    #[test]
    fn restart_discards_partial_frame() {
        let launcher = StubLauncher::new();
        let camera = supervisor(&launcher);
        let mut sub = camera.broadcaster().subscribe();
        camera.start(Orientation::Normal).unwrap();

        assert!(launcher.feed(&[0xFF, 0xD8, 0x01, 0x02]));
        camera.restart(Orientation::Normal).unwrap();

        let fresh = jpeg(b"fresh");
        let mut tail = vec![0x03, 0xFF, 0xD9];
        tail.extend_from_slice(&fresh);
        assert!(launcher.feed(&tail));

        let got = sub.next_timeout(Duration::from_secs(2)).expect("frame");
        assert_eq!(got.jpeg(), fresh.as_slice());
        assert_eq!(got.sequence(), 1);
    }

    #[test]
    fn crash_is_restarted_automatically() {
        let launcher = StubLauncher::new();
        let camera = supervisor(&launcher);
        let events = camera.subscribe_events();
        camera.start(Orientation::Rotated).unwrap();

        launcher.crash();
        let received: Vec<CameraEvent> = (0..3)
            .map(|_| events.recv_timeout(Duration::from_secs(5)).expect("event"))
            .collect();
        assert!(matches!(received[0], CameraEvent::Started { .. }));
        assert!(matches!(received[1], CameraEvent::Crashed { attempt: 1, .. }));
        assert!(matches!(
            received[2],
            CameraEvent::Started {
                orientation: Orientation::Rotated,
                ..
            }
        ));
        assert_eq!(camera.state(), CameraState::Running);
        assert_eq!(launcher.launches().len(), 2);
        assert_eq!(launcher.max_live(), 1);
    }

    #[test]
    fn exhausted_restarts_fail_until_reset() {
        let launcher = StubLauncher::new();
        launcher.fail_after(1);
        let camera = supervisor(&launcher);
        let events = camera.subscribe_events();
        camera.start(Orientation::Normal).unwrap();

        launcher.crash();
        let mut crashes = 0;
        loop {
            match events.recv_timeout(Duration::from_secs(5)).expect("event") {
                CameraEvent::Crashed { .. } => crashes += 1,
                CameraEvent::Failed { .. } => break,
                _ => {}
            }
        }
        assert_eq!(crashes, 3);
        assert_eq!(camera.state(), CameraState::Failed);
        assert!(camera.last_error().unwrap().contains("restart attempts"));

        // Stays failed; no background retries.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(camera.state(), CameraState::Failed);
        assert_eq!(launcher.live(), 0);

        launcher.allow_all();
        camera.reset().unwrap();
        assert_eq!(camera.state(), CameraState::Running);
        assert_eq!(launcher.live(), 1);
    }

    #[test]
    fn stop_kills_process_that_ignores_terminate() {
        let launcher = StubLauncher::new();
        let camera = supervisor(&launcher);
        camera.start(Orientation::Normal).unwrap();
        launcher.ignore_terminate(true);

        let begun = Instant::now();
        camera.stop();
        let elapsed = begun.elapsed();

        assert!(elapsed >= Duration::from_millis(200), "stopped after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "stopped after {:?}", elapsed);
        assert_eq!(launcher.kills(), 1);
        assert_eq!(launcher.live(), 0);
        assert_eq!(camera.state(), CameraState::Stopped);
    }

    #[test]
    fn oversized_frame_is_dropped_and_next_frame_published() {
        let launcher = StubLauncher::new();
        let camera = CameraSupervisor::new(
            Box::new(launcher.clone()),
            Arc::new(FrameBroadcaster::new()),
            SupervisorConfig {
                max_frame_bytes: 1024,
                ..test_config()
            },
        );
        let mut sub = camera.broadcaster().subscribe();
        camera.start(Orientation::Normal).unwrap();

        let first = jpeg(b"first");
        assert!(launcher.feed(&first));
        let got = sub.next_timeout(Duration::from_secs(2)).expect("first frame");
        assert_eq!(got.sequence(), 1);

        let mut runaway = vec![0xFF, 0xD8];
        runaway.resize(4096, 0x42);
        assert!(launcher.feed(&runaway));
        let good = jpeg(b"good");
        assert!(launcher.feed(&good));

        let got = sub.next_timeout(Duration::from_secs(2)).expect("good frame");
        assert_eq!(got.jpeg(), good.as_slice());
        assert_eq!(got.sequence(), 2);
        assert_eq!(camera.state(), CameraState::Running);
        assert_eq!(launcher.launches().len(), 1);
    }

    #[test]
    fn superseded_generation_cannot_publish() {
        let launcher = StubLauncher::new();
        let camera = supervisor(&launcher);
        camera.start(Orientation::Normal).unwrap();
        let stale = camera.shared.inner().generation;

        camera.flip().unwrap();
        assert!(!camera.shared.publish_current(stale, jpeg(b"stale")));
        assert_eq!(camera.broadcaster().sequence(), 0);

        let current = camera.shared.inner().generation;
        assert!(camera.shared.publish_current(current, jpeg(b"fresh")));
        assert_eq!(camera.broadcaster().sequence(), 1);
    }

    #[test]
    fn down_only_when_stopped_or_failed() {
        let launcher = StubLauncher::new();
        let camera = supervisor(&launcher);
        assert!(camera.is_down());

        camera.start(Orientation::Normal).unwrap();
        assert!(!camera.is_down());

        launcher.fail_after(0);
        assert!(camera.flip().is_err());
        assert_eq!(camera.state(), CameraState::Stopped);
        assert!(camera.is_down());

        launcher.allow_all();
        camera.reset().unwrap();
        assert!(!camera.is_down());
    }
}
