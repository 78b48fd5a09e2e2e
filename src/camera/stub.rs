//! In-memory capture process for tests and bench setups without a camera.
//!
//! `StubLauncher` hands out processes whose output is fed by the caller through
//! `StubLauncher::feed`. It counts live processes so callers can check that the
//! supervisor never runs two at once.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use super::launcher::{CameraLauncher, CaptureProcess, Orientation};

#[derive(Default)]
struct StubState {
    feed: Mutex<Option<Sender<Vec<u8>>>>,
    launches: Mutex<Vec<Orientation>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
    next_pid: AtomicU32,
    /// Launches allowed before every further launch fails. `usize::MAX` = unlimited.
    launch_budget: AtomicUsize,
    /// When set, `terminate` is a no-op and only `kill` ends a process.
    ignore_terminate: AtomicBool,
    kills: AtomicUsize,
}

#[derive(Clone)]
pub struct StubLauncher {
    state: Arc<StubState>,
}

impl StubLauncher {
    pub fn new() -> Self {
        let state = StubState {
            launch_budget: AtomicUsize::new(usize::MAX),
            next_pid: AtomicU32::new(1000),
            ..StubState::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Allow `count` more launches, then fail every launch after that.
    pub fn fail_after(&self, count: usize) {
        self.state.launch_budget.store(count, Ordering::SeqCst);
    }

    /// Lift any launch limit set by `fail_after`.
    pub fn allow_all(&self) {
        self.state.launch_budget.store(usize::MAX, Ordering::SeqCst);
    }

    /// Make processes behave like a capture tool that ignores SIGTERM.
    pub fn ignore_terminate(&self, ignore: bool) {
        self.state.ignore_terminate.store(ignore, Ordering::SeqCst);
    }

    /// Write bytes to the current process's output. Returns false when no
    /// process is running.
    pub fn feed(&self, bytes: &[u8]) -> bool {
        let guard = self.state.feed.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(bytes.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Simulate the current process dying on its own.
    pub fn crash(&self) {
        self.state
            .feed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
    }

    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.state.max_live.load(Ordering::SeqCst)
    }

    /// Processes that had to be force-killed.
    pub fn kills(&self) -> usize {
        self.state.kills.load(Ordering::SeqCst)
    }

    /// Orientation of every successful launch, in order.
    pub fn launches(&self) -> Vec<Orientation> {
        self.state
            .launches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl Default for StubLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraLauncher for StubLauncher {
    fn launch(&self, orientation: Orientation) -> io::Result<Box<dyn CaptureProcess>> {
        let budget = self.state.launch_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "stub camera not available",
            ));
        }
        if budget != usize::MAX {
            self.state.launch_budget.store(budget - 1, Ordering::SeqCst);
        }

        let (tx, rx) = mpsc::channel();
        *self.state.feed.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx);
        self.state
            .launches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(orientation);
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(StubProcess {
            pid: self.state.next_pid.fetch_add(1, Ordering::SeqCst),
            state: Arc::clone(&self.state),
            output: Some(StubOutput {
                rx,
                pending: Vec::new(),
            }),
            exited: AtomicBool::new(false),
        }))
    }
}

struct StubProcess {
    pid: u32,
    state: Arc<StubState>,
    output: Option<StubOutput>,
    exited: AtomicBool,
}

impl StubProcess {
    fn exit(&self) {
        if !self.exited.swap(true, Ordering::SeqCst) {
            self.state.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn shut_down(&self) {
        // Only close the feed if it still belongs to this process.
        let mut feed = self.state.feed.lock().unwrap_or_else(|p| p.into_inner());
        if !self.exited.load(Ordering::SeqCst) {
            feed.take();
        }
        drop(feed);
        self.exit();
    }

    fn feed_closed(&self) -> bool {
        self.state
            .feed
            .lock()
            .map(|feed| feed.is_none())
            .unwrap_or(true)
    }
}

impl CaptureProcess for StubProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.output
            .take()
            .map(|output| Box::new(output) as Box<dyn Read + Send>)
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.state.ignore_terminate.load(Ordering::SeqCst) {
            self.shut_down();
        }
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        if !self.exited.load(Ordering::SeqCst) && self.feed_closed() {
            self.exit();
        }
        Ok(self.exited.load(Ordering::SeqCst))
    }

    fn kill(&mut self) -> io::Result<()> {
        if !self.exited.load(Ordering::SeqCst) {
            self.state.kills.fetch_add(1, Ordering::SeqCst);
        }
        self.shut_down();
        Ok(())
    }
}

impl Drop for StubProcess {
    fn drop(&mut self) {
        self.exit();
    }
}

struct StubOutput {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for StubOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.rx.recv() {
                Ok(bytes) => self.pending = bytes,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
