//! Capture process spawning.
//!
//! `CameraLauncher` is the seam between the supervisor and the OS. The production
//! `CommandLauncher` runs an MJPEG encoder (rpicam-vid by default) with its
//! output on stdout; tests swap in `StubLauncher`.

use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;

use crate::error::RelayError;

/// Video orientation. `Rotated` is a 180° flip applied by the encoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Normal,
    Rotated,
}

impl Orientation {
    pub fn toggled(self) -> Self {
        match self {
            Orientation::Normal => Orientation::Rotated,
            Orientation::Rotated => Orientation::Normal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Normal => "normal",
            Orientation::Rotated => "rotated",
        }
    }
}

impl FromStr for Orientation {
    type Err = RelayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" | "0" => Ok(Orientation::Normal),
            "rotated" | "flipped" | "180" => Ok(Orientation::Rotated),
            other => Err(RelayError::InvalidCommand(format!("orientation {}", other))),
        }
    }
}

/// A running capture process.
pub trait CaptureProcess: Send {
    fn id(&self) -> u32;

    /// Hand out the encoded output stream. Returns `None` after the first call.
    fn take_output(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Ask the process to exit (SIGTERM on unix).
    fn terminate(&mut self) -> io::Result<()>;

    /// Non-blocking check; `true` once the process has exited.
    fn try_wait(&mut self) -> io::Result<bool>;

    /// Force the process down and reap it.
    fn kill(&mut self) -> io::Result<()>;
}

/// Spawns capture processes for a given orientation.
pub trait CameraLauncher: Send + Sync {
    fn launch(&self, orientation: Orientation) -> io::Result<Box<dyn CaptureProcess>>;
}

/// Command line of the capture program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Appended when the orientation is `Rotated`.
    pub rotate_args: Vec<String>,
}

impl CameraCommand {
    pub fn rpicam(width: u32, height: u32, framerate: u32) -> Self {
        let mut args: Vec<String> = ["-t", "0", "--codec", "mjpeg"]
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        args.extend([
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
            "--framerate".to_string(),
            framerate.to_string(),
        ]);
        args.extend(["--nopreview", "-o", "-"].iter().map(|arg| arg.to_string()));
        Self {
            program: "rpicam-vid".to_string(),
            args,
            rotate_args: vec!["--rotation".to_string(), "180".to_string()],
        }
    }

    pub fn args_for(&self, orientation: Orientation) -> Vec<String> {
        let mut args = self.args.clone();
        if orientation == Orientation::Rotated {
            args.extend(self.rotate_args.iter().cloned());
        }
        args
    }
}

impl Default for CameraCommand {
    fn default() -> Self {
        Self::rpicam(640, 480, 15)
    }
}

pub struct CommandLauncher {
    command: CameraCommand,
}

impl CommandLauncher {
    pub fn new(command: CameraCommand) -> Self {
        Self { command }
    }
}

impl CameraLauncher for CommandLauncher {
    fn launch(&self, orientation: Orientation) -> io::Result<Box<dyn CaptureProcess>> {
        let args = self.command.args_for(orientation);
        log::debug!("spawning {} {}", self.command.program, args.join(" "));
        let child = Command::new(&self.command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

impl CaptureProcess for ChildProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn Read + Send>)
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let pid = libc::pid_t::try_from(self.child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) with a pid we spawned and have not yet reaped.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_none() {
            self.child.kill()?;
        }
        self.child.wait()?;
        Ok(())
    }
}
