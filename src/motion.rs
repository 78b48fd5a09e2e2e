//! Serial motion bridge.
//!
//! Direction requests are validated against a fixed vocabulary and written to
//! the motor controller as newline-terminated ASCII:
//!
//! ```text
//! FORWARD 150\n   BACKWARD 150\n   LEFT 150\n   RIGHT 150\n   STOP\n
//! ```
//!
//! Missing-link policy: with no serial link attached, every command fails with
//! `SerialUnavailable`, whatever the direction. A failed write detaches the link
//! and reports the same error.

use anyhow::{Context, Result};
use std::io::Write;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{RelayError, RelayResult};

pub const SERIAL_BAUD_RATE: u32 = 9600;
pub const DEFAULT_SPEED: u8 = 150;

/// Anything the bridge can write command lines to.
pub type SerialLink = Box<dyn Write + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    pub const ALL: [Direction; 5] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
        Direction::Stop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stop => "stop",
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Direction::Forward => "FORWARD",
            Direction::Backward => "BACKWARD",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
            Direction::Stop => "STOP",
        }
    }
}

impl FromStr for Direction {
    type Err = RelayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|direction| direction.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| RelayError::InvalidCommand(value.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionCommand {
    pub direction: Direction,
    pub speed: u8,
}

impl MotionCommand {
    pub fn new(direction: Direction, speed: u8) -> Self {
        Self { direction, speed }
    }

    /// Wire form, including the trailing newline.
    pub fn encode(&self) -> String {
        match self.direction {
            Direction::Stop => "STOP\n".to_string(),
            direction => format!("{} {}\n", direction.keyword(), self.speed),
        }
    }
}

pub struct MotionBridge {
    link: Mutex<Option<SerialLink>>,
    speed: u8,
}

impl MotionBridge {
    pub fn new(link: Option<SerialLink>, speed: u8) -> Self {
        Self {
            link: Mutex::new(link),
            speed,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Replace the serial link (e.g. after reconnecting).
    pub fn attach(&self, link: SerialLink) {
        *self.lock() = Some(link);
        log::info!("serial link attached");
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Validate `direction` and send it at the configured speed.
    pub fn drive(&self, direction: &str) -> RelayResult<MotionCommand> {
        let direction: Direction = direction.parse()?;
        let command = MotionCommand::new(direction, self.speed);
        self.send(command)?;
        Ok(command)
    }

    /// Write one command line. Concurrent callers are serialized.
    pub fn send(&self, command: MotionCommand) -> RelayResult<()> {
        let line = command.encode();
        let mut link = self.lock();
        let Some(writer) = link.as_mut() else {
            return Err(RelayError::SerialUnavailable(
                "no serial link attached".to_string(),
            ));
        };
        let written = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush());
        if let Err(err) = written {
            log::warn!("serial write failed, detaching link: {}", err);
            *link = None;
            return Err(RelayError::SerialUnavailable(err.to_string()));
        }
        log::debug!("serial <- {}", line.trim_end());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<SerialLink>> {
        self.link.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Clone, Debug)]
pub struct SerialSettings {
    pub device: String,
    pub baud_rate: u32,
    /// Delay after opening; the controller resets when the port opens.
    pub settle: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: SERIAL_BAUD_RATE,
            settle: Duration::from_secs(2),
        }
    }
}

/// Open the motor controller's serial port (8N1).
pub fn open_serial(settings: &SerialSettings) -> Result<SerialLink> {
    let port = serialport::new(&settings.device, settings.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_secs(1))
        .open()
        .with_context(|| format!("failed to open serial device {}", settings.device))?;
    std::thread::sleep(settings.settle);
    Ok(Box::new(port))
}
