use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::camera::{CameraCommand, Orientation, SupervisorConfig};
use crate::motion::{SerialSettings, DEFAULT_SPEED, SERIAL_BAUD_RATE};
use crate::telemetry::TelemetryConfig;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyUSB0";
const DEFAULT_SERIAL_SETTLE_MS: u64 = 2000;
const DEFAULT_CAMERA_PROGRAM: &str = "rpicam-vid";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 15;
const DEFAULT_SERVICE: &str = "rover";

#[derive(Debug, Deserialize, Default)]
struct RoverConfigFile {
    http_addr: Option<String>,
    camera: Option<CameraConfigFile>,
    serial: Option<SerialConfigFile>,
    motor_speed: Option<u8>,
    services: Option<Vec<String>>,
    supervisor: Option<SupervisorConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    program: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    framerate: Option<u32>,
    orientation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SerialConfigFile {
    device: Option<String>,
    baud_rate: Option<u32>,
    settle_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SupervisorConfigFile {
    stop_timeout_ms: Option<u64>,
    max_restarts: Option<u32>,
    restart_backoff_ms: Option<u64>,
    max_restart_backoff_ms: Option<u64>,
    max_frame_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    sample_interval_ms: Option<u64>,
    temperature_command: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RoverConfig {
    pub http_addr: String,
    pub camera: CameraSettings,
    pub serial: SerialSettings,
    pub motor_speed: u8,
    pub services: Vec<String>,
    pub supervisor: SupervisorConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub program: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub orientation: Orientation,
}

impl CameraSettings {
    pub fn command(&self) -> CameraCommand {
        CameraCommand {
            program: self.program.clone(),
            ..CameraCommand::rpicam(self.width, self.height, self.framerate)
        }
    }
}

impl RoverConfig {
    /// Load from the file named by `ROVER_CONFIG` (if set), then the environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROVER_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RoverConfigFile) -> Result<Self> {
        let http_addr = file
            .http_addr
            .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());

        let camera_file = file.camera.unwrap_or_default();
        let orientation = match camera_file.orientation.as_deref() {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("camera.orientation must be 'normal' or 'rotated'"))?,
            None => Orientation::default(),
        };
        let camera = CameraSettings {
            program: camera_file
                .program
                .unwrap_or_else(|| DEFAULT_CAMERA_PROGRAM.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            framerate: camera_file.framerate.unwrap_or(DEFAULT_CAMERA_FPS),
            orientation,
        };

        let serial_file = file.serial.unwrap_or_default();
        let serial = SerialSettings {
            device: serial_file
                .device
                .unwrap_or_else(|| DEFAULT_SERIAL_DEVICE.to_string()),
            baud_rate: serial_file.baud_rate.unwrap_or(SERIAL_BAUD_RATE),
            settle: Duration::from_millis(serial_file.settle_ms.unwrap_or(DEFAULT_SERIAL_SETTLE_MS)),
        };

        let defaults = SupervisorConfig::default();
        let supervisor_file = file.supervisor.unwrap_or_default();
        let supervisor = SupervisorConfig {
            stop_timeout: supervisor_file
                .stop_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stop_timeout),
            max_restarts: supervisor_file.max_restarts.unwrap_or(defaults.max_restarts),
            restart_backoff: supervisor_file
                .restart_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.restart_backoff),
            max_restart_backoff: supervisor_file
                .max_restart_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_restart_backoff),
            max_frame_bytes: supervisor_file
                .max_frame_bytes
                .unwrap_or(defaults.max_frame_bytes),
            ..defaults
        };

        let telemetry_defaults = TelemetryConfig::default();
        let telemetry_file = file.telemetry.unwrap_or_default();
        let telemetry = TelemetryConfig {
            sample_interval: telemetry_file
                .sample_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(telemetry_defaults.sample_interval),
            temperature_command: telemetry_file
                .temperature_command
                .unwrap_or(telemetry_defaults.temperature_command),
        };

        Ok(Self {
            http_addr,
            camera,
            serial,
            motor_speed: file.motor_speed.unwrap_or(DEFAULT_SPEED),
            services: file
                .services
                .unwrap_or_else(|| vec![DEFAULT_SERVICE.to_string()]),
            supervisor,
            telemetry,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("ROVER_HTTP_ADDR") {
            if !addr.trim().is_empty() {
                self.http_addr = addr;
            }
        }
        if let Ok(device) = std::env::var("ROVER_SERIAL_DEVICE") {
            if !device.trim().is_empty() {
                self.serial.device = device;
            }
        }
        if let Ok(program) = std::env::var("ROVER_CAMERA_PROGRAM") {
            if !program.trim().is_empty() {
                self.camera.program = program;
            }
        }
        if let Ok(orientation) = std::env::var("ROVER_ORIENTATION") {
            self.camera.orientation = orientation
                .parse()
                .map_err(|_| anyhow!("ROVER_ORIENTATION must be 'normal' or 'rotated'"))?;
        }
        if let Ok(speed) = std::env::var("ROVER_MOTOR_SPEED") {
            self.motor_speed = speed
                .trim()
                .parse()
                .map_err(|_| anyhow!("ROVER_MOTOR_SPEED must be an integer between 0 and 255"))?;
        }
        if let Ok(services) = std::env::var("ROVER_SERVICES") {
            let parsed = split_csv(&services);
            if !parsed.is_empty() {
                self.services = parsed;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.http_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|e| anyhow!("invalid http_addr '{}': {}", self.http_addr, e))?;
        if self.camera.width == 0 || self.camera.height == 0 || self.camera.framerate == 0 {
            return Err(anyhow!("camera width, height and framerate must be non-zero"));
        }
        if self.serial.baud_rate == 0 {
            return Err(anyhow!("serial baud_rate must be non-zero"));
        }
        if self.supervisor.max_frame_bytes < 1024 {
            return Err(anyhow!("supervisor max_frame_bytes must be at least 1024"));
        }
        if self.telemetry.temperature_command.is_empty() {
            return Err(anyhow!("telemetry temperature_command must not be empty"));
        }
        for service in &self.services {
            if !is_unit_name(service) {
                return Err(anyhow!("invalid service name '{}'", service));
            }
        }
        self.services.sort();
        self.services.dedup();
        Ok(())
    }
}

/// systemd unit names: letters, digits and `:-_.@`.
fn is_unit_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.' | '@'))
}

fn read_config_file(path: &Path) -> Result<RoverConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
