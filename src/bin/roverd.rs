//! roverd - rover video relay and motion daemon
//!
//! This daemon:
//! 1. Supervises the camera process and relays its MJPEG frames to viewers
//! 2. Forwards drive commands to the motor controller over serial
//! 3. Serves the control page, telemetry and service restarts over HTTP

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use rover_relay::{
    api::{ApiConfig, ApiServer, RoverState},
    camera::{CameraEvent, CameraState},
    config::RoverConfig,
    motion::open_serial,
    CameraSupervisor, CommandLauncher, FrameBroadcaster, MotionBridge, Orientation,
    ServiceControl, SystemProbe, TelemetrySampler,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay the rover camera and drive commands over HTTP")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "ROVER_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    http_addr: Option<String>,

    /// Serial device of the motor controller (overrides config).
    #[arg(long)]
    serial_device: Option<String>,

    /// Run without a motor controller; every move request answers 503.
    #[arg(long)]
    no_serial: bool,

    /// Initial camera orientation: normal or rotated (overrides config).
    #[arg(long)]
    orientation: Option<Orientation>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = RoverConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.http_addr = addr;
    }
    if let Some(device) = args.serial_device {
        config.serial.device = device;
    }
    if let Some(orientation) = args.orientation {
        config.camera.orientation = orientation;
    }

    let link = if args.no_serial {
        log::warn!("serial disabled; move requests will fail");
        None
    } else {
        match open_serial(&config.serial) {
            Ok(link) => {
                log::info!(
                    "serial link open on {} at {} baud",
                    config.serial.device,
                    config.serial.baud_rate
                );
                Some(link)
            }
            Err(err) => {
                log::warn!("{:#}; move requests will fail until restart", err);
                None
            }
        }
    };
    let motion = Arc::new(MotionBridge::new(link, config.motor_speed));

    let broadcaster = Arc::new(FrameBroadcaster::new());
    let camera = Arc::new(CameraSupervisor::new(
        Box::new(CommandLauncher::new(config.camera.command())),
        broadcaster,
        config.supervisor.clone(),
    ));
    let events = camera.subscribe_events();
    std::thread::Builder::new()
        .name("camera-events".to_string())
        .spawn(move || log_camera_events(events))
        .context("failed to spawn camera event logger")?;
    if let Err(err) = camera.start(config.camera.orientation) {
        // The HTTP surface still comes up; /camera/reset retries.
        log::error!("camera did not start: {}", err);
    }

    let probe = Arc::new(SystemProbe);
    let state = RoverState {
        camera: Arc::clone(&camera),
        motion,
        telemetry: Arc::new(TelemetrySampler::new(probe.clone(), config.telemetry.clone())),
        services: Arc::new(ServiceControl::new(probe, config.services.clone())),
    };
    let api_config = ApiConfig {
        addr: config.http_addr.clone(),
        ..ApiConfig::default()
    };
    let api_handle = ApiServer::new(api_config, state).spawn()?;
    log::info!(
        "roverd running. camera {} ({}), http on {}",
        camera.state().as_str(),
        camera.orientation().as_str(),
        api_handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    log::info!("roverd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    api_handle.stop()?;
    camera.stop();
    if camera.state() != CameraState::Stopped {
        log::warn!("camera left in state {}", camera.state().as_str());
    }
    Ok(())
}

fn log_camera_events(events: mpsc::Receiver<CameraEvent>) {
    for event in events {
        match event {
            CameraEvent::Started { pid, orientation } => {
                log::info!("camera process {} started ({})", pid, orientation.as_str())
            }
            CameraEvent::Stopped => log::info!("camera stopped"),
            CameraEvent::Crashed { reason, attempt } => {
                log::warn!("camera crashed (attempt {}): {}", attempt, reason)
            }
            CameraEvent::Failed { reason } => {
                log::error!("camera failed, reset required: {}", reason)
            }
        }
    }
}
