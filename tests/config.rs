use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use rover_relay::config::RoverConfig;
use rover_relay::Orientation;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ROVER_CONFIG",
        "ROVER_HTTP_ADDR",
        "ROVER_SERIAL_DEVICE",
        "ROVER_CAMERA_PROGRAM",
        "ROVER_ORIENTATION",
        "ROVER_MOTOR_SPEED",
        "ROVER_SERVICES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RoverConfig::load().expect("load config");

    assert_eq!(cfg.http_addr, "0.0.0.0:5000");
    assert_eq!(cfg.serial.device, "/dev/ttyUSB0");
    assert_eq!(cfg.serial.baud_rate, 9600);
    assert_eq!(cfg.serial.settle, Duration::from_secs(2));
    assert_eq!(cfg.motor_speed, 150);
    assert_eq!(cfg.services, vec!["rover"]);
    assert_eq!(cfg.camera.orientation, Orientation::Normal);

    let command = cfg.camera.command();
    assert_eq!(command.program, "rpicam-vid");
    assert_eq!(
        command.args_for(Orientation::Rotated).join(" "),
        "-t 0 --codec mjpeg --width 640 --height 480 --framerate 15 --nopreview -o - --rotation 180"
    );
    assert_eq!(cfg.supervisor.max_restarts, 3);
    assert_eq!(cfg.supervisor.stop_timeout, Duration::from_secs(3));
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "http_addr": "127.0.0.1:8080",
        "camera": {
            "program": "libcamera-vid",
            "width": 1280,
            "height": 720,
            "framerate": 30,
            "orientation": "rotated"
        },
        "serial": {
            "device": "/dev/ttyACM0",
            "baud_rate": 115200,
            "settle_ms": 0
        },
        "motor_speed": 200,
        "services": ["rover", "camera-watchdog"],
        "supervisor": {
            "stop_timeout_ms": 1500,
            "max_restarts": 5,
            "restart_backoff_ms": 250
        },
        "telemetry": {
            "sample_interval_ms": 50
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ROVER_CONFIG", file.path());
    std::env::set_var("ROVER_SERIAL_DEVICE", "/dev/ttyUSB1");
    std::env::set_var("ROVER_MOTOR_SPEED", "120");

    let cfg = RoverConfig::load().expect("load config");

    assert_eq!(cfg.http_addr, "127.0.0.1:8080");
    assert_eq!(cfg.camera.program, "libcamera-vid");
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.framerate, 30);
    assert_eq!(cfg.camera.orientation, Orientation::Rotated);
    assert_eq!(cfg.serial.device, "/dev/ttyUSB1");
    assert_eq!(cfg.serial.baud_rate, 115200);
    assert_eq!(cfg.serial.settle, Duration::ZERO);
    assert_eq!(cfg.motor_speed, 120);
    assert_eq!(cfg.services, vec!["camera-watchdog", "rover"]);
    assert_eq!(cfg.supervisor.stop_timeout, Duration::from_millis(1500));
    assert_eq!(cfg.supervisor.max_restarts, 5);
    assert_eq!(cfg.supervisor.restart_backoff, Duration::from_millis(250));
    assert_eq!(cfg.telemetry.sample_interval, Duration::from_millis(50));

    clear_env();
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ROVER_MOTOR_SPEED", "fast");
    assert!(RoverConfig::load().is_err());
    clear_env();

    std::env::set_var("ROVER_ORIENTATION", "sideways");
    assert!(RoverConfig::load().is_err());
    clear_env();

    std::env::set_var("ROVER_HTTP_ADDR", "not-an-address");
    assert!(RoverConfig::load().is_err());
    clear_env();

    std::env::set_var("ROVER_SERVICES", "rover,ssh; reboot");
    assert!(RoverConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_unreadable_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    std::env::set_var("ROVER_CONFIG", file.path());
    let err = RoverConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    std::env::set_var("ROVER_CONFIG", "/nonexistent/rover.json");
    assert!(RoverConfig::load().is_err());
    clear_env();
}
