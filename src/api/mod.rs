//! HTTP surface: control page, MJPEG stream, motion, telemetry and service control.
//!
//! One accept loop, one thread per connection. `/video_feed` connections stay
//! open and pull from their own `FrameSubscriber`, so a slow viewer only ever
//! skips frames; it never delays the capture side or other viewers.

use anyhow::{anyhow, Result};
use serde_json::json;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::camera::{CameraState, CameraSupervisor};
use crate::error::RelayError;
use crate::motion::MotionBridge;
use crate::service::ServiceControl;
use crate::telemetry::TelemetrySampler;

const MAX_REQUEST_BYTES: usize = 8192;
const BOUNDARY: &str = "frame";
const INDEX_HTML: &str = include_str!("index.html");

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// How long a stream waits for a new frame before rechecking camera state.
    pub stream_poll: Duration,
    /// Write timeout for stream clients; a stalled viewer is dropped after it.
    pub stream_write_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
            stream_poll: Duration::from_secs(1),
            stream_write_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything the handlers talk to. Built once in `main`.
#[derive(Clone)]
pub struct RoverState {
    pub camera: Arc<CameraSupervisor>,
    pub motion: Arc<MotionBridge>,
    pub telemetry: Arc<TelemetrySampler>,
    pub services: Arc<ServiceControl>,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join().map_err(|_| anyhow!("http server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: RoverState,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: RoverState) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let ApiServer { cfg, state } = self;
        let configured_addr: SocketAddr = cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("http-accept".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, cfg, state, shutdown_thread) {
                    log::error!("http server stopped: {}", err);
                }
            })?;
        log::info!("http server listening on {}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    state: RoverState,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let cfg = Arc::new(cfg);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = Arc::clone(&cfg);
                let state = state.clone();
                let shutdown = Arc::clone(&shutdown);
                let spawned = std::thread::Builder::new()
                    .name("http-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &cfg, &state, &shutdown) {
                            log::warn!("request from {} failed: {}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("failed to spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Index,
    VideoFeed,
    Move(&'a str),
    Flip,
    SystemStats,
    Health,
    CameraReset,
    RestartService(&'a str),
    ServiceStatus(&'a str),
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        let route = match path {
            "/" => Route::Index,
            "/video_feed" => Route::VideoFeed,
            "/flip" => Route::Flip,
            "/system_stats" => Route::SystemStats,
            "/health" => Route::Health,
            "/camera/reset" => Route::CameraReset,
            _ => {
                if let Some(direction) = path.strip_prefix("/move/") {
                    Route::Move(direction)
                } else if let Some(service) = path.strip_prefix("/restart/") {
                    Route::RestartService(service)
                } else if let Some(service) = path.strip_prefix("/status/") {
                    Route::ServiceStatus(service)
                } else {
                    return None;
                }
            }
        };
        match route {
            Route::Move(segment) | Route::RestartService(segment) | Route::ServiceStatus(segment)
                if segment.is_empty() || segment.contains('/') =>
            {
                None
            }
            route => Some(route),
        }
    }

    fn method(&self) -> &'static str {
        match self {
            Route::Index
            | Route::VideoFeed
            | Route::SystemStats
            | Route::Health
            | Route::ServiceStatus(_) => "GET",
            Route::Move(_) | Route::Flip | Route::CameraReset | Route::RestartService(_) => {
                "POST"
            }
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    state: &RoverState,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    let route = match Route::parse(&request.path) {
        Some(route) => route,
        None => return write_json_response(&mut stream, 404, &json!({"error": "not_found"})),
    };
    if request.method != route.method() {
        return write_json_response(&mut stream, 405, &json!({"error": "method_not_allowed"}));
    }
    log::debug!("{} {}", request.method, request.path);

    match route {
        Route::Index => write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            INDEX_HTML.as_bytes(),
        ),
        Route::VideoFeed => stream_video(stream, cfg, &state.camera, shutdown),
        Route::Move(direction) => match state.motion.drive(direction) {
            Ok(_) => write_empty_response(&mut stream, 204),
            Err(err) => write_error(&mut stream, &err),
        },
        Route::Flip => match state.camera.flip() {
            Ok(_) => write_empty_response(&mut stream, 204),
            Err(err) => write_error(&mut stream, &err),
        },
        Route::SystemStats => {
            let stats = state.telemetry.sample().to_stats();
            write_json_response(&mut stream, 200, &serde_json::to_value(stats)?)
        }
        Route::Health => {
            let camera = &state.camera;
            let frame_age_ms = camera
                .broadcaster()
                .latest()
                .and_then(|frame| frame.captured_at().elapsed().ok())
                .and_then(|age| u64::try_from(age.as_millis()).ok());
            let body = json!({
                "status": "ok",
                "camera": camera.state().as_str(),
                "orientation": camera.orientation().as_str(),
                "uptime_s": camera.uptime().map(|uptime| uptime.as_secs()),
                "last_error": camera.last_error(),
                "sequence": camera.broadcaster().sequence(),
                "frame_age_ms": frame_age_ms,
                "serial": state.motion.is_connected(),
            });
            write_json_response(&mut stream, 200, &body)
        }
        Route::CameraReset => match state.camera.reset() {
            Ok(()) => write_empty_response(&mut stream, 204),
            Err(err) => write_error(&mut stream, &err),
        },
        Route::RestartService(service) => match state.services.restart(service) {
            Ok(()) => write_empty_response(&mut stream, 204),
            Err(err) => write_error(&mut stream, &err),
        },
        Route::ServiceStatus(service) => match state.services.status(service) {
            Ok(status) => write_json_response(
                &mut stream,
                200,
                &json!({"service": service, "status": status}),
            ),
            Err(err) => write_error(&mut stream, &err),
        },
    }
}

/// Serve `multipart/x-mixed-replace` until the client goes away, the camera
/// goes down, or the server shuts down.
fn stream_video(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    camera: &CameraSupervisor,
    shutdown: &AtomicBool,
) -> Result<()> {
    if camera.state() == CameraState::Failed {
        return write_json_response(&mut stream, 503, &json!({"error": "camera_failed"}));
    }
    if camera.is_down() {
        return write_json_response(&mut stream, 503, &json!({"error": "camera_unavailable"}));
    }
    stream.set_write_timeout(Some(cfg.stream_write_timeout))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let peer = stream.peer_addr().ok();
    log::info!("video viewer attached: {:?}", peer);
    let mut frames = camera
        .broadcaster()
        .subscribe()
        .frames(cfg.stream_poll, || {
            shutdown.load(Ordering::SeqCst) || camera.is_down()
        });
    for frame in frames.by_ref() {
        if let Err(err) = write_part(&mut stream, frame.jpeg()) {
            log::debug!("video viewer {:?} went away: {}", peer, err);
            break;
        }
    }
    if camera.is_down() {
        log::warn!(
            "closing video stream for {:?}: camera {}",
            peer,
            camera.state().as_str()
        );
    }
    log::info!(
        "video viewer detached: {:?} (last frame {})",
        peer,
        frames.last_seen()
    );
    Ok(())
}

fn write_part(stream: &mut TcpStream, jpeg: &[u8]) -> std::io::Result<()> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(jpeg)?;
    stream.write_all(b"\r\n")?;
    stream.flush()
}

fn error_status(err: &RelayError) -> (u16, &'static str) {
    match err {
        RelayError::InvalidCommand(_) => (400, "invalid_command"),
        RelayError::SerialUnavailable(_) => (503, "serial_unavailable"),
        RelayError::CameraUnavailable(_) => (503, "camera_unavailable"),
        RelayError::ServiceCommand(_) => (500, "service_command_failed"),
        RelayError::StreamCorrupt { .. } | RelayError::TelemetryUnavailable { .. } => {
            (500, "internal_error")
        }
    }
}

fn write_error(stream: &mut TcpStream, err: &RelayError) -> Result<()> {
    let (status, code) = error_status(err);
    log::warn!("request failed with {}: {}", status, err);
    write_json_response(
        stream,
        status,
        &json!({"error": code, "detail": err.to_string()}),
    )
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(
    stream: &mut TcpStream,
    status: u16,
    body: &serde_json::Value,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_empty_response(stream: &mut TcpStream, status: u16) -> Result<()> {
    let header = format!(
        "{}\r\nContent-Length: 0\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line(status)
    );
    stream.write_all(header.as_bytes())?;
    Ok(())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line(status),
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
