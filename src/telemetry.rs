//! Host telemetry.
//!
//! CPU utilization is the busy share of two `/proc/stat` snapshots taken
//! `sample_interval` apart. Temperature comes from the firmware query
//! (`vcgencmd measure_temp` on a Raspberry Pi). Each metric degrades on its own
//! to the "Unavailable" sentinel.
//!
//! All hardware access goes through `HostProbe`, so the degradation logic runs
//! without real hardware in tests.

use serde::Serialize;
use std::io;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RelayError, RelayResult};

pub const UNAVAILABLE: &str = "Unavailable";

/// Shell and procfs access used by telemetry and service control.
pub trait HostProbe: Send + Sync {
    fn read_proc_stat(&self) -> io::Result<String>;

    /// Run a command and return its stdout. Non-zero exit is an error.
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String>;
}

/// The real host.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn read_proc_stat(&self) -> io::Result<String> {
        std::fs::read_to_string("/proc/stat")
    }

    fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Aggregate CPU time counters from the `cpu` line of `/proc/stat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuTimes {
    pub total: u64,
    pub idle: u64,
}

impl CpuTimes {
    pub fn parse(proc_stat: &str) -> Option<Self> {
        let line = proc_stat.lines().find(|line| line.starts_with("cpu "))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|field| field.parse().ok())
            .collect::<Option<_>>()?;
        if fields.len() < 4 {
            return None;
        }
        Some(Self {
            total: fields.iter().sum(),
            idle: fields[3],
        })
    }

    /// Busy percentage between `earlier` and `self`.
    pub fn utilization_since(&self, earlier: &CpuTimes) -> Option<f64> {
        let total = self.total.checked_sub(earlier.total)?;
        let idle = self.idle.checked_sub(earlier.idle)?;
        if total == 0 {
            return None;
        }
        Some(100.0 * total.saturating_sub(idle) as f64 / total as f64)
    }
}

/// Parse `vcgencmd measure_temp` output such as `temp=48.3'C`.
pub fn parse_temperature(output: &str) -> Option<f64> {
    let value = output.trim().split_once('=')?.1;
    let value = value.split('\'').next()?;
    value.trim().parse().ok()
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Telemetry {
    pub cpu_percent: Option<f64>,
    pub temperature_c: Option<f64>,
}

/// JSON body of `/system_stats`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub cpu: String,
    pub temp: String,
}

impl Telemetry {
    pub fn to_stats(&self) -> SystemStats {
        SystemStats {
            cpu: format!("{}%", format_reading(self.cpu_percent)),
            temp: format!("{}°C", format_reading(self.temperature_c)),
        }
    }
}

fn format_reading(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.1}", value),
        None => UNAVAILABLE.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub sample_interval: Duration,
    /// Program and arguments printing the SoC temperature.
    pub temperature_command: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(100),
            temperature_command: vec!["vcgencmd".to_string(), "measure_temp".to_string()],
        }
    }
}

pub struct TelemetrySampler {
    probe: Arc<dyn HostProbe>,
    config: TelemetryConfig,
}

impl TelemetrySampler {
    pub fn new(probe: Arc<dyn HostProbe>, config: TelemetryConfig) -> Self {
        Self { probe, config }
    }

    /// Sample both metrics. Never fails; failed metrics are `None`.
    pub fn sample(&self) -> Telemetry {
        let cpu_percent = self
            .sample_cpu()
            .map_err(|err| log::warn!("{}", err))
            .ok();
        let temperature_c = self
            .sample_temperature()
            .map_err(|err| log::warn!("{}", err))
            .ok();
        Telemetry {
            cpu_percent,
            temperature_c,
        }
    }

    pub fn sample_cpu(&self) -> RelayResult<f64> {
        let first = self.cpu_times()?;
        std::thread::sleep(self.config.sample_interval);
        let second = self.cpu_times()?;
        second
            .utilization_since(&first)
            .ok_or_else(|| cpu_unavailable("no cpu time elapsed between samples"))
    }

    pub fn sample_temperature(&self) -> RelayResult<f64> {
        let (program, args) = self
            .config
            .temperature_command
            .split_first()
            .ok_or_else(|| temp_unavailable("no temperature command configured"))?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .probe
            .run(program, &args)
            .map_err(|err| temp_unavailable(err.to_string()))?;
        parse_temperature(&output)
            .ok_or_else(|| temp_unavailable(format!("unparseable output {:?}", output.trim())))
    }

    fn cpu_times(&self) -> RelayResult<CpuTimes> {
        let raw = self
            .probe
            .read_proc_stat()
            .map_err(|err| cpu_unavailable(err.to_string()))?;
        CpuTimes::parse(&raw).ok_or_else(|| cpu_unavailable("malformed /proc/stat"))
    }
}

fn cpu_unavailable(reason: impl Into<String>) -> RelayError {
    RelayError::TelemetryUnavailable {
        metric: "cpu",
        reason: reason.into(),
    }
}

fn temp_unavailable(reason: impl Into<String>) -> RelayError {
    RelayError::TelemetryUnavailable {
        metric: "temperature",
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProbe {
        stats: Mutex<VecDeque<io::Result<String>>>,
        temperature: Mutex<Option<io::Result<String>>>,
    }

    impl ScriptedProbe {
        fn new(stats: Vec<io::Result<String>>, temperature: io::Result<String>) -> Arc<Self> {
            Arc::new(Self {
                stats: Mutex::new(stats.into()),
                temperature: Mutex::new(Some(temperature)),
            })
        }
    }

    impl HostProbe for ScriptedProbe {
        fn read_proc_stat(&self) -> io::Result<String> {
            self.stats
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::other("no more samples")))
        }

        fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
            assert_eq!(program, "vcgencmd");
            assert_eq!(args, ["measure_temp"]);
            self.temperature
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(io::Error::other("already used")))
        }
    }

    fn stat(user: u64, system: u64, idle: u64) -> io::Result<String> {
        Ok(format!(
            "cpu  {user} 0 {system} {idle} 0 0 0 0 0 0\ncpu0 1 2 3 4 5 6 7 0 0 0\nintr 12345\n"
        ))
    }

    fn sampler(probe: Arc<ScriptedProbe>) -> TelemetrySampler {
        TelemetrySampler::new(
            probe,
            TelemetryConfig {
                sample_interval: Duration::from_millis(1),
                ..TelemetryConfig::default()
            },
        )
    }

    #[test]
    fn computes_cpu_and_temperature() {
        let probe = ScriptedProbe::new(
            vec![stat(100, 100, 800), stat(150, 150, 900)],
            Ok("temp=48.3'C\n".to_string()),
        );
        let telemetry = sampler(probe).sample();
        assert_eq!(telemetry.cpu_percent, Some(50.0));
        assert_eq!(telemetry.temperature_c, Some(48.3));
        assert_eq!(
            telemetry.to_stats(),
            SystemStats {
                cpu: "50.0%".to_string(),
                temp: "48.3°C".to_string(),
            }
        );
    }

    #[test]
    fn cpu_failure_keeps_temperature() {
        let probe = ScriptedProbe::new(
            vec![Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))],
            Ok("temp=51.0'C".to_string()),
        );
        let telemetry = sampler(probe).sample();
        assert_eq!(telemetry.cpu_percent, None);
        assert_eq!(telemetry.temperature_c, Some(51.0));
        let stats = telemetry.to_stats();
        assert_eq!(stats.cpu, "Unavailable%");
        assert_eq!(stats.temp, "51.0°C");
    }

    #[test]
    fn temperature_failure_keeps_cpu() {
        let probe = ScriptedProbe::new(
            vec![stat(0, 0, 1000), stat(25, 0, 1075)],
            Err(io::Error::new(io::ErrorKind::NotFound, "vcgencmd not found")),
        );
        let sampler = sampler(probe);
        let telemetry = sampler.sample();
        assert_eq!(telemetry.cpu_percent, Some(25.0));
        assert_eq!(telemetry.temperature_c, None);
        assert_eq!(telemetry.to_stats().temp, "Unavailable°C");
    }

    #[test]
    fn temperature_errors_are_typed() {
        let probe = ScriptedProbe::new(vec![], Ok("garbage".to_string()));
        let err = sampler(probe).sample_temperature().unwrap_err();
        assert!(matches!(
            err,
            RelayError::TelemetryUnavailable {
                metric: "temperature",
                ..
            }
        ));
    }

    #[test]
    fn parses_proc_stat_and_temperature() {
        let times = CpuTimes::parse("cpu  1 2 3 4 5 6 7 8 0 0\n").unwrap();
        assert_eq!(times, CpuTimes { total: 36, idle: 4 });
        assert!(CpuTimes::parse("intr 1 2 3\n").is_none());
        assert!(CpuTimes::parse("cpu  1 x 3 4\n").is_none());

        assert_eq!(parse_temperature("temp=62.8'C"), Some(62.8));
        assert_eq!(parse_temperature("62.8"), None);
    }

    #[test]
    fn counters_going_backwards_are_unavailable() {
        let later = CpuTimes { total: 10, idle: 5 };
        let earlier = CpuTimes { total: 20, idle: 5 };
        assert_eq!(later.utilization_since(&earlier), None);
        assert_eq!(earlier.utilization_since(&earlier), None);
    }
}
