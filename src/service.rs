//! Allowlisted systemd control.
//!
//! Only names in the allowlist are ever passed to `systemctl`; anything else is
//! rejected before a process is spawned.

use std::sync::Arc;

use crate::error::{RelayError, RelayResult};
use crate::telemetry::HostProbe;

pub struct ServiceControl {
    probe: Arc<dyn HostProbe>,
    allowed: Vec<String>,
}

impl ServiceControl {
    pub fn new(probe: Arc<dyn HostProbe>, allowed: Vec<String>) -> Self {
        Self { probe, allowed }
    }

    /// `sudo systemctl restart <name>`.
    pub fn restart(&self, name: &str) -> RelayResult<()> {
        let name = self.check(name)?;
        log::info!("restarting service {}", name);
        self.probe
            .run("sudo", &["systemctl", "restart", name])
            .map_err(|err| {
                RelayError::ServiceCommand(format!("restart {} failed: {}", name, err))
            })?;
        Ok(())
    }

    /// `systemctl is-active <name>`, e.g. "active" or "inactive".
    pub fn status(&self, name: &str) -> RelayResult<String> {
        let name = self.check(name)?;
        let output = self
            .probe
            .run("systemctl", &["is-active", name])
            .map_err(|err| RelayError::ServiceCommand(format!("status {} failed: {}", name, err)))?;
        Ok(output.trim().to_string())
    }

    fn check<'a>(&self, name: &'a str) -> RelayResult<&'a str> {
        if self.allowed.iter().any(|allowed| allowed == name) {
            Ok(name)
        } else {
            Err(RelayError::InvalidCommand(format!("service {}", name)))
        }
    }
}
