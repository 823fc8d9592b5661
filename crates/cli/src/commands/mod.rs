//! Command implementations for wdtctl

pub mod info;
pub mod simulate;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use wdt_supervisor::escalation::RestartPath;
use wdt_supervisor::sim::SimulatedSystem;
use wdt_supervisor::{Supervisor, SupervisorSettings};

use crate::error::CliError;

/// The counter a command runs against.
pub struct Target {
    pub settings: SupervisorSettings,
    pub frequency: u64,
    pub bits: u32,
}

impl Target {
    pub fn load(frequency: u64, bits: u32, config: Option<&Path>) -> Result<Self, CliError> {
        let settings = match config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })?;
                SupervisorSettings::from_json_str(&text)?
            }
            None => SupervisorSettings::default(),
        };
        tracing::debug!(frequency, bits, identity = %settings.identity, "Loaded target");

        Ok(Self {
            settings,
            frequency,
            bits,
        })
    }

    /// Build a supervisor on fresh simulated hardware.
    pub fn simulate(
        &self,
        restart: Arc<dyn RestartPath>,
    ) -> Result<(SimulatedSystem, Supervisor), CliError> {
        let system = SimulatedSystem::new(self.frequency, self.bits);
        let supervisor = Supervisor::builder()
            .settings(self.settings.clone())
            .calibrator(system.calibrator())
            .device(system.counter().clone())
            .scheduler(system.scheduler().clone())
            .restart_path(restart)
            .build()?;
        Ok((system, supervisor))
    }
}

/// Parse a user-supplied number of seconds.
pub fn seconds(name: &str, value: f64) -> Result<Duration, CliError> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        CliError::InvalidArgument(format!("{name} must be a non-negative number of seconds ({e})"))
    })
}
