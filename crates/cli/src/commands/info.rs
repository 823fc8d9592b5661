//! Bounds inspection commands

use anyhow::Result;
use std::sync::Arc;
use wdt_supervisor::sim::RecordingRestart;

use crate::commands::{Target, seconds};
use crate::output;

/// Show the supervisor's calibrated bounds and state.
pub fn show_info(target: &Target, json: bool) -> Result<()> {
    let (_system, supervisor) = target.simulate(Arc::new(RecordingRestart::new()))?;
    output::print_info(&supervisor.info(), json)?;
    supervisor.teardown(true);
    Ok(())
}

/// Clamp a requested timeout the way `set_timeout` would.
pub fn clamp(target: &Target, requested: f64, json: bool) -> Result<()> {
    let requested = seconds("timeout", requested)?;
    let (_system, supervisor) = target.simulate(Arc::new(RecordingRestart::new()))?;
    let outcome = supervisor.set_timeout(requested);
    output::print_clamp(requested, &outcome, &supervisor.info(), json)?;
    supervisor.teardown(true);
    Ok(())
}
