//! Simulation commands
//!
//! Both commands run on virtual time: a ten-minute scenario finishes as fast
//! as the supervisor can process it. Escalation still goes through the real
//! dispatcher thread, so reports wait briefly for restart attempts to land.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use wdt_supervisor::sim::{HangingRestart, RecordingRestart, SimulatedSystem};

use crate::commands::{Target, seconds};
use crate::error::CliError;
use crate::output;

/// How long to wait for the dispatcher to deliver an expiry.
const DELIVERY: Duration = Duration::from_secs(2);

/// Resolution used when searching for the moment an event happens.
const SEARCH_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub timeout_secs: f64,
    pub ping_every_secs: Option<f64>,
    pub elapsed_secs: f64,
    pub pings: u64,
    pub expiries: u32,
    pub restart_attempts: u32,
    pub hardware_resets: u32,
    pub halted: bool,
}

#[derive(Debug)]
pub struct EscalationReport {
    pub timeout_secs: f64,
    pub expiry_at_secs: Option<f64>,
    pub restart_attempts: u32,
    pub hardware_reset_at_secs: Option<f64>,
}

impl EscalationReport {
    /// Time between the expiry and the hardware reset.
    pub fn fallback_delay_secs(&self) -> Option<f64> {
        match (self.expiry_at_secs, self.hardware_reset_at_secs) {
            (Some(expiry), Some(reset)) => Some(reset - expiry),
            _ => None,
        }
    }
}

/// Run a User-mode session, pinging every `ping_every` seconds if given.
pub fn run(
    target: &Target,
    timeout: f64,
    ping_every: Option<f64>,
    duration: f64,
    json: bool,
) -> Result<()> {
    let timeout = seconds("--timeout", timeout)?;
    let ping_every = ping_every.map(|p| seconds("--ping-every", p)).transpose()?;
    if ping_every == Some(Duration::ZERO) {
        return Err(CliError::InvalidArgument("--ping-every must be greater than zero".into()).into());
    }
    let duration = seconds("--duration", duration)?;

    let restart = Arc::new(RecordingRestart::new());
    let (system, supervisor) = target.simulate(restart.clone())?;
    supervisor.start(Some(timeout))?;
    let applied = supervisor.timeout();

    let step = ping_every.unwrap_or(duration);
    let mut elapsed = Duration::ZERO;
    while elapsed < duration && !system.counter().is_halted() {
        let slice = step.min(duration.saturating_sub(elapsed));
        system.advance(slice);
        elapsed = elapsed.saturating_add(slice);
        if ping_every.is_some() && slice == step && !system.counter().is_halted() {
            supervisor.ping()?;
        }
    }

    let expiries = system.counter().expiries();
    if !restart.wait_for_attempts(expiries, DELIVERY) {
        tracing::warn!(expiries, "Not every expiry reached the restart path in time");
    }

    let report = SimulationReport {
        timeout_secs: applied.as_secs_f64(),
        ping_every_secs: ping_every.map(|d| d.as_secs_f64()),
        elapsed_secs: elapsed.as_secs_f64(),
        pings: supervisor.metrics().pings,
        expiries,
        restart_attempts: restart.attempts(),
        hardware_resets: system.counter().hardware_resets(),
        halted: system.counter().is_halted(),
    };
    supervisor.teardown(true);
    output::print_simulation(&report, json)
}

/// Let a `timeout` watchdog expire with a restart attempt that hangs, and
/// report when the hardware reset takes over.
pub fn escalate(target: &Target, timeout: f64, json: bool) -> Result<()> {
    let timeout = seconds("--timeout", timeout)?;
    let restart = Arc::new(HangingRestart::new());
    let (system, supervisor) = target.simulate(restart.clone())?;
    supervisor.start(Some(timeout))?;
    let applied = supervisor.timeout();

    let limit = applied.saturating_mul(2).saturating_add(SEARCH_STEP);
    let expiry_at = advance_until(&system, limit, |s| s.counter().expiries() > 0);
    if expiry_at.is_some() && !restart.wait_for_attempts(1, DELIVERY) {
        tracing::warn!("Expiry did not reach the restart path in time");
    }
    let hardware_reset_at = advance_until(&system, limit, |s| s.counter().is_halted());

    let report = EscalationReport {
        timeout_secs: applied.as_secs_f64(),
        expiry_at_secs: expiry_at.map(|d| d.as_secs_f64()),
        restart_attempts: restart.attempts(),
        hardware_reset_at_secs: hardware_reset_at.map(|d| d.as_secs_f64()),
    };

    restart.release();
    supervisor.teardown(false);
    output::print_escalation(&report, json)
}

/// Advance in small steps until `reached` holds or virtual time passes `limit`.
fn advance_until(
    system: &SimulatedSystem,
    limit: Duration,
    reached: impl Fn(&SimulatedSystem) -> bool,
) -> Option<Duration> {
    loop {
        if reached(system) {
            return Some(system.now());
        }
        if system.now() >= limit {
            return None;
        }
        system.advance(SEARCH_STEP);
    }
}
