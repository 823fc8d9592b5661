//! Mode state machine.
//!
//! The supervisor is always in one of two modes:
//!
//! ```text
//!            enter_user_mode(timeout)
//!   ┌──────┐ ─────────────────────────► ┌──────┐
//!   │ Auto │                            │ User │
//!   └──────┘ ◄───────────────────────── └──────┘
//!        ▲   enter_auto_mode()            │  ▲
//!        │   (stop, system shutdown)      │  │ ping()
//!        └── scheduled re-arm             └──┘
//! ```
//!
//! Auto is the initial, fail-safe mode: the counter is armed with the largest
//! compare value and the supervisor re-arms it itself, three times per
//! timeout window. In User mode an external caller owns the acknowledgement
//! duty and the compare register holds exactly the configured timeout.
//!
//! [`ModeMachine`] performs the register programming but holds no lock; the
//! supervisor wraps it in one, since reset-then-arm is not atomic at the
//! register level.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::WatchdogConfig;
use crate::device::CounterDevice;
use crate::error::ConfigurationWarning;
use crate::schedule::RearmScheduler;

/// Number of Auto-mode re-arms per timeout window.
pub const AUTO_PINGS_PER_WINDOW: u32 = 3;

/// Who is responsible for servicing the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorMode {
    /// The supervisor re-arms the counter itself.
    #[default]
    Auto,
    /// An external caller must ping before the timeout elapses.
    User,
}

impl SupervisorMode {
    /// Get the mode as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::User => "User",
        }
    }
}

impl std::fmt::Display for SupervisorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Re-arm cadence while in Auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoPingSchedule {
    /// Time between re-arms.
    pub interval: Duration,
}

impl AutoPingSchedule {
    /// Schedule for a given timeout: [`AUTO_PINGS_PER_WINDOW`] re-arms per window.
    #[must_use]
    pub fn for_timeout(timeout: Duration) -> Self {
        Self {
            interval: timeout / AUTO_PINGS_PER_WINDOW,
        }
    }
}

/// The supervisor's mode state and register programming.
#[derive(Debug, Clone)]
pub struct ModeMachine {
    mode: SupervisorMode,
    config: WatchdogConfig,
    schedule: AutoPingSchedule,
}

impl ModeMachine {
    /// Create a machine in Auto mode. Nothing is programmed until the first
    /// transition.
    #[must_use]
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            mode: SupervisorMode::Auto,
            schedule: AutoPingSchedule::for_timeout(config.current_timeout),
            config,
        }
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> SupervisorMode {
        self.mode
    }

    /// Current calibrated configuration.
    #[must_use]
    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Current Auto-mode re-arm schedule.
    #[must_use]
    pub fn schedule(&self) -> AutoPingSchedule {
        self.schedule
    }

    /// Hand acknowledgement duty to an external caller.
    ///
    /// `timeout` is clamped first. Pending Auto re-arms are cancelled, the
    /// live count is reset and the compare register is loaded with the
    /// timeout's tick count, so the hardware fires exactly one timeout from
    /// now unless pinged.
    pub fn enter_user_mode(
        &mut self,
        timeout: Duration,
        device: &dyn CounterDevice,
        scheduler: &dyn RearmScheduler,
    ) -> Option<ConfigurationWarning> {
        let (applied, warning) = self.config.clamp(timeout);
        self.config.current_timeout = applied;
        self.schedule = AutoPingSchedule::for_timeout(applied);

        scheduler.cancel();
        device.reset_count();
        device.set_compare(self.config.ticks_for(applied));
        self.mode = SupervisorMode::User;

        tracing::info!(
            timeout_secs = applied.as_secs_f64(),
            "Watchdog entered user mode"
        );
        warning
    }

    /// Take acknowledgement duty back.
    ///
    /// Resets the live count, loads the largest compare value, and schedules
    /// the first re-arm one [`AutoPingSchedule`] interval from now. Calling it
    /// twice leaves the registers exactly as calling it once.
    pub fn enter_auto_mode(&mut self, device: &dyn CounterDevice, scheduler: &dyn RearmScheduler) {
        device.reset_count();
        device.set_compare(self.config.counter_max());
        self.schedule = AutoPingSchedule::for_timeout(self.config.current_timeout);
        scheduler.start(self.schedule.interval);

        if self.mode != SupervisorMode::Auto {
            tracing::info!(
                interval_ms = self.schedule.interval.as_millis(),
                "Watchdog entered auto mode"
            );
        }
        self.mode = SupervisorMode::Auto;
    }

    /// Reset the live count. Mode and compare register are untouched.
    pub fn ping(&self, device: &dyn CounterDevice) {
        device.reset_count();
    }

    /// Body of the scheduled Auto-mode re-arm.
    ///
    /// Returns `false` (and does nothing) outside Auto mode, which is how a
    /// re-arm that raced with `enter_user_mode` is discarded.
    pub fn auto_rearm(&self, device: &dyn CounterDevice) -> bool {
        if self.mode != SupervisorMode::Auto {
            tracing::debug!("Discarding stale auto re-arm");
            return false;
        }
        device.reset_count();
        true
    }

    /// Change the timeout.
    ///
    /// The request is clamped. In User mode the compare register is
    /// reprogrammed at once; in Auto mode only the re-arm interval changes,
    /// and a re-arm already pending is never pushed back.
    pub fn set_timeout(
        &mut self,
        requested: Duration,
        device: &dyn CounterDevice,
        scheduler: &dyn RearmScheduler,
    ) -> (Duration, Option<ConfigurationWarning>) {
        let (applied, warning) = self.config.clamp(requested);
        self.config.current_timeout = applied;
        self.schedule = AutoPingSchedule::for_timeout(applied);

        match self.mode {
            SupervisorMode::User => device.set_compare(self.config.ticks_for(applied)),
            SupervisorMode::Auto => scheduler.reschedule(self.schedule.interval),
        }
        tracing::debug!(
            timeout_secs = applied.as_secs_f64(),
            mode = %self.mode,
            "Watchdog timeout updated"
        );
        (applied, warning)
    }
}
