//! The watchdog supervisor and its public surface.
//!
//! A [`Supervisor`] is constructed explicitly by its host through
//! [`SupervisorBuilder`]. Construction calibrates the tick frequency, claims
//! the expiry interrupt, starts the escalation dispatcher, and arms the
//! counter in Auto mode before returning, so the counter is armed from the
//! moment a supervisor exists.
//!
//! Every Mode State Machine operation goes through one lock. The Auto re-arm
//! timer takes the same lock; the escalation path never does.

use crossbeam::channel;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::calibration::ClockCalibrator;
use crate::config::{StopPolicy, SupervisorSettings, WatchdogConfig, duration_secs_f64};
use crate::device::CounterDevice;
use crate::error::{ConfigurationWarning, SupervisorError, SupervisorResult};
use crate::escalation::{EscalationHandler, ExpiryDispatcher, RestartPath, TimeoutMirror};
use crate::metrics::{MetricsSnapshot, SupervisorMetrics};
use crate::mode::{ModeMachine, SupervisorMode};
use crate::schedule::{RearmScheduler, ThreadRearmScheduler};
use crate::session::WatchdogSession;
use crate::shutdown::ShutdownGuard;

/// Expiry events buffered between the interrupt and the dispatcher.
const EXPIRY_QUEUE_DEPTH: usize = 8;

/// Result of a timeout change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutOutcome {
    /// The timeout now in force.
    pub applied: Duration,
    /// Present when the request had to be clamped.
    pub warning: Option<ConfigurationWarning>,
}

impl TimeoutOutcome {
    /// Returns `true` if the request was clamped.
    #[must_use]
    pub fn is_clamped(&self) -> bool {
        self.warning.is_some()
    }
}

/// Operations a supervisor supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchdogOptions {
    /// The timeout can be changed at runtime.
    pub settimeout: bool,
    /// External keepalive pings are accepted.
    pub keepalive: bool,
    /// Sessions honour the magic close character.
    pub magic_close: bool,
}

/// Snapshot returned by [`Supervisor::info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchdogInfo {
    /// Identity from the settings.
    pub identity: String,
    /// Shortest allowed timeout.
    #[serde(serialize_with = "duration_secs_f64::serialize")]
    pub min_timeout: Duration,
    /// Longest representable timeout.
    #[serde(serialize_with = "duration_secs_f64::serialize")]
    pub max_timeout: Duration,
    /// Timeout in force.
    #[serde(serialize_with = "duration_secs_f64::serialize")]
    pub current_timeout: Duration,
    /// Current mode.
    pub mode: SupervisorMode,
    /// Calibrated tick frequency in Hz.
    pub tick_frequency: u64,
    /// Counter width in bits.
    pub counter_bits: u32,
    /// Stop policy in force.
    pub stop_policy: StopPolicy,
    /// Supported operations.
    pub options: WatchdogOptions,
}

/// State shared between the supervisor, its re-arm timer and shutdown guards.
pub(crate) struct SupervisorCore {
    machine: Mutex<ModeMachine>,
    device: Arc<dyn CounterDevice>,
    scheduler: Arc<dyn RearmScheduler>,
    timeout: Arc<TimeoutMirror>,
    metrics: Arc<SupervisorMetrics>,
    stop_policy: StopPolicy,
    identity: String,
}

impl SupervisorCore {
    fn record_warning(&self, warning: Option<&ConfigurationWarning>) {
        if let Some(warning) = warning {
            self.metrics.record_clamped();
            tracing::warn!(
                requested_secs = warning.requested().as_secs_f64(),
                applied_secs = warning.applied().as_secs_f64(),
                "Requested watchdog timeout clamped"
            );
        }
    }

    fn enter_user_mode(&self, timeout: Duration) -> Option<ConfigurationWarning> {
        let mut machine = self.machine.lock();
        let previous = machine.mode();
        let warning = machine.enter_user_mode(timeout, &*self.device, &*self.scheduler);
        self.timeout.store(machine.config().current_timeout);
        drop(machine);

        if previous != SupervisorMode::User {
            self.metrics.record_transition();
        }
        self.record_warning(warning.as_ref());
        warning
    }

    pub(crate) fn enter_auto_mode(&self) {
        let mut machine = self.machine.lock();
        let previous = machine.mode();
        machine.enter_auto_mode(&*self.device, &*self.scheduler);
        drop(machine);

        if previous != SupervisorMode::Auto {
            self.metrics.record_transition();
        }
    }

    fn auto_rearm(&self) {
        let machine = self.machine.lock();
        if machine.auto_rearm(&*self.device) {
            self.metrics.record_auto_rearm();
            drop(machine);
            tracing::debug!("Auto re-arm");
        }
    }

    fn ping(&self) -> SupervisorResult<()> {
        let machine = self.machine.lock();
        if machine.mode() != SupervisorMode::User {
            return Err(SupervisorError::NotStarted);
        }
        machine.ping(&*self.device);
        drop(machine);

        self.metrics.record_ping();
        tracing::debug!("Watchdog pinged");
        Ok(())
    }

    fn set_timeout(&self, requested: Duration) -> TimeoutOutcome {
        let mut machine = self.machine.lock();
        let (applied, warning) =
            machine.set_timeout(requested, &*self.device, &*self.scheduler);
        self.timeout.store(applied);
        drop(machine);

        self.record_warning(warning.as_ref());
        TimeoutOutcome { applied, warning }
    }

    pub(crate) fn stop_policy(&self) -> StopPolicy {
        self.stop_policy
    }

    fn info(&self) -> WatchdogInfo {
        let machine = self.machine.lock();
        let config = machine.config();
        WatchdogInfo {
            identity: self.identity.clone(),
            min_timeout: config.min_timeout,
            max_timeout: config.max_timeout,
            current_timeout: config.current_timeout,
            mode: machine.mode(),
            tick_frequency: config.tick_frequency,
            counter_bits: config.counter_bits,
            stop_policy: self.stop_policy,
            options: WatchdogOptions {
                settimeout: true,
                keepalive: true,
                magic_close: self.stop_policy.allows_stop(),
            },
        }
    }
}

/// Builder for [`Supervisor`].
#[derive(Default)]
pub struct SupervisorBuilder {
    settings: SupervisorSettings,
    calibrator: Option<Box<dyn ClockCalibrator>>,
    device: Option<Arc<dyn CounterDevice>>,
    scheduler: Option<Arc<dyn RearmScheduler>>,
    restart: Option<Arc<dyn RestartPath>>,
}

impl std::fmt::Debug for SupervisorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorBuilder")
            .field("settings", &self.settings)
            .field("calibrator", &self.calibrator.is_some())
            .field("device", &self.device.is_some())
            .field("scheduler", &self.scheduler.is_some())
            .field("restart", &self.restart.is_some())
            .finish()
    }
}

impl SupervisorBuilder {
    /// Use these settings instead of the defaults.
    #[must_use]
    pub fn settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Tick frequency source. Required.
    #[must_use]
    pub fn calibrator(mut self, calibrator: impl ClockCalibrator + 'static) -> Self {
        self.calibrator = Some(Box::new(calibrator));
        self
    }

    /// The counter to supervise. Required.
    #[must_use]
    pub fn device(mut self, device: Arc<dyn CounterDevice>) -> Self {
        self.device = Some(device);
        self
    }

    /// Re-arm timer. Defaults to a [`ThreadRearmScheduler`].
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn RearmScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// The system restart path used on expiry. Required.
    #[must_use]
    pub fn restart_path(mut self, restart: Arc<dyn RestartPath>) -> Self {
        self.restart = Some(restart);
        self
    }

    /// Calibrate, claim resources and arm the counter in Auto mode.
    ///
    /// # Errors
    ///
    /// Fails on invalid settings, a missing collaborator, a failed
    /// calibration, an interrupt already claimed elsewhere, or a thread that
    /// cannot be spawned. No supervisor exists after a failure.
    pub fn build(self) -> SupervisorResult<Supervisor> {
        let settings = self.settings;
        settings.validate()?;
        let calibrator = self
            .calibrator
            .ok_or_else(|| SupervisorError::invalid_configuration("a clock calibrator is required"))?;
        let device = self
            .device
            .ok_or_else(|| SupervisorError::invalid_configuration("a counter device is required"))?;
        let restart = self
            .restart
            .ok_or_else(|| SupervisorError::invalid_configuration("a restart path is required"))?;

        let tick_frequency = calibrator.measure_tick_frequency()?;
        let (config, warning) =
            WatchdogConfig::calibrated(&settings, tick_frequency, device.counter_bits())?;

        let scheduler: Arc<dyn RearmScheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(ThreadRearmScheduler::spawn()?),
        };

        let (line, events) = channel::bounded(EXPIRY_QUEUE_DEPTH);
        device.attach_interrupt(line)?;

        let metrics = Arc::new(SupervisorMetrics::new());
        let timeout = Arc::new(TimeoutMirror::new(config.current_timeout));
        let handler = EscalationHandler::new(restart, Arc::clone(&timeout), Arc::clone(&metrics));
        let dispatcher = match ExpiryDispatcher::spawn(events, handler) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                device.detach_interrupt();
                return Err(e);
            }
        };

        let core = Arc::new(SupervisorCore {
            machine: Mutex::new(ModeMachine::new(config)),
            device,
            scheduler,
            timeout,
            metrics,
            stop_policy: settings.stop_policy,
            identity: settings.identity,
        });
        core.record_warning(warning.as_ref());

        let weak = Arc::downgrade(&core);
        core.scheduler.install(Arc::new(move || {
            if let Some(core) = weak.upgrade() {
                core.auto_rearm();
            }
        }));
        core.machine
            .lock()
            .enter_auto_mode(&*core.device, &*core.scheduler);

        tracing::info!(
            tick_frequency,
            counter_bits = config.counter_bits,
            max_timeout_secs = config.max_timeout.as_secs_f64(),
            timeout_secs = config.current_timeout.as_secs_f64(),
            "Watchdog supervisor armed in auto mode"
        );

        Ok(Supervisor {
            core,
            dispatcher,
            session_open: AtomicBool::new(false),
            torn_down: false,
        })
    }
}

/// Supervises one hardware watchdog counter.
pub struct Supervisor {
    core: Arc<SupervisorCore>,
    dispatcher: ExpiryDispatcher,
    session_open: AtomicBool,
    torn_down: bool,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("info", &self.core.info())
            .field("session_open", &self.session_open.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::default()
    }

    /// Enter User mode with `timeout`, or the current timeout if `None`.
    ///
    /// From now on the caller must [`ping`](Self::ping) before the timeout
    /// elapses. A clamped timeout is reported through the warning.
    ///
    /// # Errors
    ///
    /// Does not fail on a built supervisor.
    pub fn start(&self, timeout: Option<Duration>) -> SupervisorResult<Option<ConfigurationWarning>> {
        let timeout = timeout.unwrap_or_else(|| self.core.timeout.load());
        Ok(self.core.enter_user_mode(timeout))
    }

    /// Acknowledge liveness.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotStarted`] outside User mode; Auto-mode
    /// servicing belongs to the supervisor alone.
    pub fn ping(&self) -> SupervisorResult<()> {
        self.core.ping()
    }

    /// Change the timeout, clamping it into the calibrated range.
    ///
    /// In User mode the new value takes effect immediately, without waiting
    /// for the next ping.
    pub fn set_timeout(&self, requested: Duration) -> TimeoutOutcome {
        self.core.set_timeout(requested)
    }

    /// Hand servicing back to the supervisor.
    ///
    /// This does **not** disarm the watchdog: the counter stays armed and is
    /// re-armed automatically in Auto mode.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::StopForbidden`] under [`StopPolicy::NoWayOut`].
    pub fn stop(&self) -> SupervisorResult<()> {
        if !self.core.stop_policy().allows_stop() {
            tracing::warn!("Refusing to stop watchdog: no-way-out policy in force");
            return Err(SupervisorError::StopForbidden);
        }
        self.core.enter_auto_mode();
        tracing::info!("Watchdog stopped by caller; counter remains armed in auto mode");
        Ok(())
    }

    /// Current bounds, timeout and mode.
    #[must_use]
    pub fn info(&self) -> WatchdogInfo {
        self.core.info()
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> SupervisorMode {
        self.core.machine.lock().mode()
    }

    /// Timeout in force.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.core.timeout.load()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// A hook the host calls when a controlled shutdown begins.
    #[must_use]
    pub fn shutdown_guard(&self) -> ShutdownGuard {
        ShutdownGuard::new(Arc::downgrade(&self.core))
    }

    /// Open the exclusive session handle, entering User mode.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::ResourceBusy`] while another session is open.
    pub fn open_session(&self) -> SupervisorResult<WatchdogSession<'_>> {
        if self
            .session_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SupervisorError::resource_busy(
                "watchdog session already open",
            ));
        }
        self.start(None)?;
        Ok(WatchdogSession::new(self))
    }

    pub(crate) fn close_session(&self) {
        self.session_open.store(false, Ordering::Release);
    }

    pub(crate) fn stop_policy(&self) -> StopPolicy {
        self.core.stop_policy()
    }

    /// Tear the supervisor down.
    ///
    /// The counter is disarmed only when `system_halting` is `true`. Otherwise
    /// it is left armed with its current compare value and nobody services
    /// it any more, so it will fire.
    pub fn teardown(mut self, system_halting: bool) {
        self.teardown_inner(system_halting);
    }

    fn teardown_inner(&mut self, system_halting: bool) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.core.scheduler.cancel();
        self.core.scheduler.shutdown();
        self.core.device.detach_interrupt();

        if system_halting {
            self.core.device.disarm();
            tracing::info!("Watchdog disarmed for system halt");
        } else {
            tracing::warn!(
                mode = %self.mode(),
                "Watchdog supervisor torn down; counter left armed"
            );
        }
        self.dispatcher.release();
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.teardown_inner(false);
    }
}
