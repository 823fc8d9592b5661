//! Simulated watchdog hardware.
//!
//! Everything here runs on virtual time so scenarios spanning several
//! watchdog periods execute instantly and deterministically:
//!
//! - [`SimulatedCounter`] is a [`CounterDevice`] that records every register
//!   write, raises one [`ExpiryEvent`] when the count reaches the compare
//!   value, and fires the secondary hardware reset if the count runs for one
//!   more full compare interval without a reset.
//! - [`ManualRearmScheduler`] is a [`RearmScheduler`] that only remembers
//!   when its next callback is due.
//! - [`SimulatedSystem`] ties both to a [`VirtualClock`] and advances them
//!   together.
//! - [`RecordingRestart`] and [`HangingRestart`] are [`RestartPath`]s for
//!   observing escalation.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::calibration::FixedFrequency;
use crate::device::{CounterDevice, ExpiryEvent, InterruptLine};
use crate::error::{RestartError, SupervisorError, SupervisorResult};
use crate::escalation::RestartPath;
use crate::schedule::{RearmCallback, RearmScheduler};
use crate::translate;

/// A register write observed by [`SimulatedCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWrite {
    /// Compare register loaded with a tick count.
    Compare(u64),
    /// Live count reset to zero.
    ResetCount,
    /// Counter disarmed.
    Disarm,
}

/// Snapshot of the simulated registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Compare value, or `None` when disarmed.
    pub compare: Option<u64>,
    /// Live count.
    pub count: u64,
}

#[derive(Debug, Default)]
struct CounterState {
    count: u64,
    compare: Option<u64>,
    expiry_pending: bool,
    ticks_since_expiry: u64,
    expiries: u32,
    hardware_resets: u32,
    halted: bool,
    writes: Vec<RegisterWrite>,
    line: Option<InterruptLine>,
}

/// Simulated free-running counter with a compare register.
#[derive(Debug)]
pub struct SimulatedCounter {
    bits: u32,
    state: Mutex<CounterState>,
}

impl SimulatedCounter {
    /// Create a disarmed counter of `bits` width.
    #[must_use]
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            state: Mutex::new(CounterState::default()),
        }
    }

    /// Let `ticks` counter increments elapse.
    ///
    /// Crossing the compare value raises one expiry. Running one further
    /// compare interval past the expiry without a reset fires the secondary
    /// hardware reset and halts the simulated system.
    pub fn advance_ticks(&self, ticks: u64) {
        let mut state = self.state.lock();
        if state.halted {
            return;
        }
        state.count = state.count.saturating_add(ticks);

        let Some(compare) = state.compare else {
            return;
        };

        if state.expiry_pending {
            state.ticks_since_expiry = state.ticks_since_expiry.saturating_add(ticks);
        } else if state.count >= compare {
            state.expiry_pending = true;
            state.ticks_since_expiry = state.count.saturating_sub(compare);
            state.expiries = state.expiries.saturating_add(1);
            tracing::trace!(count = state.count, compare, "Simulated counter expired");
            if let Some(line) = &state.line {
                if line.try_send(ExpiryEvent).is_err() {
                    tracing::warn!("Expiry interrupt dropped: line full or closed");
                }
            }
        }

        if state.expiry_pending && state.ticks_since_expiry >= compare {
            state.halted = true;
            state.hardware_resets = state.hardware_resets.saturating_add(1);
            tracing::trace!("Simulated secondary hardware reset fired");
        }
    }

    /// Expiry events raised so far.
    #[must_use]
    pub fn expiries(&self) -> u32 {
        self.state.lock().expiries
    }

    /// Secondary hardware resets fired so far.
    #[must_use]
    pub fn hardware_resets(&self) -> u32 {
        self.state.lock().hardware_resets
    }

    /// Returns `true` once the secondary reset has fired.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state.lock().halted
    }

    /// Current register contents.
    #[must_use]
    pub fn registers(&self) -> Registers {
        let state = self.state.lock();
        Registers {
            compare: state.compare,
            count: state.count,
        }
    }

    /// Register writes recorded since creation or the last [`clear_writes`](Self::clear_writes).
    #[must_use]
    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.state.lock().writes.clone()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Returns `true` while an interrupt line is attached.
    #[must_use]
    pub fn has_interrupt(&self) -> bool {
        self.state.lock().line.is_some()
    }
}

impl CounterDevice for SimulatedCounter {
    fn counter_bits(&self) -> u32 {
        self.bits
    }

    fn set_compare(&self, ticks: u64) {
        let mut state = self.state.lock();
        tracing::trace!(ticks, "compare <- ticks");
        state.compare = Some(ticks);
        state.writes.push(RegisterWrite::Compare(ticks));
    }

    fn reset_count(&self) {
        let mut state = self.state.lock();
        tracing::trace!("count <- 0");
        state.count = 0;
        state.expiry_pending = false;
        state.ticks_since_expiry = 0;
        state.writes.push(RegisterWrite::ResetCount);
    }

    fn disarm(&self) {
        let mut state = self.state.lock();
        tracing::trace!("counter disarmed");
        state.compare = None;
        state.expiry_pending = false;
        state.ticks_since_expiry = 0;
        state.writes.push(RegisterWrite::Disarm);
    }

    fn attach_interrupt(&self, line: InterruptLine) -> SupervisorResult<()> {
        let mut state = self.state.lock();
        if state.line.is_some() {
            return Err(SupervisorError::resource_busy(
                "expiry interrupt already attached",
            ));
        }
        state.line = Some(line);
        Ok(())
    }

    fn detach_interrupt(&self) {
        self.state.lock().line = None;
    }
}

/// Monotonic virtual time, starting at zero.
#[derive(Debug, Default)]
pub struct VirtualClock {
    nanos: AtomicU64,
}

impl VirtualClock {
    /// Create a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    fn set(&self, now: Duration) {
        let nanos = u64::try_from(now.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(nanos, Ordering::Release);
    }
}

#[derive(Default)]
struct ManualState {
    callback: Option<RearmCallback>,
    interval: Option<Duration>,
    next_due: Option<Duration>,
    shut_down: bool,
}

/// [`RearmScheduler`] driven by virtual time.
pub struct ManualRearmScheduler {
    clock: Arc<VirtualClock>,
    state: Mutex<ManualState>,
}

impl std::fmt::Debug for ManualRearmScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualRearmScheduler")
            .field("interval", &state.interval)
            .field("next_due", &state.next_due)
            .field("shut_down", &state.shut_down)
            .finish_non_exhaustive()
    }
}

impl ManualRearmScheduler {
    /// Create a scheduler reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<VirtualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Virtual time of the next callback, if one is scheduled.
    #[must_use]
    pub fn next_due(&self) -> Option<Duration> {
        self.state.lock().next_due
    }

    /// Interval of the running schedule.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        let state = self.state.lock();
        state.next_due.and(state.interval)
    }

    /// Run the due callback and schedule the next one.
    ///
    /// The callback runs without the scheduler lock held, so it may call back
    /// into `start` or `cancel`.
    pub fn fire(&self) {
        let callback = {
            let mut state = self.state.lock();
            let (Some(due), Some(interval)) = (state.next_due, state.interval) else {
                return;
            };
            state.next_due = Some(due.saturating_add(interval));
            state.callback.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl RearmScheduler for ManualRearmScheduler {
    fn install(&self, callback: RearmCallback) {
        self.state.lock().callback = Some(callback);
    }

    fn start(&self, interval: Duration) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        state.interval = Some(interval);
        state.next_due = Some(self.clock.now().saturating_add(interval));
    }

    fn reschedule(&self, interval: Duration) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        let candidate = self.clock.now().saturating_add(interval);
        state.interval = Some(interval);
        state.next_due = Some(state.next_due.map_or(candidate, |due| due.min(candidate)));
    }

    fn cancel(&self) {
        self.state.lock().next_due = None;
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        state.next_due = None;
        state.callback = None;
    }
}

/// Simulated counter and re-arm timer sharing one virtual clock.
#[derive(Debug)]
pub struct SimulatedSystem {
    tick_frequency: u64,
    clock: Arc<VirtualClock>,
    counter: Arc<SimulatedCounter>,
    scheduler: Arc<ManualRearmScheduler>,
}

impl SimulatedSystem {
    /// Create a system whose `bits`-wide counter ticks at `tick_frequency` Hz.
    #[must_use]
    pub fn new(tick_frequency: u64, bits: u32) -> Self {
        let clock = Arc::new(VirtualClock::new());
        Self {
            tick_frequency,
            counter: Arc::new(SimulatedCounter::new(bits)),
            scheduler: Arc::new(ManualRearmScheduler::new(Arc::clone(&clock))),
            clock,
        }
    }

    /// The simulated counter.
    #[must_use]
    pub fn counter(&self) -> &Arc<SimulatedCounter> {
        &self.counter
    }

    /// The simulated re-arm timer.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<ManualRearmScheduler> {
        &self.scheduler
    }

    /// A calibrator reporting this system's tick frequency.
    #[must_use]
    pub fn calibrator(&self) -> FixedFrequency {
        FixedFrequency(self.tick_frequency)
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Advance virtual time by `duration`, firing due re-arms in order.
    pub fn advance(&self, duration: Duration) {
        let target = self.clock.now().saturating_add(duration);
        loop {
            match self.scheduler.next_due() {
                Some(due) if due <= target => {
                    self.run_until(due);
                    self.scheduler.fire();
                }
                _ => {
                    self.run_until(target);
                    break;
                }
            }
        }
    }

    fn run_until(&self, until: Duration) {
        let now = self.clock.now();
        if until <= now {
            return;
        }
        let ticks = self
            .ticks_at(until)
            .saturating_sub(self.ticks_at(now));
        self.counter.advance_ticks(ticks);
        self.clock.set(until);
    }

    fn ticks_at(&self, at: Duration) -> u64 {
        translate::ticks_for(at, self.tick_frequency, u64::BITS)
    }
}

/// [`RestartPath`] that counts attempts and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingRestart {
    attempts: Mutex<u32>,
    attempted: Condvar,
}

impl RecordingRestart {
    /// Create a restart path with no attempts recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }

    /// Block until at least `count` attempts were made, or `timeout` passes.
    #[must_use]
    pub fn wait_for_attempts(&self, count: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut attempts = self.attempts.lock();
        while *attempts < count {
            if self.attempted.wait_until(&mut attempts, deadline).timed_out() {
                return *attempts >= count;
            }
        }
        true
    }
}

impl RestartPath for RecordingRestart {
    fn restart(&self) -> Result<(), RestartError> {
        let mut attempts = self.attempts.lock();
        *attempts = attempts.saturating_add(1);
        self.attempted.notify_all();
        Ok(())
    }
}

/// [`RestartPath`] whose attempt never completes until [`release`](Self::release)d.
#[derive(Debug)]
pub struct HangingRestart {
    attempts: RecordingRestart,
    gate: Receiver<()>,
    release: Mutex<Option<Sender<()>>>,
}

impl Default for HangingRestart {
    fn default() -> Self {
        Self::new()
    }
}

impl HangingRestart {
    /// Create a hanging restart path.
    #[must_use]
    pub fn new() -> Self {
        let (tx, gate) = channel::bounded(0);
        Self {
            attempts: RecordingRestart::new(),
            gate,
            release: Mutex::new(Some(tx)),
        }
    }

    /// Attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.attempts()
    }

    /// Block until at least `count` attempts have started, or `timeout` passes.
    #[must_use]
    pub fn wait_for_attempts(&self, count: u32, timeout: Duration) -> bool {
        self.attempts.wait_for_attempts(count, timeout)
    }

    /// Let every hung attempt return with an error.
    pub fn release(&self) {
        self.release.lock().take();
    }
}

impl RestartPath for HangingRestart {
    fn restart(&self) -> Result<(), RestartError> {
        // Counting cannot fail.
        let _counted = self.attempts.restart();
        // Nothing is ever sent; this blocks until `release` drops the sender.
        let released = self.gate.recv().is_err();
        tracing::debug!(released, "Hung restart attempt returned");
        Err(RestartError::Unavailable(
            "restart attempt never completed".to_string(),
        ))
    }
}
