//! Expiry escalation.
//!
//! When the counter fires, the handler logs the expiry, asks the surrounding
//! system for a graceful restart, and then simply returns. It never retries
//! and never touches the counter: if the restart attempt hangs or fails, the
//! counter keeps running unserviced and the hardware's secondary reset fires
//! one more timeout later.
//!
//! The handler runs on its own dispatcher thread and reads only lock-free
//! state, so a caller stuck while holding the supervisor lock cannot stop
//! escalation.

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::device::ExpiryEvent;
use crate::error::{RestartError, SupervisorError, SupervisorResult};
use crate::metrics::SupervisorMetrics;

/// The surrounding system's standard restart path.
pub trait RestartPath: Send + Sync {
    /// Request a graceful system restart.
    ///
    /// May block indefinitely on a badly broken system.
    ///
    /// # Errors
    ///
    /// Returns an error if the restart could not be initiated.
    fn restart(&self) -> Result<(), RestartError>;
}

/// What happened to a restart attempt that returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// The restart was initiated.
    RestartInitiated,
    /// The restart path reported a failure; the hardware reset is now the
    /// only way out.
    RestartFailed(RestartError),
}

/// Lock-free view of the timeout in force, shared with the escalation path.
#[derive(Debug)]
pub struct TimeoutMirror {
    nanos: AtomicU64,
}

impl TimeoutMirror {
    /// Create a mirror holding `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let mirror = Self {
            nanos: AtomicU64::new(0),
        };
        mirror.store(timeout);
        mirror
    }

    /// Publish a new timeout.
    pub fn store(&self, timeout: Duration) {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(nanos, Ordering::Release);
    }

    /// Read the published timeout.
    #[must_use]
    pub fn load(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Reacts to delivered [`ExpiryEvent`]s.
pub struct EscalationHandler {
    restart: Arc<dyn RestartPath>,
    timeout: Arc<TimeoutMirror>,
    metrics: Arc<SupervisorMetrics>,
}

impl std::fmt::Debug for EscalationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationHandler")
            .field("timeout", &self.timeout.load())
            .finish_non_exhaustive()
    }
}

impl EscalationHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(
        restart: Arc<dyn RestartPath>,
        timeout: Arc<TimeoutMirror>,
        metrics: Arc<SupervisorMetrics>,
    ) -> Self {
        Self {
            restart,
            timeout,
            metrics,
        }
    }

    /// Handle one expiry: log, attempt a graceful restart once, return.
    pub fn handle(&self, _event: ExpiryEvent) -> EscalationOutcome {
        let fallback = self.timeout.load();
        self.metrics.record_expiry();
        tracing::error!(
            timeout_secs = fallback.as_secs_f64(),
            "Watchdog expired without acknowledgement; attempting graceful restart"
        );

        self.metrics.record_restart_attempt();
        match self.restart.restart() {
            Ok(()) => {
                tracing::info!(
                    fallback_secs = fallback.as_secs_f64(),
                    "Graceful restart initiated; hardware reset remains armed as fallback"
                );
                EscalationOutcome::RestartInitiated
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    fallback_secs = fallback.as_secs_f64(),
                    "Graceful restart failed; relying on hardware reset"
                );
                EscalationOutcome::RestartFailed(e)
            }
        }
    }
}

/// How long teardown waits for the dispatcher to drain before detaching it.
const RELEASE_GRACE: Duration = Duration::from_millis(100);

/// Thread delivering expiry interrupts to an [`EscalationHandler`].
#[derive(Debug)]
pub struct ExpiryDispatcher {
    worker: Option<JoinHandle<()>>,
    exited: Receiver<()>,
}

impl ExpiryDispatcher {
    /// Spawn the dispatcher. It runs until every sender of `events` is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(events: Receiver<ExpiryEvent>, handler: EscalationHandler) -> SupervisorResult<Self> {
        let (exit_signal, exited) = channel::bounded::<()>(0);
        let worker = thread::Builder::new()
            .name("wdt-expiry".to_string())
            .spawn(move || {
                let _exit_signal = exit_signal;
                for event in events.iter() {
                    let _outcome = handler.handle(event);
                }
                tracing::debug!("Expiry dispatcher stopped");
            })
            .map_err(|e| SupervisorError::ThreadSpawn(format!("expiry dispatcher ({e})")))?;

        Ok(Self {
            worker: Some(worker),
            exited,
        })
    }

    /// Join the dispatcher once its event source is closed.
    ///
    /// A dispatcher stuck in a hung restart attempt is detached rather than
    /// waited on.
    pub fn release(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        match self.exited.recv_timeout(RELEASE_GRACE) {
            Err(RecvTimeoutError::Disconnected) => {
                if worker.join().is_err() {
                    tracing::warn!("Expiry dispatcher thread panicked");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("Expiry dispatcher still busy; detaching it");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingRestart;

    struct Refusing;

    impl RestartPath for Refusing {
        fn restart(&self) -> Result<(), RestartError> {
            Err(RestartError::Refused("shutdown already in progress".into()))
        }
    }

    fn handler(restart: Arc<dyn RestartPath>) -> (EscalationHandler, Arc<SupervisorMetrics>) {
        let metrics = Arc::new(SupervisorMetrics::new());
        let handler = EscalationHandler::new(
            restart,
            Arc::new(TimeoutMirror::new(Duration::from_secs(2))),
            Arc::clone(&metrics),
        );
        (handler, metrics)
    }

    #[test]
    fn test_handle_attempts_restart_once() {
        let restart = Arc::new(RecordingRestart::new());
        let (handler, metrics) = handler(restart.clone());

        assert_eq!(
            handler.handle(ExpiryEvent),
            EscalationOutcome::RestartInitiated
        );
        assert_eq!(restart.attempts(), 1);
        assert_eq!(metrics.snapshot().expiries, 1);
        assert_eq!(metrics.snapshot().restart_attempts, 1);
    }

    #[test]
    fn test_failed_restart_is_not_retried() {
        let (handler, metrics) = handler(Arc::new(Refusing));

        let outcome = handler.handle(ExpiryEvent);
        assert!(matches!(outcome, EscalationOutcome::RestartFailed(_)));
        assert_eq!(metrics.snapshot().restart_attempts, 1);
    }

    #[test]
    fn test_timeout_mirror() {
        let mirror = TimeoutMirror::new(Duration::from_millis(2500));
        assert_eq!(mirror.load(), Duration::from_millis(2500));
        mirror.store(Duration::from_secs(9));
        assert_eq!(mirror.load(), Duration::from_secs(9));
    }

    #[test]
    fn test_dispatcher_delivers_events() -> Result<(), Box<dyn std::error::Error>> {
        let restart = Arc::new(RecordingRestart::new());
        let (handler, _) = handler(restart.clone());
        let (tx, rx) = crossbeam::channel::bounded(4);
        let mut dispatcher = ExpiryDispatcher::spawn(rx, handler)?;

        tx.send(ExpiryEvent)?;
        assert!(restart.wait_for_attempts(1, Duration::from_secs(2)));

        drop(tx);
        dispatcher.release();
        Ok(())
    }
}
