//! Periodic re-arm scheduling for Auto mode.
//!
//! The re-arm activity runs independently of the caller's thread of control.
//! [`ThreadRearmScheduler`] backs it with a dedicated thread fed by a command
//! channel, so starting, rescheduling, and cancelling never block.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{SupervisorError, SupervisorResult};

/// Callback invoked on every scheduled re-arm.
pub type RearmCallback = Arc<dyn Fn() + Send + Sync>;

/// A recurring timer driving Auto-mode re-arms.
pub trait RearmScheduler: Send + Sync {
    /// Install the callback fired on each period. Replaces any earlier one.
    fn install(&self, callback: RearmCallback);

    /// Start (or restart) periodic callbacks. The first fires one `interval`
    /// from now.
    fn start(&self, interval: Duration);

    /// Change the period without postponing a callback that is already due
    /// sooner. The next callback fires at the earlier of the pending due time
    /// and one `interval` from now.
    fn reschedule(&self, interval: Duration);

    /// Cancel pending callbacks. A callback already running may still finish.
    fn cancel(&self);

    /// Release the backing timer resources. The scheduler is unusable afterwards.
    fn shutdown(&self);
}

enum Command {
    Start(Duration),
    Reschedule(Duration),
    Cancel,
    Shutdown,
}

/// Thread-backed [`RearmScheduler`].
pub struct ThreadRearmScheduler {
    commands: Sender<Command>,
    callback: Arc<Mutex<Option<RearmCallback>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ThreadRearmScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadRearmScheduler")
            .field("installed", &self.callback.lock().is_some())
            .field("running", &self.worker.lock().is_some())
            .finish()
    }
}

impl ThreadRearmScheduler {
    /// Spawn the scheduler thread. No callbacks fire until [`start`](RearmScheduler::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn() -> SupervisorResult<Self> {
        let (commands, rx) = channel::unbounded();
        let callback: Arc<Mutex<Option<RearmCallback>>> = Arc::new(Mutex::new(None));
        let worker_callback = Arc::clone(&callback);

        let worker = thread::Builder::new()
            .name("wdt-rearm".to_string())
            .spawn(move || Self::worker_main(&rx, &worker_callback))
            .map_err(|e| SupervisorError::ThreadSpawn(format!("re-arm ({e})")))?;

        Ok(Self {
            commands,
            callback,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn worker_main(rx: &Receiver<Command>, callback: &Mutex<Option<RearmCallback>>) {
        tracing::debug!("Re-arm scheduler started");
        let mut interval = Duration::ZERO;
        let mut next_due: Option<Instant> = None;

        loop {
            let received = match next_due {
                Some(due) => rx.recv_timeout(due.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(RecvTimeoutError::from),
            };

            match received {
                Ok(Command::Start(period)) => {
                    interval = period;
                    next_due = Some(Instant::now() + period);
                }
                Ok(Command::Reschedule(period)) => {
                    interval = period;
                    let candidate = Instant::now() + period;
                    next_due = Some(next_due.map_or(candidate, |due| due.min(candidate)));
                }
                Ok(Command::Cancel) => next_due = None,
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let current = callback.lock().clone();
                    if let Some(fire) = current {
                        fire();
                    }
                    // Skip missed periods rather than firing a burst.
                    let now = Instant::now();
                    next_due = next_due
                        .map(|due| due + interval)
                        .filter(|due| *due > now)
                        .or(Some(now + interval));
                }
            }
        }
        tracing::debug!("Re-arm scheduler stopped");
    }
}

impl RearmScheduler for ThreadRearmScheduler {
    fn install(&self, callback: RearmCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn start(&self, interval: Duration) {
        if self.commands.send(Command::Start(interval)).is_err() {
            tracing::warn!("Re-arm scheduler is gone; start request dropped");
        }
    }

    fn reschedule(&self, interval: Duration) {
        if self.commands.send(Command::Reschedule(interval)).is_err() {
            tracing::warn!("Re-arm scheduler is gone; reschedule request dropped");
        }
    }

    fn cancel(&self) {
        if self.commands.send(Command::Cancel).is_err() {
            tracing::debug!("Re-arm scheduler is gone; nothing to cancel");
        }
    }

    fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).is_err() {
            tracing::debug!("Re-arm scheduler already stopped");
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            // The last supervisor handle can be released from inside a callback.
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::warn!("Re-arm scheduler thread panicked");
            }
        }
        self.callback.lock().take();
    }
}

impl Drop for ThreadRearmScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
