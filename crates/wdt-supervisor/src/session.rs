//! Exclusive caller session with magic-close semantics.
//!
//! Opening a session enters User mode. Each [`WatchdogSession::write`] counts
//! as a ping. Releasing the session only hands servicing back to the
//! supervisor if the last write contained [`MAGIC_CLOSE`] and the stop
//! policy allows stopping; any other release is treated as the caller having
//! died, and User mode stays in force so the counter fires.

use std::time::Duration;

use crate::error::SupervisorResult;
use crate::supervisor::{Supervisor, TimeoutOutcome, WatchdogInfo};

/// Character that announces an intentional close.
pub const MAGIC_CLOSE: u8 = b'V';

/// Handle held by the single external caller responsible for pinging.
#[derive(Debug)]
pub struct WatchdogSession<'a> {
    supervisor: &'a Supervisor,
    expect_close: bool,
    released: bool,
}

impl<'a> WatchdogSession<'a> {
    pub(crate) fn new(supervisor: &'a Supervisor) -> Self {
        Self {
            supervisor,
            expect_close: false,
            released: false,
        }
    }

    /// Ping the watchdog. Returns the number of bytes consumed.
    ///
    /// A write containing [`MAGIC_CLOSE`] arms a clean close; a later write
    /// without it disarms the close again.
    ///
    /// # Errors
    ///
    /// Propagates [`Supervisor::ping`] failures.
    pub fn write(&mut self, data: &[u8]) -> SupervisorResult<usize> {
        if !data.is_empty() {
            self.expect_close =
                self.supervisor.stop_policy().allows_stop() && data.contains(&MAGIC_CLOSE);
            self.supervisor.ping()?;
        }
        Ok(data.len())
    }

    /// Ping without touching the close state.
    ///
    /// # Errors
    ///
    /// Propagates [`Supervisor::ping`] failures.
    pub fn ping(&self) -> SupervisorResult<()> {
        self.supervisor.ping()
    }

    /// See [`Supervisor::set_timeout`].
    pub fn set_timeout(&self, requested: Duration) -> TimeoutOutcome {
        self.supervisor.set_timeout(requested)
    }

    /// Timeout in force.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.supervisor.timeout()
    }

    /// See [`Supervisor::info`].
    #[must_use]
    pub fn info(&self) -> WatchdogInfo {
        self.supervisor.info()
    }

    /// Returns `true` if releasing now would stop the watchdog.
    #[must_use]
    pub fn expects_close(&self) -> bool {
        self.expect_close
    }

    /// Release the session.
    ///
    /// # Errors
    ///
    /// Propagates [`Supervisor::stop`] failures. The session is released
    /// either way.
    pub fn close(mut self) -> SupervisorResult<()> {
        self.release()
    }

    fn release(&mut self) -> SupervisorResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let result = if self.expect_close {
            self.supervisor.stop()
        } else {
            tracing::warn!(
                mode = %self.supervisor.mode(),
                "Unexpected close, not stopping watchdog"
            );
            Ok(())
        };
        self.supervisor.close_session();
        result
    }
}

impl Drop for WatchdogSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "Watchdog session release failed");
        }
    }
}
