//! System shutdown hook.
//!
//! When a controlled shutdown or reboot begins, the external caller that was
//! pinging in User mode is about to be stopped along with everything else.
//! [`ShutdownGuard`] hands servicing back to the supervisor first so the
//! counter cannot fire halfway through an orderly shutdown.

use std::sync::Weak;

use crate::supervisor::SupervisorCore;

/// Notification that a controlled shutdown is starting.
pub trait ShutdownHook: Send + Sync {
    /// Called once at the beginning of a system shutdown or reboot.
    fn on_system_shutdown_begin(&self);
}

/// Forces Auto mode when the system starts shutting down.
///
/// Obtained from [`Supervisor::shutdown_guard`](crate::Supervisor::shutdown_guard).
/// The guard does not keep the supervisor alive; after the supervisor is
/// gone it does nothing.
#[derive(Clone)]
pub struct ShutdownGuard {
    core: Weak<SupervisorCore>,
}

impl std::fmt::Debug for ShutdownGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownGuard")
            .field("attached", &(self.core.strong_count() > 0))
            .finish()
    }
}

impl ShutdownGuard {
    pub(crate) fn new(core: Weak<SupervisorCore>) -> Self {
        Self { core }
    }

    /// Returns `true` while the supervisor still exists.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.core.strong_count() > 0
    }
}

impl ShutdownHook for ShutdownGuard {
    fn on_system_shutdown_begin(&self) {
        let Some(core) = self.core.upgrade() else {
            tracing::debug!("Shutdown hook fired after supervisor teardown");
            return;
        };
        // Applies under every stop policy.
        core.enter_auto_mode();
        tracing::info!("System shutdown beginning; watchdog returned to auto mode");
    }
}
