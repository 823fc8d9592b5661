//! Commonly used types.
//!
//! ```rust
//! use wdt_supervisor::prelude::*;
//!
//! let settings = SupervisorSettings::default();
//! assert_eq!(settings.stop_policy, StopPolicy::AllowStop);
//! ```

pub use crate::calibration::{ClockCalibrator, FixedFrequency, PllCalibrator, PllFields};
pub use crate::config::{StopPolicy, SupervisorSettings, WatchdogConfig};
pub use crate::device::{CounterDevice, ExpiryEvent, InterruptLine};
pub use crate::error::{
    CalibrationError, ConfigurationWarning, RestartError, SupervisorError, SupervisorResult,
};
pub use crate::escalation::RestartPath;
pub use crate::metrics::MetricsSnapshot;
pub use crate::mode::SupervisorMode;
pub use crate::schedule::{RearmScheduler, ThreadRearmScheduler};
pub use crate::session::{MAGIC_CLOSE, WatchdogSession};
pub use crate::shutdown::{ShutdownGuard, ShutdownHook};
pub use crate::supervisor::{Supervisor, TimeoutOutcome, WatchdogInfo};
