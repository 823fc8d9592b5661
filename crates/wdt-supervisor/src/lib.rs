//! # wdt-supervisor
//!
//! Supervisor for a hardware watchdog built on a free-running counter with a
//! programmable compare register.
//!
//! The crate provides:
//! - [`Supervisor`], which calibrates the counter, arms it at construction
//!   and keeps it serviced in Auto mode until a caller takes over
//! - a two-mode state machine ([`mode`]) with Auto re-arming three times per
//!   timeout window
//! - two-tier expiry escalation ([`escalation`]): one graceful restart
//!   attempt, then the hardware's own secondary reset
//! - a [`ShutdownGuard`] that hands servicing back before a controlled
//!   shutdown, and an exclusive [`WatchdogSession`] with magic close
//! - simulated hardware on virtual time ([`sim`]) for tests and tooling
//!
//! ## Modes
//!
//! ```text
//!   ┌──────┐  start / open_session  ┌──────┐
//!   │ Auto │ ─────────────────────► │ User │ ◄─┐ ping
//!   └──────┘ ◄───────────────────── └──────┘ ──┘
//!       stop, magic close, system shutdown
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wdt_supervisor::prelude::*;
//! use wdt_supervisor::sim::{RecordingRestart, SimulatedSystem};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let system = SimulatedSystem::new(166_000_000, 32);
//! let supervisor = Supervisor::builder()
//!     .calibrator(system.calibrator())
//!     .device(system.counter().clone())
//!     .scheduler(system.scheduler().clone())
//!     .restart_path(Arc::new(RecordingRestart::new()))
//!     .build()?;
//!
//! let outcome = supervisor.set_timeout(Duration::from_secs(40));
//! assert!(outcome.is_clamped());
//!
//! supervisor.start(None)?;
//! system.advance(Duration::from_secs(10));
//! supervisor.ping()?;
//! assert_eq!(system.counter().expiries(), 0);
//! # Ok(())
//! # }
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod calibration;
pub mod config;
pub mod device;
pub mod error;
pub mod escalation;
pub mod metrics;
pub mod mode;
pub mod prelude;
pub mod schedule;
pub mod session;
pub mod shutdown;
pub mod sim;
pub mod supervisor;
pub mod translate;

pub use config::{StopPolicy, SupervisorSettings, WatchdogConfig};
pub use error::{ConfigurationWarning, SupervisorError, SupervisorResult};
pub use mode::SupervisorMode;
pub use session::WatchdogSession;
pub use shutdown::{ShutdownGuard, ShutdownHook};
pub use supervisor::{Supervisor, SupervisorBuilder, TimeoutOutcome, WatchdogInfo};
