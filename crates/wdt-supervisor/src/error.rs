//! Error types for the watchdog supervisor.
//!
//! Calibration and resource acquisition failures are fatal to startup.
//! Out-of-range timeouts are not errors at all: they are clamped and the
//! caller receives a [`ConfigurationWarning`] next to the applied value.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`ClockCalibrator`](crate::calibration::ClockCalibrator).
///
/// There is no safe default tick frequency, so every variant aborts
/// supervisor initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    /// The PLL divider field read back as zero.
    #[error("PLL divider field reads zero")]
    ZeroDivider,

    /// The PLL multiplier field read back as zero.
    #[error("PLL multiplier field reads zero")]
    ZeroMultiplier,

    /// The reference oscillator frequency read back as zero.
    #[error("reference clock frequency reads zero")]
    ZeroReference,

    /// The derived tick frequency is zero.
    #[error("measured tick frequency is zero")]
    ZeroFrequency,

    /// The frequency computation does not fit in 64 bits.
    #[error("tick frequency computation overflowed")]
    Overflow,

    /// The frequency-control registers disagree with each other.
    #[error("inconsistent clock registers: {0}")]
    Inconsistent(String),
}

impl CalibrationError {
    /// Create an inconsistent-registers error.
    #[must_use]
    pub fn inconsistent(reason: impl Into<String>) -> Self {
        Self::Inconsistent(reason.into())
    }
}

/// Errors returned by the supervisor and its public surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// Clock calibration failed during startup.
    #[error("clock calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    /// The interrupt line, timer, or session is already held by someone else.
    #[error("resource busy: {0}")]
    ResourceBusy(String),

    /// Settings or hardware parameters cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The host policy forbids leaving User mode.
    #[error("stopping the watchdog is forbidden by policy")]
    StopForbidden,

    /// An external liveness operation was issued outside User mode.
    #[error("watchdog has not been started in user mode")]
    NotStarted,

    /// A supervisor worker thread could not be spawned.
    #[error("failed to spawn {0} thread")]
    ThreadSpawn(String),
}

impl SupervisorError {
    /// Create a resource busy error.
    #[must_use]
    pub fn resource_busy(resource: impl Into<String>) -> Self {
        Self::ResourceBusy(resource.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Returns `true` if this error prevents the supervisor from starting.
    #[must_use]
    pub fn is_fatal_to_startup(&self) -> bool {
        matches!(
            self,
            Self::Calibration(_)
                | Self::ResourceBusy(_)
                | Self::InvalidConfiguration(_)
                | Self::ThreadSpawn(_)
        )
    }
}

/// Non-fatal notice that a requested timeout was clamped into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigurationWarning {
    /// The request was shorter than the minimum timeout.
    #[error("requested timeout {requested:?} is below the minimum, applied {applied:?}")]
    BelowMinimum {
        /// What the caller asked for.
        requested: Duration,
        /// What was programmed instead.
        applied: Duration,
    },

    /// The request was longer than the counter can represent.
    #[error("requested timeout {requested:?} exceeds the maximum, applied {applied:?}")]
    AboveMaximum {
        /// What the caller asked for.
        requested: Duration,
        /// What was programmed instead.
        applied: Duration,
    },
}

impl ConfigurationWarning {
    /// The timeout the caller asked for.
    #[must_use]
    pub fn requested(&self) -> Duration {
        match self {
            Self::BelowMinimum { requested, .. } | Self::AboveMaximum { requested, .. } => {
                *requested
            }
        }
    }

    /// The timeout that was actually applied.
    #[must_use]
    pub fn applied(&self) -> Duration {
        match self {
            Self::BelowMinimum { applied, .. } | Self::AboveMaximum { applied, .. } => *applied,
        }
    }
}

/// Errors a [`RestartPath`](crate::escalation::RestartPath) may report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestartError {
    /// No restart mechanism is reachable.
    #[error("restart path unavailable: {0}")]
    Unavailable(String),

    /// The surrounding system declined to restart.
    #[error("restart refused: {0}")]
    Refused(String),
}

/// A specialized `Result` type for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
