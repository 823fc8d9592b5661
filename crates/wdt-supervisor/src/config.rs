//! Configuration types for the watchdog supervisor.
//!
//! [`SupervisorSettings`] is what the host supplies (and may load from JSON).
//! [`WatchdogConfig`] is what the supervisor derives from those settings once
//! the tick frequency has been calibrated.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigurationWarning, SupervisorError, SupervisorResult};
use crate::translate;

/// Default lower bound for any timeout.
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout used until a caller configures one.
pub const DEFAULT_INITIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default identity reported by [`Supervisor::info`](crate::Supervisor::info).
pub const DEFAULT_IDENTITY: &str = "wdt-supervisor";

/// Whether callers may leave User mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// `stop()` hands servicing back to the supervisor. The counter stays armed.
    #[default]
    AllowStop,
    /// `stop()` is rejected; once started, User mode can only be left by a
    /// system shutdown.
    NoWayOut,
}

impl StopPolicy {
    /// Returns `true` if `stop()` is permitted.
    #[must_use]
    pub fn allows_stop(self) -> bool {
        matches!(self, Self::AllowStop)
    }
}

/// Host-supplied supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Shortest timeout a caller may configure, in whole seconds when serialized.
    #[serde(with = "duration_secs")]
    pub min_timeout: Duration,

    /// Timeout applied at startup, clamped against the calibrated bounds.
    #[serde(with = "duration_secs")]
    pub initial_timeout: Duration,

    /// Policy for `stop()`.
    pub stop_policy: StopPolicy,

    /// Identity string reported in [`WatchdogInfo`](crate::WatchdogInfo).
    pub identity: String,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            min_timeout: DEFAULT_MIN_TIMEOUT,
            initial_timeout: DEFAULT_INITIAL_TIMEOUT,
            stop_policy: StopPolicy::default(),
            identity: DEFAULT_IDENTITY.to_string(),
        }
    }
}

impl SupervisorSettings {
    /// Create a settings builder.
    #[must_use]
    pub fn builder() -> SupervisorSettingsBuilder {
        SupervisorSettingsBuilder::default()
    }

    /// Parse settings from a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_json_str(json: &str) -> SupervisorResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| SupervisorError::invalid_configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is unusable.
    pub fn validate(&self) -> SupervisorResult<()> {
        if self.min_timeout < DEFAULT_MIN_TIMEOUT {
            return Err(SupervisorError::invalid_configuration(
                "min_timeout must be at least 1 second",
            ));
        }
        if self.min_timeout.subsec_nanos() != 0 || self.initial_timeout.subsec_nanos() != 0 {
            return Err(SupervisorError::invalid_configuration(
                "min_timeout and initial_timeout must be whole seconds",
            ));
        }
        if self.identity.trim().is_empty() {
            return Err(SupervisorError::invalid_configuration(
                "identity must not be empty",
            ));
        }
        Ok(())
    }
}

/// Builder for [`SupervisorSettings`].
#[derive(Debug, Default)]
pub struct SupervisorSettingsBuilder {
    settings: SupervisorSettings,
}

impl SupervisorSettingsBuilder {
    /// Set the minimum timeout.
    #[must_use]
    pub fn min_timeout(mut self, timeout: Duration) -> Self {
        self.settings.min_timeout = timeout;
        self
    }

    /// Set the timeout applied at startup.
    #[must_use]
    pub fn initial_timeout(mut self, timeout: Duration) -> Self {
        self.settings.initial_timeout = timeout;
        self
    }

    /// Set the stop policy.
    #[must_use]
    pub fn stop_policy(mut self, policy: StopPolicy) -> Self {
        self.settings.stop_policy = policy;
        self
    }

    /// Set the reported identity.
    #[must_use]
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.settings.identity = identity.into();
        self
    }

    /// Build the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid.
    pub fn build(self) -> SupervisorResult<SupervisorSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// Calibrated timeout bounds owned by the supervisor.
///
/// Invariant: `min_timeout <= current_timeout <= max_timeout`. `max_timeout`
/// and `tick_frequency` never change after calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Shortest allowed timeout.
    pub min_timeout: Duration,
    /// Longest timeout the counter can represent.
    pub max_timeout: Duration,
    /// Timeout currently in force.
    pub current_timeout: Duration,
    /// Counter ticks per second.
    pub tick_frequency: u64,
    /// Width of the hardware counter.
    pub counter_bits: u32,
}

impl WatchdogConfig {
    /// Derive the runtime configuration from settings and a calibration reading.
    ///
    /// The initial timeout is clamped like any other request; the warning, if
    /// any, is returned next to the config.
    ///
    /// # Errors
    ///
    /// Returns an error if the frequency is zero, the counter width is outside
    /// `1..=64`, or the counter cannot represent even the minimum timeout.
    pub fn calibrated(
        settings: &SupervisorSettings,
        tick_frequency: u64,
        counter_bits: u32,
    ) -> SupervisorResult<(Self, Option<ConfigurationWarning>)> {
        if tick_frequency == 0 {
            return Err(crate::error::CalibrationError::ZeroFrequency.into());
        }
        if !(1..=64).contains(&counter_bits) {
            return Err(SupervisorError::invalid_configuration(format!(
                "counter width of {counter_bits} bits is not supported"
            )));
        }

        let max_timeout = translate::max_timeout(tick_frequency, counter_bits);
        if max_timeout < settings.min_timeout {
            return Err(SupervisorError::invalid_configuration(format!(
                "counter saturates after {max_timeout:?}, below the minimum timeout of {:?}",
                settings.min_timeout
            )));
        }

        let (current_timeout, warning) =
            translate::clamp(settings.initial_timeout, settings.min_timeout, max_timeout);

        Ok((
            Self {
                min_timeout: settings.min_timeout,
                max_timeout,
                current_timeout,
                tick_frequency,
                counter_bits,
            },
            warning,
        ))
    }

    /// Maximum value the compare register accepts.
    #[must_use]
    pub fn counter_max(&self) -> u64 {
        translate::counter_max_value(self.counter_bits)
    }

    /// Ticks corresponding to `duration` on this counter.
    #[must_use]
    pub fn ticks_for(&self, duration: Duration) -> u64 {
        translate::ticks_for(duration, self.tick_frequency, self.counter_bits)
    }

    /// Clamp `requested` against this config's bounds.
    #[must_use]
    pub fn clamp(&self, requested: Duration) -> (Duration, Option<ConfigurationWarning>) {
        translate::clamp(requested, self.min_timeout, self.max_timeout)
    }
}

/// Serde adapter writing durations as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as integer seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    /// Deserialize from integer seconds.
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Serde adapter writing durations as fractional seconds.
pub mod duration_secs_f64 {
    use serde::Serializer;
    use std::time::Duration;

    /// Serialize as floating-point seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
