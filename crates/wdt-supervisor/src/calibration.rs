//! Tick frequency calibration.
//!
//! The supervisor asks a [`ClockCalibrator`] for the counter's tick frequency
//! exactly once, before any timeout is programmed. A failed calibration is
//! fatal: there is no frequency that would be safe to guess.

use crate::error::CalibrationError;

/// Measures the tick frequency of the watchdog counter.
pub trait ClockCalibrator {
    /// Return the counter's ticks per second.
    ///
    /// # Errors
    ///
    /// Returns an error if the frequency-control registers read back zero or
    /// inconsistent values.
    fn measure_tick_frequency(&self) -> Result<u64, CalibrationError>;
}

/// Calibrator for a counter driven by a known, fixed clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFrequency(pub u64);

impl ClockCalibrator for FixedFrequency {
    fn measure_tick_frequency(&self) -> Result<u64, CalibrationError> {
        if self.0 == 0 {
            return Err(CalibrationError::ZeroFrequency);
        }
        Ok(self.0)
    }
}

/// Raw PLL field values feeding the counter clock.
///
/// The output frequency is
/// `reference_hz * multiplier / (divider << post_divider_shift)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllFields {
    /// Reference oscillator frequency in Hz.
    pub reference_hz: u64,
    /// Feedback multiplier (N).
    pub multiplier: u32,
    /// Input divider (M).
    pub divider: u32,
    /// Power-of-two output divider exponent (P).
    pub post_divider_shift: u32,
}

impl PllFields {
    /// Compute the output frequency these fields describe.
    ///
    /// # Errors
    ///
    /// Returns an error for zero fields, arithmetic overflow, or a result
    /// that rounds down to zero.
    pub fn output_frequency(&self) -> Result<u64, CalibrationError> {
        if self.reference_hz == 0 {
            return Err(CalibrationError::ZeroReference);
        }
        if self.multiplier == 0 {
            return Err(CalibrationError::ZeroMultiplier);
        }
        if self.divider == 0 {
            return Err(CalibrationError::ZeroDivider);
        }
        if self.post_divider_shift >= u64::BITS {
            return Err(CalibrationError::inconsistent(format!(
                "post divider shift {} is wider than the clock path",
                self.post_divider_shift
            )));
        }

        let numerator = self
            .reference_hz
            .checked_mul(u64::from(self.multiplier))
            .ok_or(CalibrationError::Overflow)?;
        let denominator = u64::from(self.divider)
            .checked_shl(self.post_divider_shift)
            .filter(|d| d >> self.post_divider_shift == u64::from(self.divider))
            .ok_or(CalibrationError::Overflow)?;

        match numerator / denominator {
            0 => Err(CalibrationError::ZeroFrequency),
            hz => Ok(hz),
        }
    }
}

/// Read access to the PLL configuration registers.
pub trait PllRegisters {
    /// Snapshot the PLL fields.
    fn read_pll(&self) -> PllFields;
}

impl PllRegisters for PllFields {
    fn read_pll(&self) -> PllFields {
        *self
    }
}

/// Calibrator deriving the tick frequency from live PLL fields.
///
/// The registers are read twice; differing snapshots mean the clock tree is
/// being reprogrammed underneath us and the reading is rejected.
#[derive(Debug, Clone)]
pub struct PllCalibrator<R> {
    registers: R,
}

impl<R: PllRegisters> PllCalibrator<R> {
    /// Create a calibrator over `registers`.
    #[must_use]
    pub fn new(registers: R) -> Self {
        Self { registers }
    }
}

impl<R: PllRegisters> ClockCalibrator for PllCalibrator<R> {
    fn measure_tick_frequency(&self) -> Result<u64, CalibrationError> {
        let first = self.registers.read_pll();
        let second = self.registers.read_pll();
        if first != second {
            return Err(CalibrationError::inconsistent(
                "PLL fields changed between consecutive reads",
            ));
        }
        let hz = first.output_frequency()?;
        tracing::info!(
            tick_frequency = hz,
            reference_hz = first.reference_hz,
            multiplier = first.multiplier,
            divider = first.divider,
            post_divider_shift = first.post_divider_shift,
            "Calibrated watchdog tick frequency"
        );
        Ok(hz)
    }
}
