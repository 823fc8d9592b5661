//! Timeout translation between logical durations and raw counter ticks.
//!
//! All arithmetic is done in `u128` nanoseconds and saturates at the
//! counter's maximum representable value, so no input can program a compare
//! value the hardware cannot hold.

use std::time::Duration;

use crate::error::ConfigurationWarning;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Largest value a counter of `counter_bits` width can hold.
///
/// Widths of 64 or more saturate at `u64::MAX`; a width of zero holds only `0`.
#[must_use]
pub fn counter_max_value(counter_bits: u32) -> u64 {
    match counter_bits {
        0 => 0,
        bits if bits >= u64::BITS => u64::MAX,
        bits => (1u64 << bits) - 1,
    }
}

/// Convert `duration` into counter ticks at `tick_frequency` Hz.
///
/// Sub-second parts are honoured; the result is rounded down and saturates at
/// [`counter_max_value`].
#[must_use]
pub fn ticks_for(duration: Duration, tick_frequency: u64, counter_bits: u32) -> u64 {
    let ticks = duration
        .as_nanos()
        .saturating_mul(u128::from(tick_frequency))
        / NANOS_PER_SEC;
    let max = counter_max_value(counter_bits);
    u64::try_from(ticks).map_or(max, |t| t.min(max))
}

/// Duration covered by `ticks` counter increments.
///
/// Rounded down to the nanosecond, so converting the result back with
/// [`ticks_for`] never yields more than `ticks`. A zero frequency yields
/// [`Duration::ZERO`].
#[must_use]
pub fn duration_for(ticks: u64, tick_frequency: u64) -> Duration {
    if tick_frequency == 0 {
        return Duration::ZERO;
    }
    let nanos = u128::from(ticks).saturating_mul(NANOS_PER_SEC) / u128::from(tick_frequency);
    let secs = nanos / NANOS_PER_SEC;
    let sub = nanos % NANOS_PER_SEC;
    match u64::try_from(secs) {
        // `sub` is below one billion so the cast is lossless.
        Ok(secs) => Duration::new(secs, u32::try_from(sub).unwrap_or(0)),
        Err(_) => Duration::MAX,
    }
}

/// Longest timeout a `counter_bits`-wide counter can express at `tick_frequency`.
#[must_use]
pub fn max_timeout(tick_frequency: u64, counter_bits: u32) -> Duration {
    duration_for(counter_max_value(counter_bits), tick_frequency)
}

/// Clamp `requested` into `[min, max]`.
///
/// Out-of-range requests are not rejected: the nearest bound is applied and a
/// warning describes what happened.
#[must_use]
pub fn clamp(
    requested: Duration,
    min: Duration,
    max: Duration,
) -> (Duration, Option<ConfigurationWarning>) {
    if requested < min {
        (
            min,
            Some(ConfigurationWarning::BelowMinimum {
                requested,
                applied: min,
            }),
        )
    } else if requested > max {
        (
            max,
            Some(ConfigurationWarning::AboveMaximum {
                requested,
                applied: max,
            }),
        )
    } else {
        (requested, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREQ_166_MHZ: u64 = 166_000_000;

    #[test]
    fn test_counter_max_value() {
        assert_eq!(counter_max_value(0), 0);
        assert_eq!(counter_max_value(1), 1);
        assert_eq!(counter_max_value(32), u64::from(u32::MAX));
        assert_eq!(counter_max_value(64), u64::MAX);
        assert_eq!(counter_max_value(80), u64::MAX);
    }

    #[test]
    fn test_max_timeout_32_bit_166_mhz() {
        let max = max_timeout(FREQ_166_MHZ, 32);
        assert_eq!(max.as_secs(), 25);
        let hundredths = max.subsec_millis() / 10;
        assert_eq!(hundredths, 87);
    }

    #[test]
    fn test_ticks_for_whole_seconds() {
        assert_eq!(
            ticks_for(Duration::from_secs(5), FREQ_166_MHZ, 32),
            830_000_000
        );
        assert_eq!(ticks_for(Duration::ZERO, FREQ_166_MHZ, 32), 0);
    }

    #[test]
    fn test_ticks_for_saturates() {
        assert_eq!(
            ticks_for(Duration::from_secs(60), FREQ_166_MHZ, 32),
            u64::from(u32::MAX)
        );
        assert_eq!(ticks_for(Duration::MAX, u64::MAX, 64), u64::MAX);
    }

    #[test]
    fn test_ticks_for_max_timeout_fits() {
        let max = max_timeout(FREQ_166_MHZ, 32);
        assert!(ticks_for(max, FREQ_166_MHZ, 32) <= counter_max_value(32));
    }

    #[test]
    fn test_duration_for_zero_frequency() {
        assert_eq!(duration_for(1000, 0), Duration::ZERO);
    }

    #[test]
    fn test_clamp_in_range() {
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(25);
        assert_eq!(clamp(Duration::from_secs(10), min, max), (Duration::from_secs(10), None));
        assert_eq!(clamp(min, min, max), (min, None));
        assert_eq!(clamp(max, min, max), (max, None));
    }

    #[test]
    fn test_clamp_above_maximum() {
        let (applied, warning) = clamp(
            Duration::from_secs(40),
            Duration::from_secs(1),
            Duration::from_secs(25),
        );
        assert_eq!(applied, Duration::from_secs(25));
        assert!(matches!(
            warning,
            Some(ConfigurationWarning::AboveMaximum { .. })
        ));
    }

    #[test]
    fn test_clamp_below_minimum() {
        let (applied, warning) = clamp(
            Duration::from_millis(200),
            Duration::from_secs(1),
            Duration::from_secs(25),
        );
        assert_eq!(applied, Duration::from_secs(1));
        assert!(matches!(
            warning,
            Some(ConfigurationWarning::BelowMinimum { .. })
        ));
    }
}
