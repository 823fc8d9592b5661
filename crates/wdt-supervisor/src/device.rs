//! Counter device capability.
//!
//! The supervisor never touches memory-mapped registers directly. It drives
//! a [`CounterDevice`]: a free-running counter with a compare register that
//! raises an [`ExpiryEvent`] on its interrupt line when the count reaches the
//! compare value.
//!
//! The counter is write-only from the supervisor's point of view; there is no
//! way to read back the time remaining.

use crossbeam::channel::Sender;

use crate::error::SupervisorResult;

/// The counter reached its compare value without an intervening reset.
///
/// Carries no data. Delivered once per hardware firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpiryEvent;

/// Sending half of the expiry interrupt line.
pub type InterruptLine = Sender<ExpiryEvent>;

/// A hardware watchdog counter with a programmable compare register.
///
/// Implementations must tolerate being called from the supervisor's caller
/// thread and its re-arm thread; the supervisor serializes those calls, so
/// implementations only need interior mutability, not their own ordering.
pub trait CounterDevice: Send + Sync {
    /// Width of the free-running counter in bits.
    fn counter_bits(&self) -> u32;

    /// Program the compare register. Values are already clamped to the
    /// counter's range.
    fn set_compare(&self, ticks: u64);

    /// Reset the live count to zero.
    fn reset_count(&self);

    /// Stop the counter from ever firing. Only used at teardown on a halting
    /// system.
    fn disarm(&self);

    /// Route expiry interrupts to `line`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::ResourceBusy`](crate::SupervisorError::ResourceBusy)
    /// if another consumer already owns the interrupt.
    fn attach_interrupt(&self, line: InterruptLine) -> SupervisorResult<()>;

    /// Release the interrupt line. Pending events are dropped.
    fn detach_interrupt(&self);
}
