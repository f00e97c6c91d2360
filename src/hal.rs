//! Hardware abstraction boundary (spec §6.1).
//!
//! This is the *entire* surface the link-layer core requires from the
//! platform: drive the single open-collector wire, sample it, read a
//! free-running timer, and schedule/mask the two interrupt sources the core
//! is built around. Pin muxing, timer prescaler selection and the NVIC are
//! the platform collaborator's job, not this crate's.

/// The minimal hardware surface CLUNET needs from a platform.
///
/// Implementors own exactly one GPIO pin wired as an open-collector output
/// with its own input buffer (or two pins tied together on the same net),
/// one free-running 8-bit timer, and one edge-triggered interrupt source on
/// that pin.
pub trait ClunetHal {
    /// Drive the wire low (dominant).
    fn pull_low(&mut self);

    /// Release the wire; the external pull-up makes it recessive (high).
    fn release(&mut self);

    /// Sample the current line state. `true` means the wire is driven low
    /// by *some* station (ourselves or another).
    fn is_low(&self) -> bool;

    /// The free-running timer's current value.
    fn now(&self) -> u8;

    /// Arm the timer-compare interrupt to fire `ticks` timer ticks from now.
    fn schedule_compare_in(&mut self, ticks: u8);

    /// Mask the timer-compare interrupt.
    fn disable_compare(&mut self);

    /// Unmask the timer-compare interrupt.
    fn enable_compare(&mut self);

    /// Mask the line edge interrupt.
    fn edge_interrupt_disable(&mut self);

    /// Unmask the line edge interrupt.
    fn edge_interrupt_enable(&mut self);

    /// The platform's reset-cause byte, sampled once at startup and carried
    /// in the `BOOT_COMPLETED` broadcast frame.
    fn reset_cause(&self) -> u8;

    /// Clear the platform's latched reset-cause register, mirroring the
    /// reference implementation's `MCUSR = 0` after reading it.
    fn clear_reset_cause(&mut self);

    /// Arm a watchdog with a short (~15 ms) timeout and do not feed it; used
    /// by the `REBOOT` system command to reset the device.
    fn enable_watchdog_reboot(&mut self);
}
