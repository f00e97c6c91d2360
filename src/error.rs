//! Internal error reporting (spec §7).
//!
//! None of these ever reach the application through the data callbacks —
//! they exist only to drive [`defmt`] logging at the drop site.

/// A reason a reception was abandoned. The receiver's response to every
/// variant is the same: drop what's been accumulated and fall back to
/// [`crate::state::RxPhase::WaitInterframe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// An edge-to-edge interval fell outside `[T/2, 5T + T/2)`.
    MalformedInput,
    /// The CRC byte did not match the computed checksum.
    CrcMismatch,
    /// The frame's declared size would overflow the receive buffer.
    BufferOverflow,
}
