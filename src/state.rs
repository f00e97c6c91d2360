//! Shared mutable state behind the two ISR entry points (spec §3, §5).
//!
//! [`Registers`] is the complete set of counters and buffers the receiver,
//! transmitter and arbiter read and write. It is never exposed directly;
//! all access goes through [`SharedState::with`], which brackets the
//! closure in a `critical_section` the way the reference implementation
//! brackets register access with interrupt-disable/enable.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::address::Priority;

/// Transmitter phase (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxPhase {
    Idle,
    WaitInterframe,
    ActivePriority,
    ActiveData,
    ActiveStop,
}

/// Receiver phase (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxPhase {
    Idle,
    Header,
    Data,
    WaitInterframe,
}

/// The register file shared between foreground code and both ISRs.
///
/// `SEND_BUF`/`READ_BUF` are the staged-frame and accumulating-frame
/// capacities in bytes; a frame never exceeds 255 bytes (4-byte header +
/// 250-byte payload + 1-byte CRC).
pub struct Registers<const SEND_BUF: usize, const READ_BUF: usize> {
    pub tx_phase: TxPhase,
    pub rx_phase: RxPhase,

    pub tx_priority: Priority,
    pub rx_priority: Priority,

    /// Total length of the staged frame in `tx_buf`, header through CRC.
    pub tx_len: u8,
    /// Index of the next logical (pre-stuffing) bit to emit: index 0 is the
    /// start bit, 1..4 are the priority bits, then 8 bits per
    /// header+payload+CRC byte.
    pub tx_bit_index: u16,
    /// Set when the just-scheduled run was itself a full 5-bit-period run,
    /// meaning the first bit-period of the *next* run is a forced
    /// stuffing bit rather than real data.
    pub tx_bit_stuff: bool,

    /// Bits accumulated so far in the current header field or data byte;
    /// resets to 0 at each field/byte boundary. During `Header` this counts
    /// priority bits (0..3); during `Data` it counts bits within the byte
    /// at `rx_byte_index` (0..7).
    pub rx_bit_index: u8,
    pub rx_byte_index: u8,
    /// Priority bits accumulated so far during `Header`, MSB first.
    pub rx_priority_raw: u8,
    /// Set for one run immediately after a destuffed 5-run; that run's
    /// first bit is the forced stuffing bit and is discarded.
    pub rx_bit_stuff: bool,
    /// Declared total length of the frame in reception (valid once the
    /// size byte has been decoded).
    pub rx_expected_len: u8,

    /// Timer value at the most recently observed edge.
    pub last_edge_time: u8,

    /// Number of consecutive bit-periods the transmitter intends to hold
    /// the line low (read by the arbiter at each edge).
    pub dominant_task: u8,
    /// Number of consecutive bit-periods the transmitter intends to leave
    /// the line released.
    pub recessive_task: u8,

    pub tx_buf: [u8; SEND_BUF],
    pub rx_buf: [u8; READ_BUF],
}

impl<const SEND_BUF: usize, const READ_BUF: usize> Registers<SEND_BUF, READ_BUF> {
    pub(crate) const fn new() -> Self {
        Registers {
            tx_phase: TxPhase::Idle,
            rx_phase: RxPhase::Idle,
            tx_priority: Priority::NOTICE,
            rx_priority: Priority::NOTICE,
            tx_len: 0,
            tx_bit_index: 0,
            tx_bit_stuff: false,
            rx_bit_index: 0,
            rx_byte_index: 0,
            rx_priority_raw: 0,
            rx_bit_stuff: false,
            rx_expected_len: 0,
            last_edge_time: 0,
            dominant_task: 0,
            recessive_task: 0,
            tx_buf: [0; SEND_BUF],
            rx_buf: [0; READ_BUF],
        }
    }

    /// Reset receiver bookkeeping, dropping whatever has been accumulated
    /// so far. Called on every error and on the IDLE→HEADER transition.
    pub fn reset_rx(&mut self) {
        self.rx_phase = RxPhase::Idle;
        self.rx_bit_index = 0;
        self.rx_byte_index = 0;
        self.rx_priority_raw = 0;
        self.rx_bit_stuff = false;
        self.rx_expected_len = 0;
    }
}

/// `Registers` guarded by a `critical_section::Mutex`, owned by [`crate::Clunet`]
/// rather than kept as a global `static`: this keeps the core generic over
/// `H: ClunetHal` and the two buffer sizes instead of pinning one instance
/// per program.
pub struct SharedState<const SEND_BUF: usize, const READ_BUF: usize> {
    inner: Mutex<RefCell<Registers<SEND_BUF, READ_BUF>>>,
}

impl<const SEND_BUF: usize, const READ_BUF: usize> SharedState<SEND_BUF, READ_BUF> {
    pub const fn new() -> Self {
        SharedState {
            inner: Mutex::new(RefCell::new(Registers::new())),
        }
    }

    /// Run `f` with exclusive access to the registers. This masks all
    /// interrupts for the duration, broader than the reference
    /// implementation's narrower timer-compare-only mask, but sufficient
    /// given the link layer owns no other interrupt sources.
    pub fn with<R>(&self, f: impl FnOnce(&mut Registers<SEND_BUF, READ_BUF>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.borrow_mut(cs)))
    }

    /// Borrow the registers using a critical section the caller already
    /// holds, rather than acquiring a new (nested) one. `critical_section`
    /// does not guarantee nested `with` calls are deadlock-free on every
    /// backend (notably its `std` feature's global lock), so callers that
    /// already hold a token — [`crate::Clunet`]'s ISR entry points, which
    /// also need the HAL under the same section — must use this instead of
    /// [`SharedState::with`].
    pub(crate) fn borrow_mut<'cs>(
        &'cs self,
        cs: critical_section::CriticalSection<'cs>,
    ) -> core::cell::RefMut<'cs, Registers<SEND_BUF, READ_BUF>> {
        self.inner.borrow(cs).borrow_mut()
    }
}

impl<const SEND_BUF: usize, const READ_BUF: usize> Default for SharedState<SEND_BUF, READ_BUF> {
    fn default() -> Self {
        Self::new()
    }
}
