//! CLUNET: a single-wire, multi-master, bitwise-arbitrated field bus link
//! layer (spec §1–§9).
//!
//! The crate is built around two interrupt sources only — a line-edge
//! interrupt and a timer-compare interrupt — dispatched by [`Clunet`] to the
//! receiver ([`rx`]), transmitter ([`tx`]) and arbiter ([`arbiter`])
//! sub-machines behind a single [`state::SharedState`]. A platform
//! integration implements [`hal::ClunetHal`], constructs a [`Clunet`], and
//! wires its two ISR entry points to the matching hardware vectors.
//!
//! ```ignore
//! static BUS: Clunet<MyHal, 64, 64> = Clunet::new(MyHal::new(), Config::new(Address(7)));
//!
//! #[interrupt]
//! fn PIN_CHANGE() { BUS.on_edge_interrupt(); }
//!
//! #[interrupt]
//! fn TIMER_COMPARE() { BUS.on_compare_interrupt(); }
//! ```
#![cfg_attr(not(test), no_std)]

pub mod address;
pub mod arbiter;
pub mod command;
pub mod config;
pub mod crc;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod hal;
pub mod runlength;
pub mod rx;
pub mod state;
pub mod tx;

pub use address::{Address, Priority};
pub use command::Command;
pub use config::Config;
pub use dispatch::{BootControlCallback, DataCallback};
pub use hal::ClunetHal;

use core::cell::RefCell;

use critical_section::Mutex;

use dispatch::Callbacks;
use state::{RxPhase, SharedState, TxPhase};

/// The complete link-layer station: one [`ClunetHal`] implementation, its
/// [`Config`], and the shared registers behind the two ISR entry points.
///
/// `SEND_BUF`/`READ_BUF` are the staged-frame and accumulating-frame
/// capacities in bytes; both must be at least [`frame::HEADER_LEN`] + 1 and
/// at most [`frame::MAX_FRAME_LEN`] to carry a full-size frame.
pub struct Clunet<H: ClunetHal, const SEND_BUF: usize, const READ_BUF: usize> {
    hal: Mutex<RefCell<H>>,
    config: Config,
    state: SharedState<SEND_BUF, READ_BUF>,
    callbacks: Mutex<RefCell<Callbacks>>,
}

impl<H: ClunetHal, const SEND_BUF: usize, const READ_BUF: usize> Clunet<H, SEND_BUF, READ_BUF> {
    /// Build a station. Hardware is not touched until [`Clunet::init`] runs.
    pub const fn new(hal: H, config: Config) -> Self {
        Clunet {
            hal: Mutex::new(RefCell::new(hal)),
            config,
            state: SharedState::new(),
            callbacks: Mutex::new(RefCell::new(Callbacks {
                on_data_received: None,
                on_data_received_sniff: None,
                on_boot_control: None,
            })),
        }
    }

    /// Enable the edge interrupt and broadcast `BOOT_COMPLETED` with the
    /// platform's reset-cause byte, then clear it (spec §6.3, C `clunet_init`).
    pub fn init(&self) {
        critical_section::with(|cs| {
            let mut hal = self.hal.borrow(cs).borrow_mut();
            let reset_cause = hal.reset_cause();
            hal.clear_reset_cause();
            hal.edge_interrupt_enable();
            let mut regs = self.state.borrow_mut(cs);
            let _ = tx::stage(
                &mut regs,
                self.config.device_id(),
                Address::BROADCAST,
                Command::BootCompleted,
                Priority::NOTICE,
                &[reset_cause],
            );
            arm_compare(&mut *hal, self.config.bit_period_ticks());
        });
    }

    /// Stage `payload` under `command`/`priority` addressed to `dst`.
    ///
    /// Silently replaces any already-staged-but-not-yet-started frame only
    /// if `priority` is at least as urgent (spec §5 "Cancellation": "iff the
    /// new frame's priority justifies it"); a less urgent `send` while one is
    /// pending is a no-op, matching `ready_to_send`'s contract that a
    /// nonzero return means a transmission of at least that priority is
    /// already committed. A payload over 250 bytes is also a silent no-op
    /// (spec §7: best-effort, no error path back to the caller).
    pub fn send(&self, dst: Address, priority: Priority, command: Command, payload: &[u8]) {
        let src = self.config.device_id();
        let staged = self.state.with(|regs| {
            if regs.tx_phase != TxPhase::Idle && priority.get() < regs.tx_priority.get() {
                return false;
            }
            tx::stage(regs, src, dst, command, priority, payload).is_ok()
        });
        if staged {
            self.arm_compare_for_send();
        }
    }

    /// `0` if idle, else the priority of the pending or in-flight frame.
    pub fn ready_to_send(&self) -> u8 {
        self.state.with(|regs| {
            if regs.tx_phase == TxPhase::Idle {
                0
            } else {
                regs.tx_priority.get()
            }
        })
    }

    /// Re-arm the previously staged frame. Returns `false` if nothing has
    /// ever been staged.
    pub fn resend_last_packet(&self) -> bool {
        let resent = self.state.with(tx::resend);
        if resent {
            self.arm_compare_for_send();
        }
        resent
    }

    /// Release the line and force the transmitter back to idle; the staged
    /// buffer is left intact (spec §5).
    pub fn abort_send(&self) {
        critical_section::with(|cs| {
            let mut hal = self.hal.borrow(cs).borrow_mut();
            let mut regs = self.state.borrow_mut(cs);
            tx::abort(&mut *hal, &mut regs);
        });
    }

    /// Invoked for every valid frame observed on the wire, addressed to us
    /// or not.
    pub fn set_on_data_received_sniff(&self, cb: DataCallback) {
        self.with_callbacks(|c| c.on_data_received_sniff = Some(cb));
    }

    /// Invoked for frames addressed to us (or broadcast) carrying a
    /// non-system command.
    pub fn set_on_data_received(&self, cb: DataCallback) {
        self.with_callbacks(|c| c.on_data_received = Some(cb));
    }

    /// Invoked for `BOOT_CONTROL` frames addressed to us; the bootloader
    /// sub-protocol itself is out of scope for this crate.
    pub fn set_on_boot_control(&self, cb: BootControlCallback) {
        self.with_callbacks(|c| c.on_boot_control = Some(cb));
    }

    fn with_callbacks(&self, f: impl FnOnce(&mut Callbacks)) {
        critical_section::with(|cs| f(&mut self.callbacks.borrow(cs).borrow_mut()));
    }

    /// Arm the compare interrupt after staging a frame while idle; harmless
    /// to call again if TX was already active, since its own schedule will
    /// simply overwrite this one at the next run.
    fn arm_compare_for_send(&self) {
        critical_section::with(|cs| {
            let mut hal = self.hal.borrow(cs).borrow_mut();
            arm_compare(&mut *hal, self.config.bit_period_ticks());
        });
    }

    /// Line-edge interrupt entry point. `tx::on_edge` must run before
    /// `rx::on_edge`: it needs the stale `last_edge_time` that `rx::on_edge`
    /// is about to overwrite (see `tx::on_edge`'s own doc comment).
    pub fn on_edge_interrupt(&self) {
        let bit_period = self.config.bit_period_ticks();
        critical_section::with(|cs| {
            let mut hal = self.hal.borrow(cs).borrow_mut();
            let now = hal.now();
            let line_is_low = hal.is_low();
            let mut regs = self.state.borrow_mut(cs);

            if matches!(regs.tx_phase, TxPhase::ActivePriority | TxPhase::ActiveData) {
                tx::on_edge(&mut *hal, &mut regs, now, line_is_low, bit_period);
            }

            // Spec §4.4 check 1: another station is starting a frame before
            // our own interframe timer fired. Yield the bus.
            if line_is_low && arbiter::interframe_preempted_by(regs.tx_phase) {
                hal.disable_compare();
                regs.tx_phase = TxPhase::WaitInterframe;
            }

            // A single hardware compare register backs both sides'
            // interframe countdowns: reschedule it to +7T on every edge
            // observed while either is waiting out the silence, rather than
            // modelling two independent timer schedules. This satisfies
            // "any falling edge restarts" (spec §4.2) and guarantees TX
            // resumes its own countdown once contention quiets, per
            // `tx::on_compare`'s WaitInterframe comment.
            if regs.rx_phase == RxPhase::WaitInterframe || regs.tx_phase == TxPhase::WaitInterframe {
                hal.enable_compare();
                hal.schedule_compare_in(tx::INTERFRAME_GAP_BITS * bit_period);
            }

            match rx::on_edge(&mut regs, now, line_is_low, bit_period) {
                rx::RxOutcome::Nothing => {}
                #[allow(unused_variables)]
                rx::RxOutcome::Error(err) => {
                    #[cfg(feature = "defmt")]
                    defmt::trace!("clunet: rx dropped, {}", err);
                }
                rx::RxOutcome::FrameReady { len } => {
                    // Copy out of `rx_buf` first: `Frame` borrows its
                    // payload, and the dispatcher below needs `regs`
                    // mutably (to stage auto-replies into `tx_buf`).
                    let mut scratch = [0u8; READ_BUF];
                    scratch[..len].copy_from_slice(&regs.rx_buf[..len]);
                    match frame::decode(&scratch[..len], regs.rx_priority) {
                        Ok(parsed) => {
                            let callbacks = *self.callbacks.borrow(cs).borrow();
                            dispatch::run(
                                &mut *hal,
                                &mut regs,
                                self.config.device_id(),
                                self.config.device_name_bytes(),
                                bit_period,
                                &callbacks,
                                parsed,
                            );
                        }
                        #[allow(unused_variables)]
                        Err(err) => {
                            #[cfg(feature = "defmt")]
                            defmt::trace!("clunet: frame dropped, {}", err);
                        }
                    }
                }
            }
        });
    }

    /// Timer-compare interrupt entry point.
    pub fn on_compare_interrupt(&self) {
        let bit_period = self.config.bit_period_ticks();
        critical_section::with(|cs| {
            let mut hal = self.hal.borrow(cs).borrow_mut();
            let mut regs = self.state.borrow_mut(cs);
            if regs.rx_phase == RxPhase::WaitInterframe {
                regs.rx_phase = RxPhase::Idle;
            }
            #[allow(unused_variables)]
            let outcome = tx::on_compare(&mut *hal, &mut regs, bit_period);
            #[cfg(feature = "defmt")]
            if outcome == tx::CompareOutcome::Lost {
                defmt::debug!("clunet: tx lost arbitration");
            }
        });
    }
}

/// Arm the shared compare timer for the 7·T interframe wait.
fn arm_compare(hal: &mut impl ClunetHal, bit_period: u8) {
    hal.enable_compare();
    hal.schedule_compare_in(tx::INTERFRAME_GAP_BITS * bit_period);
}
