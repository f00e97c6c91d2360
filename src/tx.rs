//! Transmitter state machine and foreground send API (spec §4.3).

use crate::address::{Address, Priority};
use crate::arbiter;
use crate::command::Command;
use crate::frame;
use crate::hal::ClunetHal;
use crate::runlength::{ticks_to_run_length, MAX_RUN};
use crate::state::{Registers, TxPhase};

/// Interframe gap, in bit-periods, observed before a staged frame may
/// start driving the line (spec §4.3, §6.2).
pub const INTERFRAME_GAP_BITS: u8 = 7;

/// Why a frame could not be staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StageError {
    /// `payload.len() > 250`; `send` is a silent no-op for this (spec §7).
    PayloadTooLarge,
}

/// What a timer-compare firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOutcome {
    /// Nothing to do; TX is idle.
    Idle,
    /// A run was scheduled; TX remains active.
    Scheduled,
    /// The frame was fully emitted and the line released.
    FrameSent,
    /// Arbitration was lost at the timer-compare boundary (check 3).
    Lost,
}

/// What a line edge did to the transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// TX isn't actively driving; this edge is none of its concern.
    NotActive,
    /// The observed run matched what TX intended; no conflict.
    Continue,
    /// Arbitration was lost (check 2).
    Lost,
}

/// Stage `payload` as a new outgoing frame. Must be called with the
/// registers already under the caller's critical section (spec §5).
pub fn stage<const S: usize, const R: usize>(
    regs: &mut Registers<S, R>,
    src: Address,
    dst: Address,
    command: Command,
    priority: Priority,
    payload: &[u8],
) -> Result<(), StageError> {
    let len = frame::encode(src, dst, command, payload, &mut regs.tx_buf)
        .ok_or(StageError::PayloadTooLarge)?;
    regs.tx_len = len as u8;
    regs.tx_priority = priority;
    rearm(regs);
    Ok(())
}

/// Re-arm the previously staged frame without re-encoding it. Returns
/// `false` if nothing has ever been staged.
pub fn resend<const S: usize, const R: usize>(regs: &mut Registers<S, R>) -> bool {
    if regs.tx_len == 0 {
        return false;
    }
    rearm(regs);
    true
}

fn rearm<const S: usize, const R: usize>(regs: &mut Registers<S, R>) {
    regs.tx_bit_index = 0;
    regs.tx_bit_stuff = false;
    regs.dominant_task = 0;
    regs.recessive_task = 0;
    regs.tx_phase = TxPhase::WaitInterframe;
}

/// Abort whatever is pending or in flight and release the line. The
/// staged frame itself is left intact so a later `resend` can re-arm it.
pub fn abort<H: ClunetHal, const S: usize, const R: usize>(hal: &mut H, regs: &mut Registers<S, R>) {
    regs.tx_phase = TxPhase::Idle;
    regs.dominant_task = 0;
    regs.recessive_task = 0;
    hal.release();
    hal.disable_compare();
}

/// Total logical (pre-stuffing) bit count of the staged frame: the implicit
/// start bit, 3 priority bits, then 8 bits per header+payload+CRC byte.
fn logical_bit_count<const S: usize, const R: usize>(regs: &Registers<S, R>) -> u16 {
    4 + regs.tx_len as u16 * 8
}

/// The dominant-encoding (`true` = drive low) of logical bit `index`.
/// Index 0 is the start bit, always dominant; 1..4 are the priority bits;
/// the rest is header+payload+CRC data.
fn logical_bit<const S: usize, const R: usize>(regs: &Registers<S, R>, index: u16) -> bool {
    if index == 0 {
        true
    } else if index < 4 {
        let shift = 3 - index;
        (regs.tx_priority.wire_value() >> shift) & 1 == 0
    } else {
        let data_index = index - 4;
        let byte = regs.tx_buf[(data_index / 8) as usize];
        let shift = 7 - (data_index % 8) as u8;
        (byte >> shift) & 1 == 0
    }
}

/// Compute and drive the next run (spec §4.3 "Scheduling"), or transition
/// into the stop phase once the logical bit stream is exhausted.
fn schedule_next_run<H: ClunetHal, const S: usize, const R: usize>(
    hal: &mut H,
    regs: &mut Registers<S, R>,
    bit_period: u8,
) -> CompareOutcome {
    let total_bits = logical_bit_count(regs);
    let forced = regs.tx_bit_stuff;

    if !forced && regs.tx_bit_index >= total_bits {
        return enter_stop(hal, regs, bit_period);
    }

    let previous_was_dominant = regs.dominant_task > 0;
    let start_dominant = if forced {
        !previous_was_dominant
    } else {
        logical_bit(regs, regs.tx_bit_index)
    };

    let mut consumed: u16 = 0;
    let mut physical_len: u8 = if forced { 1 } else { 0 };
    while physical_len < MAX_RUN && regs.tx_bit_index + consumed < total_bits {
        if logical_bit(regs, regs.tx_bit_index + consumed) != start_dominant {
            break;
        }
        consumed += 1;
        physical_len += 1;
    }

    regs.tx_bit_index += consumed;
    regs.tx_bit_stuff = physical_len == MAX_RUN;

    if start_dominant {
        hal.pull_low();
        regs.dominant_task = physical_len;
        regs.recessive_task = 0;
    } else {
        hal.release();
        regs.recessive_task = physical_len;
        regs.dominant_task = 0;
    }
    hal.schedule_compare_in(physical_len * bit_period);
    regs.tx_phase = if regs.tx_bit_index < 4 {
        TxPhase::ActivePriority
    } else {
        TxPhase::ActiveData
    };
    CompareOutcome::Scheduled
}

fn enter_stop<H: ClunetHal, const S: usize, const R: usize>(
    hal: &mut H,
    regs: &mut Registers<S, R>,
    bit_period: u8,
) -> CompareOutcome {
    let last_was_dominant = regs.dominant_task > 0;
    if last_was_dominant {
        regs.tx_phase = TxPhase::ActiveStop;
        hal.schedule_compare_in(bit_period);
        CompareOutcome::Scheduled
    } else {
        hal.release();
        finish(regs);
        hal.disable_compare();
        CompareOutcome::FrameSent
    }
}

fn finish<const S: usize, const R: usize>(regs: &mut Registers<S, R>) {
    regs.tx_phase = TxPhase::Idle;
    regs.dominant_task = 0;
    regs.recessive_task = 0;
}

/// Handle a timer-compare firing while TX owns it.
pub fn on_compare<H: ClunetHal, const S: usize, const R: usize>(
    hal: &mut H,
    regs: &mut Registers<S, R>,
    bit_period: u8,
) -> CompareOutcome {
    match regs.tx_phase {
        TxPhase::Idle => CompareOutcome::Idle,
        TxPhase::WaitInterframe => {
            if hal.is_low() {
                // Bus still busy; the edge ISR keeps rescheduling this
                // wait as long as traffic continues.
                CompareOutcome::Scheduled
            } else {
                regs.tx_phase = TxPhase::ActivePriority;
                regs.tx_bit_index = 0;
                regs.tx_bit_stuff = false;
                schedule_next_run(hal, regs, bit_period)
            }
        }
        TxPhase::ActivePriority | TxPhase::ActiveData => {
            if arbiter::recessive_release_conflict(hal.is_low(), regs.recessive_task) {
                abort(hal, regs);
                CompareOutcome::Lost
            } else {
                schedule_next_run(hal, regs, bit_period)
            }
        }
        TxPhase::ActiveStop => {
            hal.release();
            finish(regs);
            hal.disable_compare();
            CompareOutcome::FrameSent
        }
    }
}

/// Handle a line edge while TX may be actively driving (spec §4.4 check 2).
/// Must be called before [`crate::rx::on_edge`] updates `last_edge_time`.
pub fn on_edge<H: ClunetHal, const S: usize, const R: usize>(
    hal: &mut H,
    regs: &mut Registers<S, R>,
    now: u8,
    line_is_low: bool,
    bit_period: u8,
) -> EdgeOutcome {
    if !matches!(regs.tx_phase, TxPhase::ActivePriority | TxPhase::ActiveData) {
        return EdgeOutcome::NotActive;
    }

    let delta = now.wrapping_sub(regs.last_edge_time) as u16;
    let ended_run_was_dominant = !line_is_low;

    let lost = match ticks_to_run_length(delta, bit_period) {
        None => true,
        Some(run) if ended_run_was_dominant => arbiter::dominant_overrun_lost(run, regs.dominant_task),
        Some(run) if run < regs.recessive_task => {
            let ticks_early = (regs.recessive_task - run) as u16 * bit_period as u16;
            arbiter::early_pull_lost(ticks_early.min(u8::MAX as u16) as u8, bit_period)
        }
        Some(_) => false,
    };

    if lost {
        abort(hal, regs);
        EdgeOutcome::Lost
    } else {
        EdgeOutcome::Continue
    }
}
