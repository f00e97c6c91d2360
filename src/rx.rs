//! Receiver state machine (spec §4.2).
//!
//! Driven entirely by the edge interrupt; the only thing the timer-compare
//! interrupt contributes to reception is the interframe-gap expiry
//! (handled in [`crate::lib`]'s shared compare dispatch).

use crate::address::Priority;
use crate::error::RxError;
use crate::frame::{HEADER_LEN, OFFSET_SIZE};
use crate::runlength::{ticks_to_run_length, MAX_RUN};
use crate::state::{Registers, RxPhase};

/// Number of priority bits following the start bit (spec §4.2 "HEADER").
const PRIORITY_BITS: u8 = 3;

/// What happened as a result of processing one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    /// Nothing conclusive yet; still mid-frame or idle.
    Nothing,
    /// A complete, CRC-valid-pending frame of `len` bytes sits in `rx_buf`.
    FrameReady { len: usize },
    /// Reception was abandoned; the caller should log `RxError` if desired.
    Error(RxError),
}

/// Process one line edge. `now` and `line_is_low` are sampled by the caller
/// at interrupt entry; `last_edge_time` is updated unconditionally.
pub fn on_edge<const S: usize, const R: usize>(
    regs: &mut Registers<S, R>,
    now: u8,
    line_is_low: bool,
    bit_period: u8,
) -> RxOutcome {
    let delta = now.wrapping_sub(regs.last_edge_time) as u16;
    regs.last_edge_time = now;

    // The run that just ended has the polarity opposite the line's new
    // state: a falling edge (line now low) ends a recessive run.
    let ended_run_was_dominant = !line_is_low;

    match regs.rx_phase {
        RxPhase::Idle => {
            if line_is_low {
                start_header(regs);
            }
            RxOutcome::Nothing
        }
        RxPhase::WaitInterframe => {
            if line_is_low {
                start_header(regs);
            }
            RxOutcome::Nothing
        }
        RxPhase::Header | RxPhase::Data => {
            let run = match ticks_to_run_length(delta, bit_period) {
                Some(run) => run,
                None => return abandon(regs, RxError::MalformedInput),
            };

            let skip_first = regs.rx_bit_stuff;
            regs.rx_bit_stuff = run == MAX_RUN;

            // Dominant encodes a logical 0, recessive a logical 1 (spec
            // §4.3: "arbitration favours bits that pull the line low,
            // which here are the zero bits").
            let logical_bit = !ended_run_was_dominant;
            for i in 0..run {
                if i == 0 && skip_first {
                    continue;
                }
                match step_bit(regs, logical_bit) {
                    Ok(Some(len)) => return RxOutcome::FrameReady { len },
                    Ok(None) => {}
                    Err(e) => return abandon(regs, e),
                }
            }
            RxOutcome::Nothing
        }
    }
}

fn start_header<const S: usize, const R: usize>(regs: &mut Registers<S, R>) {
    regs.reset_rx();
    regs.rx_phase = RxPhase::Header;
}

fn abandon<const S: usize, const R: usize>(
    regs: &mut Registers<S, R>,
    err: RxError,
) -> RxOutcome {
    regs.reset_rx();
    regs.rx_phase = RxPhase::WaitInterframe;
    RxOutcome::Error(err)
}

/// Consume one logical (post-destuff) bit. Returns `Ok(Some(len))` once a
/// full frame has been accumulated, ready for CRC validation by the caller.
fn step_bit<const S: usize, const R: usize>(
    regs: &mut Registers<S, R>,
    bit: bool,
) -> Result<Option<usize>, RxError> {
    match regs.rx_phase {
        RxPhase::Header => {
            if regs.rx_bit_index == 0 {
                // The implicit start bit: always dominant, not data.
                regs.rx_bit_index = 1;
                return Ok(None);
            }
            regs.rx_priority_raw = (regs.rx_priority_raw << 1) | bit as u8;
            regs.rx_bit_index += 1;
            if regs.rx_bit_index == 1 + PRIORITY_BITS {
                regs.rx_priority = Priority::from_wire_value(regs.rx_priority_raw);
                regs.rx_phase = RxPhase::Data;
                regs.rx_bit_index = 0;
                regs.rx_byte_index = 0;
            }
            Ok(None)
        }
        RxPhase::Data => {
            if regs.rx_byte_index as usize >= regs.rx_buf.len() {
                return Err(RxError::BufferOverflow);
            }
            if regs.rx_bit_index == 0 {
                regs.rx_buf[regs.rx_byte_index as usize] = 0;
            }
            let idx = regs.rx_byte_index as usize;
            regs.rx_buf[idx] = (regs.rx_buf[idx] << 1) | bit as u8;
            regs.rx_bit_index += 1;

            if regs.rx_bit_index == 8 {
                regs.rx_bit_index = 0;
                let finished_byte = regs.rx_byte_index;
                regs.rx_byte_index += 1;

                if finished_byte as usize == OFFSET_SIZE {
                    let size = regs.rx_buf[OFFSET_SIZE] as usize;
                    let total = HEADER_LEN + size + 1;
                    if total > regs.rx_buf.len() {
                        return Err(RxError::BufferOverflow);
                    }
                    regs.rx_expected_len = total as u8;
                }

                if regs.rx_expected_len != 0 && regs.rx_byte_index == regs.rx_expected_len {
                    let len = regs.rx_expected_len as usize;
                    regs.rx_phase = RxPhase::WaitInterframe;
                    return Ok(Some(len));
                }
            }
            Ok(None)
        }
        RxPhase::Idle | RxPhase::WaitInterframe => Ok(None),
    }
}
