//! Edge-timing ↔ bit-run conversions and bit-stuffing (spec §4.2, §4.3, §8).
//!
//! These are pure functions with no knowledge of the bus or the HAL, shared
//! by the receiver and transmitter, and exercised directly by the round-trip
//! laws in the tests below.

/// No legal run is longer than this many identical bit periods; the
/// transmitter always inserts an opposite bit before reaching six.
pub const MAX_RUN: u8 = 5;

/// Classify an edge-to-edge tick interval into a run length in bit periods.
///
/// Interval `n` (`1..=5`) occupies the half-open window
/// `[n*T - T/2, n*T + T/2)`. Returns `None` if `delta_ticks` falls outside
/// `[T/2, 5T + T/2)` — either too short to be a real bit, or long enough
/// that bit-stuffing should have intervened (spec §4.2 "Edge interpretation").
pub fn ticks_to_run_length(delta_ticks: u16, bit_period: u8) -> Option<u8> {
    let t = bit_period as i32;
    let delta = delta_ticks as i32;
    for run in 1..=MAX_RUN as i32 {
        let lower = run * t - t / 2;
        let upper = run * t + t / 2;
        if delta >= lower && delta < upper {
            return Some(run as u8);
        }
    }
    None
}

/// Inverse of [`ticks_to_run_length`]: the nominal tick duration of a run of
/// `bits` identical bit periods.
pub const fn run_ticks(bits: u8, bit_period: u8) -> u16 {
    bits as u16 * bit_period as u16
}

/// Stuff a logical bit stream: after every run of [`MAX_RUN`] identical
/// bits, insert one opposite-polarity bit that is not part of the data.
///
/// Writes the physical (stuffed) bit sequence into `out` and returns the
/// number of bits written, or `None` if `out` is too small.
pub fn stuff(bits: &[bool], out: &mut [bool]) -> Option<usize> {
    let mut idx = 0usize;
    let mut run_len: u8 = 0;
    let mut prev: Option<bool> = None;

    let mut push = |bit: bool, idx: &mut usize| -> bool {
        if *idx >= out.len() {
            return false;
        }
        out[*idx] = bit;
        *idx += 1;
        true
    };

    for &bit in bits {
        if !push(bit, &mut idx) {
            return None;
        }
        run_len = if prev == Some(bit) { run_len + 1 } else { 1 };
        prev = Some(bit);
        if run_len == MAX_RUN {
            let opposite = !bit;
            if !push(opposite, &mut idx) {
                return None;
            }
            // The inserted bit itself starts counting towards the next run:
            // the physical wire doesn't know it was forced.
            prev = Some(opposite);
            run_len = 1;
        }
    }
    Some(idx)
}

/// Inverse of [`stuff`]: discard every forced bit that follows a run of
/// [`MAX_RUN`] identical bits, recovering the original logical stream.
pub fn destuff(stuffed: &[bool], out: &mut [bool]) -> Option<usize> {
    let mut idx = 0usize;
    let mut run_len: u8 = 0;
    let mut prev: Option<bool> = None;
    let mut skip_next = false;

    for &bit in stuffed {
        if skip_next {
            skip_next = false;
            prev = Some(bit);
            run_len = 1;
            continue;
        }
        if idx >= out.len() {
            return None;
        }
        out[idx] = bit;
        idx += 1;
        run_len = if prev == Some(bit) { run_len + 1 } else { 1 };
        prev = Some(bit);
        if run_len == MAX_RUN {
            skip_next = true;
        }
    }
    Some(idx)
}

/// The longest run of identical bits in `bits`.
#[cfg(test)]
fn longest_run(bits: &[bool]) -> u8 {
    let mut longest = 0u8;
    let mut run_len = 0u8;
    let mut prev: Option<bool> = None;
    for &bit in bits {
        run_len = if prev == Some(bit) { run_len + 1 } else { 1 };
        prev = Some(bit);
        longest = longest.max(run_len);
    }
    longest
}
