//! Cross-ISR arbitration checks (spec §4.4).
//!
//! These are not a separate state machine; they're the handful of
//! comparisons the edge and timer-compare ISRs run against the run-length
//! bookkeeping in [`crate::state::Registers`] to detect the three ways a
//! transmission can be preempted by another station.

/// Fraction of a bit period's worth of timing skew tolerated before an
/// early pull-low is treated as another station starting arbitration,
/// taken from the reference implementation's `max_delta` constant.
const ARBITRATION_SKEW_NUM: u16 = 3;
const ARBITRATION_SKEW_DEN: u16 = 10;

/// `0.3 * T`, in timer ticks, rounded down.
pub const fn skew_threshold_ticks(bit_period: u8) -> u8 {
    ((bit_period as u16 * ARBITRATION_SKEW_NUM) / ARBITRATION_SKEW_DEN) as u8
}

/// Check 1 (pre-arbitration): a falling edge arrives while we're sitting
/// in `WAIT_INTERFRAME`, before our own 7·T interframe expiry. Another
/// station is starting a frame; we must disable our compare interrupt and
/// let the receiver take over.
pub fn interframe_preempted_by(tx_phase: crate::state::TxPhase) -> bool {
    matches!(tx_phase, crate::state::TxPhase::WaitInterframe)
}

/// Check 2 (post-arbitration, edge ISR, we are ACTIVE): the dominant run
/// the edge ISR just measured is longer than `dominant_task`, the number
/// of bit-periods we intended to hold the line low. Someone else held it
/// low past our release point — we lost.
pub fn dominant_overrun_lost(measured_run: u8, dominant_task: u8) -> bool {
    measured_run > dominant_task
}

/// Check 2, symmetric case: the line went low earlier than our scheduled
/// dominant start. `ticks_early` is the gap between the observed pull and
/// our scheduled compare match; a gap within [`skew_threshold_ticks`] is
/// clock jitter, not a competitor.
pub fn early_pull_lost(ticks_early: u8, bit_period: u8) -> bool {
    ticks_early >= skew_threshold_ticks(bit_period)
}

/// Check 3 (intra-arbitration, timer ISR): we intended to release the
/// line (emit a recessive run) but it is still observed low, and
/// `recessive_task` (the run length we committed to) is nonzero — meaning
/// the edge ISR never saw us actually leave the line low on our own. A
/// third station is holding it down.
pub fn recessive_release_conflict(line_is_low: bool, recessive_task: u8) -> bool {
    line_is_low && recessive_task > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TxPhase;

    #[test]
    fn skew_threshold_scales_with_bit_period() {
        assert_eq!(skew_threshold_ticks(16), 4);
        assert_eq!(skew_threshold_ticks(10), 3);
    }

    #[test]
    fn interframe_preemption_only_while_waiting() {
        assert!(interframe_preempted_by(TxPhase::WaitInterframe));
        assert!(!interframe_preempted_by(TxPhase::Idle));
        assert!(!interframe_preempted_by(TxPhase::ActiveData));
    }

    #[test]
    fn dominant_overrun_detects_longer_run() {
        assert!(dominant_overrun_lost(3, 2));
        assert!(!dominant_overrun_lost(2, 2));
        assert!(!dominant_overrun_lost(1, 2));
    }

    #[test]
    fn early_pull_respects_skew_tolerance() {
        let t = 16u8;
        assert!(!early_pull_lost(3, t));
        assert!(early_pull_lost(4, t));
    }

    #[test]
    fn recessive_conflict_requires_both_conditions() {
        assert!(recessive_release_conflict(true, 1));
        assert!(!recessive_release_conflict(true, 0));
        assert!(!recessive_release_conflict(false, 1));
    }
}
