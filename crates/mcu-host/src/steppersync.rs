//! Stepper Synchroniser: merges every stepper's ready commands into one
//! execution-ordered, backpressure-bounded dispatch stream.
//!
//! Grounded on `MCU._init_steppersync` / `MCU.flush_moves` in `mcu.py`,
//! which hand the set of per-stepper compressed queues plus a firmware-
//! reported `move_count` to a native `steppersync_alloc`/`steppersync_flush`
//! pair. This module reimplements that merge/ordering/backpressure step
//! directly instead of crossing an FFI boundary, per this core's ownership
//! model (each [`crate::devices::Stepper`] keeps its own queue; the
//! Synchroniser borrows them for the duration of one flush rather than
//! owning them).

use std::collections::HashMap;

use crate::devices::Stepper;
use crate::stepcompress::QueuedItem;

/// One item released by a flush, tagged with which stepper it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub stepper_oid: u8,
    pub item: QueuedItem,
}

/// Coordinates delivery of compressed step commands across every stepper
/// on one MCU.
pub struct StepperSynchroniser {
    /// Firmware-reported capacity for outstanding move commands, sampled
    /// once from the commit handshake's `move_count` field. Caps how many
    /// items a single [`StepperSynchroniser::flush`] call releases.
    move_count: usize,
}

impl StepperSynchroniser {
    pub fn new(move_count: usize) -> Self {
        Self { move_count }
    }

    pub fn move_count(&self) -> usize {
        self.move_count
    }

    /// Releases every ready command (across all steppers) whose execution
    /// clock is at or before `horizon_clock`, capped at `move_count` items
    /// per call, in non-decreasing clock order.
    ///
    /// Backpressure must come from the caller advancing `horizon_clock`
    /// only as firmware acknowledgements permit, never from dropping
    /// commands that were already ready — so this peeks every stepper's
    /// ready items first, decides the cut globally, and only then drains
    /// each stepper's queue by exactly the count it contributed to that
    /// cut. Since each stepper's own ready items are already
    /// non-decreasing in clock and the global sort is stable, the items it
    /// contributes to the first `move_count` of the merged order are
    /// always a contiguous prefix of its own queue — so nothing buffered
    /// past the cut is ever skipped over or lost.
    pub fn flush(&mut self, steppers: &mut [Stepper], horizon_clock: u64) -> Vec<Dispatch> {
        let mut merged: Vec<Dispatch> = steppers
            .iter()
            .flat_map(|s| {
                let oid = s.oid();
                s.peek_ready_upto(horizon_clock)
                    .into_iter()
                    .map(move |item| Dispatch { stepper_oid: oid, item })
            })
            .collect();
        merged.sort_by_key(|d| d.item.clock());
        merged.truncate(self.move_count);

        let mut take_counts: HashMap<u8, usize> = HashMap::new();
        for d in &merged {
            *take_counts.entry(d.stepper_oid).or_insert(0) += 1;
        }
        for s in steppers.iter_mut() {
            if let Some(&n) = take_counts.get(&s.oid()) {
                s.drain_ready_n(n);
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcu_proto::Dictionary;

    fn dict() -> Dictionary {
        Dictionary::stub(1_000_000, "test-mcu")
    }

    #[test]
    fn flush_merges_two_steppers_in_nondecreasing_clock_order() {
        let (mut a, _) = Stepper::new(0, "PA0", "PA1", 0, 25, &dict()).unwrap();
        let (mut b, _) = Stepper::new(1, "PB0", "PB1", 0, 25, &dict()).unwrap();
        // A third, far-off point breaks each two-point run's fit, forcing
        // both queues to actually commit something ahead of this flush
        // rather than staying buffered in an open run.
        a.step(1000);
        a.step(3000);
        a.step(2_000_000);
        b.step(500);
        b.step(2000);
        b.step(2_000_000);
        let mut steppers = vec![a, b];
        let mut sync = StepperSynchroniser::new(100);
        let dispatch = sync.flush(&mut steppers, 10_000);
        let clocks: Vec<u64> = dispatch.iter().map(|d| d.item.clock()).collect();
        let mut sorted = clocks.clone();
        sorted.sort_unstable();
        assert_eq!(clocks, sorted);
        assert!(!dispatch.is_empty());
    }

    #[test]
    fn flush_respects_the_horizon() {
        let (mut a, _) = Stepper::new(0, "PA0", "PA1", 0, 25, &dict()).unwrap();
        a.step(1000);
        a.step(2000);
        a.step(50_000);
        let mut steppers = vec![a];
        let mut sync = StepperSynchroniser::new(100);
        let dispatch = sync.flush(&mut steppers, 10_000);
        assert!(dispatch.iter().all(|d| d.item.clock() <= 10_000));
    }

    #[test]
    fn flush_caps_output_at_move_count() {
        let (mut a, _) = Stepper::new(0, "PA0", "PA1", 0, 25, &dict()).unwrap();
        // Alternating direction commands always commit immediately
        // (unlike a uniform step run, which stays buffered as one open
        // run and never exercises the cap at all).
        a.set_next_step_dir(0, 0);
        a.drain_ready();
        for k in 1..=10u64 {
            a.set_next_step_dir((k % 2) as u8, (k * 1000) as i64);
        }
        let mut steppers = vec![a];
        let mut sync = StepperSynchroniser::new(2);
        let dispatch = sync.flush(&mut steppers, 1_000_000);
        assert_eq!(dispatch.len(), 2);
    }

    #[test]
    fn flush_never_loses_items_when_capped_below_the_ready_count() {
        let (mut a, _) = Stepper::new(0, "PA0", "PA1", 0, 25, &dict()).unwrap();
        // Prime last_move_clock so the alternating toggles below don't
        // also trigger an automatic reset_step_clock from comparing
        // against the initial CLOCK_NEVER sentinel, which would add an
        // extra item to the very first toggle and break the exact count
        // this test checks.
        a.set_next_step_dir(0, 0);
        a.drain_ready();

        let mut expected = Vec::new();
        for k in 1..=10u64 {
            let dir = (k % 2) as u8;
            let clock = (k * 1000) as i64;
            a.set_next_step_dir(dir, clock);
            expected.push(k * 1000);
        }

        let mut steppers = vec![a];
        let mut sync = StepperSynchroniser::new(2);
        let mut all_clocks = Vec::new();
        loop {
            let dispatch = sync.flush(&mut steppers, 1_000_000);
            if dispatch.is_empty() {
                break;
            }
            assert!(dispatch.len() <= 2);
            all_clocks.extend(dispatch.iter().map(|d| d.item.clock()));
        }
        all_clocks.sort_unstable();
        expected.sort_unstable();
        assert_eq!(all_clocks, expected);
    }
}
