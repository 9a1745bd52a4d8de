//! Step Queue: per-stepper step-time compression.
//!
//! Converts an arbitrary sequence of per-step MCU-tick targets into a
//! compact stream of `queue_step(interval, count, add)` commands, each
//! reconstructing every one of its pulses within `max_error` ticks of the
//! planner's original target. Mirrors the role of `stepcompress_alloc` /
//! `stepcompress_push*` in the native helper `mcu.py` calls into (here
//! reimplemented as a pure in-language module rather than an FFI call, per
//! the ownership note in spec.md's design notes).

use mcu_proto::EncodedCommand;

/// One item this queue has committed to its output stream, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedItem {
    /// A compressed run of steps. `clock` is the absolute MCU clock of the
    /// run's first pulse — the key the Stepper Synchroniser orders and
    /// paces delivery against.
    Step {
        clock: u64,
        interval: u32,
        count: u16,
        add: i16,
    },
    /// An already-encoded command (e.g. `reset_step_clock`) interleaved at
    /// its correct position in the stream.
    Raw { clock: u64, command: EncodedCommand },
}

impl QueuedItem {
    /// The clock ordering key the Synchroniser compares against its
    /// horizon.
    pub fn clock(&self) -> u64 {
        match self {
            QueuedItem::Step { clock, .. } => *clock,
            QueuedItem::Raw { clock, .. } => *clock,
        }
    }
}

/// How far from the exact first-two-point fit the search will range while
/// looking for an `add` that keeps every pending pulse within `max_error`.
const ADD_SEARCH_RADIUS: i64 = 20_000;

/// Per-stepper append-only buffer of future step events, compressed into
/// `queue_step` commands with bounded reconstruction error.
#[derive(Debug)]
pub struct StepQueue {
    max_error: i64,
    base_clock: i64,
    open_run: Vec<i64>,
    commands: Vec<QueuedItem>,
    error_count: u32,
}

impl StepQueue {
    /// `max_error` is in MCU ticks.
    pub fn new(max_error: u32) -> Self {
        Self {
            max_error: max_error as i64,
            base_clock: 0,
            open_run: Vec::new(),
            commands: Vec::new(),
            error_count: 0,
        }
    }

    /// Appends a single step target, in absolute MCU ticks.
    pub fn push(&mut self, step_time_ticks: i64) {
        self.open_run.push(step_time_ticks);
        if self.open_run.len() >= u16::MAX as usize {
            self.finish_run();
            return;
        }
        if self.open_run.len() > 1 && self.fit(&self.open_run).is_none() {
            let overflow = self.open_run.pop().expect("just checked len > 1");
            self.finish_run();
            self.open_run.push(overflow);
        }
    }

    /// Appends `steps` events where the k-th event's tick is
    /// `clock_offset + sqrt(sqrt_offset + factor*(k + step_offset))`.
    /// Returns the clock of the last generated event.
    pub fn push_sqrt(
        &mut self,
        steps: u32,
        step_offset: u32,
        clock_offset: i64,
        sqrt_offset: f64,
        factor: f64,
    ) -> i64 {
        let mut last = clock_offset;
        for k in 0..steps {
            let x = sqrt_offset + factor * ((k + step_offset) as f64);
            let t = clock_offset + (x.max(0.0).sqrt()) as i64;
            self.push(t);
            last = t;
        }
        last
    }

    /// Appends `steps` events where the k-th event's tick is
    /// `clock_offset + factor*(k + step_offset)`. Returns the last clock.
    pub fn push_factor(
        &mut self,
        steps: u32,
        step_offset: u32,
        clock_offset: i64,
        factor: f64,
    ) -> i64 {
        let mut last = clock_offset;
        for k in 0..steps {
            let t = clock_offset + (factor * ((k + step_offset) as f64)) as i64;
            self.push(t);
            last = t;
        }
        last
    }

    /// Enqueues an already-encoded command at the current stream position,
    /// flushing any open run first so ordering is preserved.
    pub fn queue_msg(&mut self, command: EncodedCommand) {
        self.finish_run();
        let clock = self.base_clock.max(0) as u64;
        self.commands.push(QueuedItem::Raw { clock, command });
    }

    /// Marks `clock` as the new reference, flushing any open run first and
    /// interleaving `marker` (the OID-aware `reset_step_clock` command the
    /// caller built from its own dictionary template) at that point.
    pub fn reset(&mut self, clock: i64, marker: EncodedCommand) {
        self.finish_run();
        self.commands.push(QueuedItem::Raw {
            clock: clock.max(0) as u64,
            command: marker,
        });
        self.base_clock = clock;
    }

    /// Count of compression overflows / timing failures detected so far.
    pub fn get_errors(&self) -> u32 {
        self.error_count
    }

    /// The clock this queue's latest output executes at or after.
    pub fn last_output_clock(&self) -> u64 {
        self.base_clock.max(0) as u64
    }

    /// Drains every committed command, in order. Does not flush an open
    /// run — callers that need everything out (e.g. end of print) should
    /// call [`StepQueue::flush_pending`] first.
    pub fn drain(&mut self) -> Vec<QueuedItem> {
        std::mem::take(&mut self.commands)
    }

    /// Returns, without removing them, the committed commands whose clock
    /// is at or before `horizon`. Commands are produced in non-decreasing
    /// clock order, so a prefix take is always correct. Non-mutating so a
    /// caller (the Stepper Synchroniser) can compare readiness across every
    /// stepper before deciding how much of any one queue to actually drain.
    pub fn peek_upto(&self, horizon: u64) -> Vec<QueuedItem> {
        self.commands
            .iter()
            .take_while(|item| item.clock() <= horizon)
            .cloned()
            .collect()
    }

    /// Drains exactly the first `n` committed commands, in order, leaving
    /// the remainder (including anything past whatever horizon motivated
    /// the caller's count) buffered. `n` is clamped to however many
    /// commands are actually committed.
    pub fn drain_n(&mut self, n: usize) -> Vec<QueuedItem> {
        let n = n.min(self.commands.len());
        self.commands.drain(..n).collect()
    }

    /// Forces the currently open (not yet committed) run out as a command.
    /// Used when no more steps will arrive before the queue is read.
    pub fn flush_pending(&mut self) {
        self.finish_run();
    }

    fn finish_run(&mut self) {
        if self.open_run.is_empty() {
            return;
        }
        let base = self.base_clock;
        if self.open_run.len() == 1 {
            let interval = self.open_run[0] - base;
            self.emit_single(interval);
        } else {
            match self.fit(&self.open_run) {
                Some((interval, add)) => {
                    let count = self.open_run.len();
                    let recon = reconstruct(interval, add, count);
                    self.commands.push(QueuedItem::Step {
                        clock: (base + interval).max(0) as u64,
                        interval: interval.max(0) as u32,
                        count: count as u16,
                        add: add as i16,
                    });
                    self.base_clock = base + recon[count - 1];
                }
                None => {
                    // Every point in `open_run` previously passed `fit`
                    // individually as the run grew; reaching here means the
                    // whole buffer can't share a single run (can happen
                    // when `flush_pending` is called with points that were
                    // never incrementally validated together). Fall back to
                    // one single-step command per point and count it as a
                    // compression failure, per spec's soft-failure policy.
                    self.error_count += 1;
                    let points = std::mem::take(&mut self.open_run);
                    for t in points {
                        let interval = t - self.base_clock;
                        self.emit_single(interval);
                    }
                }
            }
        }
        self.open_run.clear();
    }

    fn emit_single(&mut self, interval: i64) {
        let base = self.base_clock;
        if interval < 0 || interval > u32::MAX as i64 {
            self.error_count += 1;
            self.commands.push(QueuedItem::Step {
                clock: base.max(0) as u64,
                interval: 0,
                count: 1,
                add: 0,
            });
            return;
        }
        self.commands.push(QueuedItem::Step {
            clock: (base + interval).max(0) as u64,
            interval: interval as u32,
            count: 1,
            add: 0,
        });
        self.base_clock = base + interval;
    }

    /// Finds `(interval, add)` such that every point in `points`
    /// reconstructs within `max_error` of its target, maximising how many
    /// of the small integer `add` candidates near zero are tried first.
    fn fit(&self, points: &[i64]) -> Option<(i64, i64)> {
        let base = self.base_clock;
        let n = points.len();
        if n == 0 {
            return None;
        }
        let interval = points[0] - base;
        if interval < 0 || interval > u32::MAX as i64 {
            return None;
        }
        if n == 1 {
            return Some((interval, 0));
        }
        for add in add_search_order() {
            let recon = reconstruct(interval, add, n);
            let fits = recon
                .iter()
                .zip(points.iter())
                .all(|(&r, &t)| (base + r - t).abs() <= self.max_error);
            if fits {
                return Some((interval, add));
            }
        }
        None
    }
}

/// Reconstructs the `count` cumulative pulse offsets from the run's base,
/// per `r[0] = interval`, `r[k] = r[k-1] + interval + k*add`.
fn reconstruct(interval: i64, add: i64, count: usize) -> Vec<i64> {
    let mut out = Vec::with_capacity(count);
    let mut acc = 0i64;
    for k in 0..count {
        acc += interval + (k as i64) * add;
        out.push(acc);
    }
    out
}

fn add_search_order() -> impl Iterator<Item = i64> {
    std::iter::once(0).chain((1..=ADD_SEARCH_RADIUS).flat_map(|d| [d, -d]))
}
