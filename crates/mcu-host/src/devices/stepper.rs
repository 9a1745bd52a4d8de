//! Stepper device object: direction tracking plus a dedicated Step Queue.
//!
//! Grounded on `MCU_stepper` in `mcu.py`.

use mcu_proto::{CommandTemplate, Dictionary, EncodedCommand};

use crate::devices::{CLOCK_NEVER, CLOCK_WINDOW};
use crate::error::McuError;
use crate::pins::parse_pin;
use crate::stepcompress::{QueuedItem, StepQueue};

pub struct Stepper {
    oid: u8,
    invert_dir: bool,
    /// Last direction sent, or `None` before the first move (mirrors the
    /// Python `-1` sentinel).
    sdir: Option<u8>,
    last_move_clock: i64,
    queue: StepQueue,
    dir_cmd: CommandTemplate,
    reset_cmd: CommandTemplate,
}

impl Stepper {
    /// Allocates a stepper's queue and renders its `config_stepper` line.
    /// Returns the device plus that config line for the caller to append
    /// to the session's pending config commands.
    pub fn new(
        oid: u8,
        step_pin: &str,
        dir_pin: &str,
        min_stop_interval: u32,
        max_error: u32,
        dictionary: &Dictionary,
    ) -> Result<(Self, String), McuError> {
        let step = parse_pin(step_pin, false);
        let dir = parse_pin(dir_pin, false);
        let config_cmd = format!(
            "config_stepper oid={} step_pin={} dir_pin={} min_stop_interval={} invert_step={}",
            oid,
            step.pin,
            dir.pin,
            min_stop_interval,
            step.invert as u8
        );
        let dir_cmd = dictionary
            .lookup_command("set_next_step_dir oid=%c dir=%c")?
            .clone();
        let reset_cmd = dictionary
            .lookup_command("reset_step_clock oid=%c clock=%u")?
            .clone();
        let device = Self {
            oid,
            invert_dir: dir.invert,
            sdir: None,
            last_move_clock: CLOCK_NEVER,
            queue: StepQueue::new(max_error),
            dir_cmd,
            reset_cmd,
        };
        Ok((device, config_cmd))
    }

    pub fn oid(&self) -> u8 {
        self.oid
    }

    /// Forgets direction and move-clock state after the stepper comes to a
    /// full stop (e.g. at the end of a homing move).
    pub fn note_stepper_stop(&mut self) {
        self.sdir = None;
        self.last_move_clock = CLOCK_NEVER;
    }

    fn reset_command(&self, clock: i64) -> EncodedCommand {
        self.reset_cmd
            .encode(&[self.oid as i64, clock])
            .expect("reset_step_clock template takes exactly (oid, clock)")
    }

    pub fn reset_step_clock(&mut self, clock: i64) {
        let marker = self.reset_command(clock);
        self.queue.reset(clock, marker);
    }

    /// Queues a direction change if needed, automatically resetting the
    /// step clock first when the previous move is more than
    /// [`CLOCK_WINDOW`] ticks behind.
    pub fn set_next_step_dir(&mut self, sdir: u8, clock: i64) {
        if clock - self.last_move_clock >= CLOCK_WINDOW {
            self.reset_step_clock(clock);
        }
        self.last_move_clock = clock;
        if self.sdir == Some(sdir) {
            return;
        }
        self.sdir = Some(sdir);
        let actual_dir = (sdir ^ self.invert_dir as u8) as i64;
        let cmd = self
            .dir_cmd
            .encode(&[self.oid as i64, actual_dir])
            .expect("set_next_step_dir template takes exactly (oid, dir)");
        self.queue.queue_msg(cmd);
    }

    pub fn step(&mut self, step_time_ticks: i64) {
        self.queue.push(step_time_ticks);
    }

    pub fn step_sqrt(
        &mut self,
        steps: u32,
        step_offset: u32,
        clock_offset: i64,
        sqrt_offset: f64,
        factor: f64,
    ) -> i64 {
        self.queue
            .push_sqrt(steps, step_offset, clock_offset, sqrt_offset, factor)
    }

    pub fn step_factor(
        &mut self,
        steps: u32,
        step_offset: u32,
        clock_offset: i64,
        factor: f64,
    ) -> i64 {
        self.queue.push_factor(steps, step_offset, clock_offset, factor)
    }

    pub fn get_errors(&self) -> u32 {
        self.queue.get_errors()
    }

    /// Flushes the open run and drains every committed command, for the
    /// Stepper Synchroniser to dispatch.
    pub fn drain_ready(&mut self) -> Vec<QueuedItem> {
        self.queue.flush_pending();
        self.queue.drain()
    }

    /// Returns, without removing them, the committed commands at or before
    /// `horizon`. Used by the Stepper Synchroniser to decide, across every
    /// stepper at once, how many of this queue's ready items its
    /// `move_count` cap actually allows it to release this flush.
    pub fn peek_ready_upto(&self, horizon: u64) -> Vec<QueuedItem> {
        self.queue.peek_upto(horizon)
    }

    /// Drains exactly the first `n` committed commands, leaving the
    /// remainder (later ones, plus any still-open run) buffered for the
    /// next flush.
    pub fn drain_ready_n(&mut self, n: usize) -> Vec<QueuedItem> {
        self.queue.drain_n(n)
    }

    pub fn last_output_clock(&self) -> u64 {
        self.queue.last_output_clock()
    }
}
