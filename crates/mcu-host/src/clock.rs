//! Clock Mapper: the affine map between host print-time and MCU ticks.
//!
//! Mirrors the clock-syncing half of `mcu.py`'s `MCU` class
//! (`set_print_start_time`, `get_print_buffer_time`, `get_print_clock`).

/// Bidirectional host-time <-> MCU-tick mapping, plus the host<->MCU
/// time-sync offset sampled once per print.
#[derive(Debug, Clone, Copy)]
pub struct ClockMapper {
    clock_freq: f64,
    print_start_clock: f64,
}

impl ClockMapper {
    /// `clock_freq` is read from the firmware dictionary's `CLOCK_FREQ` key
    /// at connect time and is fixed for the life of the session.
    pub fn new(clock_freq: f64) -> Self {
        Self {
            clock_freq,
            print_start_clock: 0.0,
        }
    }

    pub fn clock_freq(&self) -> f64 {
        self.clock_freq
    }

    /// Samples `current_clock` as the new print-time epoch. Called once per
    /// print at `set_print_start_time(eventtime)`.
    pub fn set_print_start_clock(&mut self, current_clock: u64) {
        self.print_start_clock = current_clock as f64;
    }

    /// `print_time (s) -> MCU ticks`.
    pub fn print_clock(&self, print_time: f64) -> u64 {
        (print_time * self.clock_freq + self.print_start_clock) as u64
    }

    /// How far ahead of the MCU's current position the host has already
    /// buffered, given the MCU's `current_clock` right now.
    pub fn buffer_time(&self, last_move_end: f64, current_clock: u64) -> f64 {
        let clock_diff = current_clock as f64 - self.print_start_clock;
        last_move_end - clock_diff / self.clock_freq
    }
}
