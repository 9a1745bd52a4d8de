//! Endstop device object: homing trigger plus periodic liveness polling.
//!
//! Grounded on `MCU_endstop` in `mcu.py`. Device objects never hold a
//! transport reference (see [`crate::devices`] module docs), so the
//! commands this type wants sent are returned to the caller instead of
//! sent directly; [`crate::session::McuSession`] is what actually talks to
//! the [`crate::serial_link::SerialLink`].

use mcu_proto::{CommandTemplate, Dictionary, EncodedCommand};

use crate::error::McuError;
use crate::pins::parse_pin;

/// How often, in seconds, a still-homing endstop is re-polled with
/// `end_stop_query` if the firmware hasn't spontaneously reported a state
/// change.
const RETRY_QUERY_SECONDS: f64 = 1.0;

pub struct Endstop {
    oid: u8,
    stepper_oid: u8,
    invert: bool,
    home_cmd: CommandTemplate,
    query_cmd: CommandTemplate,
    homing: bool,
    next_query_clock: u64,
    retry_query_ticks: u64,
}

impl Endstop {
    pub fn new(
        oid: u8,
        pin: &str,
        stepper_oid: u8,
        mcu_freq: f64,
        dictionary: &Dictionary,
    ) -> Result<(Self, String), McuError> {
        let parsed = parse_pin(pin, true);
        let config_cmd = format!(
            "config_end_stop oid={} pin={} pull_up={} stepper_oid={}",
            oid, parsed.pin, parsed.pullup as u8, stepper_oid
        );
        let home_cmd = dictionary
            .lookup_command("end_stop_home oid=%c clock=%u rest_ticks=%u pin_value=%c")?
            .clone();
        let query_cmd = dictionary.lookup_command("end_stop_query oid=%c")?.clone();
        let device = Self {
            oid,
            stepper_oid,
            invert: parsed.invert,
            home_cmd,
            query_cmd,
            homing: false,
            next_query_clock: 0,
            retry_query_ticks: (mcu_freq * RETRY_QUERY_SECONDS) as u64,
        };
        Ok((device, config_cmd))
    }

    pub fn oid(&self) -> u8 {
        self.oid
    }

    pub fn stepper_oid(&self) -> u8 {
        self.stepper_oid
    }

    /// Begins a homing move; returns the `end_stop_home` command to send.
    pub fn home(&mut self, clock: u64, rest_ticks: u32) -> EncodedCommand {
        self.homing = true;
        self.next_query_clock = clock + self.retry_query_ticks;
        let pin_value = 1 ^ self.invert as i64;
        self.home_cmd
            .encode(&[self.oid as i64, clock as i64, rest_ticks as i64, pin_value])
            .expect("end_stop_home template takes exactly (oid, clock, rest_ticks, pin_value)")
    }

    /// Whether this endstop is still actively homing, and a query command
    /// to send if the poll interval has elapsed without a state update.
    pub fn is_homing(&mut self, last_clock: u64) -> (bool, Option<EncodedCommand>) {
        if !self.homing {
            return (false, None);
        }
        if last_clock >= self.next_query_clock {
            self.next_query_clock = last_clock + self.retry_query_ticks;
            let query = self
                .query_cmd
                .encode(&[self.oid as i64])
                .expect("end_stop_query template takes exactly (oid,)");
            return (true, Some(query));
        }
        (true, None)
    }

    /// Applies a firmware-reported `end_stop_state` event.
    pub fn handle_end_stop_state(&mut self, homing: bool) {
        self.homing = homing;
    }
}
