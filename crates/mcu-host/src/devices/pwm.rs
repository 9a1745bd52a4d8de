//! PWM output device object. Grounded on `MCU_pwm` in `mcu.py`.
//!
//! The decision of *whether* to build a [`Pwm`], a software-cycled
//! [`Pwm`] (`hard_pwm=false`), or fall back to a [`crate::devices::DigitalOut`]
//! given a requested `hard_cycle_ticks` lives in
//! [`crate::session::McuSession::create_pwm`], mirroring `MCU.create_pwm`.

use mcu_proto::{CommandTemplate, Dictionary, EncodedCommand};

use crate::error::McuError;

pub struct Pwm {
    oid: u8,
    last_clock: u64,
    set_cmd: CommandTemplate,
}

impl Pwm {
    /// `hard_pwm` selects `config_pwm_out`/`schedule_pwm_out` (true, a
    /// hardware-timer-driven cycle) versus `config_soft_pwm_out`/
    /// `schedule_soft_pwm_out` (false, firmware-bitbanged).
    pub fn new(
        oid: u8,
        pin: &str,
        cycle_ticks: u32,
        max_duration_ticks: u32,
        hard_pwm: bool,
        dictionary: &Dictionary,
    ) -> Result<(Self, String), McuError> {
        let (config_name, schedule_format) = if hard_pwm {
            ("config_pwm_out", "schedule_pwm_out oid=%c clock=%u value=%hu")
        } else {
            (
                "config_soft_pwm_out",
                "schedule_soft_pwm_out oid=%c clock=%u value=%hu",
            )
        };
        let config_cmd = format!(
            "{} oid={} pin={} cycle_ticks={} default_value=0 max_duration={}",
            config_name, oid, pin, cycle_ticks, max_duration_ticks
        );
        let set_cmd = dictionary.lookup_command(schedule_format)?.clone();
        let device = Self { oid, last_clock: 0, set_cmd };
        Ok((device, config_cmd))
    }

    pub fn oid(&self) -> u8 {
        self.oid
    }

    /// The clock this PWM was last scheduled at, before any pending
    /// [`Pwm::set_pwm`] call updates it — the `minclock` a caller
    /// dispatching that call should pass through to the link, per
    /// `MCU_pwm.set_pwm`'s `minclock=self._last_clock`.
    pub fn last_clock(&self) -> u64 {
        self.last_clock
    }

    pub fn set_pwm(&mut self, clock: u64, value: u16) -> EncodedCommand {
        let cmd = self
            .set_cmd
            .encode(&[self.oid as i64, clock as i64, value as i64])
            .expect("schedule_pwm_out template takes exactly (oid, clock, value)");
        self.last_clock = clock;
        cmd
    }
}
