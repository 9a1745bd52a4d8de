//! Digital output device object. Grounded on `MCU_digital_out` in `mcu.py`.

use mcu_proto::{CommandTemplate, Dictionary, EncodedCommand};

use crate::error::McuError;
use crate::pins::parse_pin;

pub struct DigitalOut {
    oid: u8,
    invert: bool,
    last_clock: u64,
    last_value: Option<u8>,
    set_cmd: CommandTemplate,
}

impl DigitalOut {
    pub fn new(
        oid: u8,
        pin: &str,
        max_duration_ticks: u32,
        dictionary: &Dictionary,
    ) -> Result<(Self, String), McuError> {
        let parsed = parse_pin(pin, false);
        let config_cmd = format!(
            "config_digital_out oid={} pin={} default_value={} max_duration={}",
            oid, parsed.pin, parsed.invert as u8, max_duration_ticks
        );
        let set_cmd = dictionary
            .lookup_command("schedule_digital_out oid=%c clock=%u value=%c")?
            .clone();
        let device = Self {
            oid,
            invert: parsed.invert,
            last_clock: 0,
            last_value: None,
            set_cmd,
        };
        Ok((device, config_cmd))
    }

    pub fn oid(&self) -> u8 {
        self.oid
    }

    /// The clock this output was last scheduled at, before any pending
    /// [`DigitalOut::set_digital`] call updates it — the `minclock` a
    /// caller dispatching that call should pass through to the link, per
    /// `MCU_digital_out.set_digital`'s `minclock=self._last_clock`.
    pub fn last_clock(&self) -> u64 {
        self.last_clock
    }

    /// Schedules the pin to take `value` (0 or 1) at `clock`.
    pub fn set_digital(&mut self, clock: u64, value: u8) -> EncodedCommand {
        let applied = value ^ self.invert as u8;
        let cmd = self
            .set_cmd
            .encode(&[self.oid as i64, clock as i64, applied as i64])
            .expect("schedule_digital_out template takes exactly (oid, clock, value)");
        self.last_clock = clock;
        self.last_value = Some(value);
        cmd
    }

    pub fn get_last_setting(&self) -> Option<u8> {
        self.last_value
    }

    /// Treats this as a crude PWM: on above the 50% threshold, off below.
    pub fn set_pwm(&mut self, clock: u64, value: u16) -> EncodedCommand {
        let dval = if value > 127 { 1 } else { 0 };
        self.set_digital(clock, dval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> Dictionary {
        Dictionary::stub(1_000_000, "test-mcu")
    }

    #[test]
    fn set_digital_applies_invert_and_records_last_value() {
        let (mut d, cfg) = DigitalOut::new(0, "!PC0", 2_000_000, &dict()).unwrap();
        assert_eq!(cfg, "config_digital_out oid=0 pin=PC0 default_value=1 max_duration=2000000");
        let cmd = d.set_digital(100, 1);
        assert_eq!(cmd.fields[2], ("value".to_string(), 0));
        assert_eq!(d.get_last_setting(), Some(1));
    }

    #[test]
    fn set_pwm_thresholds_at_half_scale() {
        let (mut d, _) = DigitalOut::new(0, "PC0", 0, &dict()).unwrap();
        let low = d.set_pwm(0, 50);
        assert_eq!(low.fields[2], ("value".to_string(), 0));
        let high = d.set_pwm(1, 200);
        assert_eq!(high.fields[2], ("value".to_string(), 1));
    }
}
