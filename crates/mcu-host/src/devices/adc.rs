//! ADC input device object. Grounded on `MCU_adc` in `mcu.py`.

use mcu_proto::{CommandTemplate, Dictionary, EncodedCommand};

use crate::error::McuError;
use crate::pins::parse_pin;

/// 10-bit ADC: each raw sample averaged by the firmware tops out here.
const ADC_MAX: u32 = 1024;

pub struct Adc {
    oid: u8,
    min_sample: u16,
    max_sample: u16,
    sample_ticks: u32,
    sample_count: u8,
    report_clock: u64,
    last_value: f64,
    last_read_clock: i64,
    max_adc_inv: f64,
    query_cmd: CommandTemplate,
}

impl Adc {
    pub fn new(oid: u8, pin: &str, dictionary: &Dictionary) -> Result<(Self, String), McuError> {
        let parsed = parse_pin(pin, false);
        let config_cmd = format!("config_analog_in oid={} pin={}", oid, parsed.pin);
        let query_cmd = dictionary.lookup_command(
            "query_analog_in oid=%c clock=%u sample_ticks=%u sample_count=%c rest_ticks=%u min_value=%hu max_value=%hu",
        )?.clone();
        let device = Self {
            oid,
            min_sample: 0,
            max_sample: 0xffff,
            sample_ticks: 0,
            sample_count: 1,
            report_clock: 0,
            last_value: 0.0,
            last_read_clock: 0,
            max_adc_inv: 0.0,
            query_cmd,
        };
        Ok((device, config_cmd))
    }

    pub fn oid(&self) -> u8 {
        self.oid
    }

    /// `minval`/`maxval` are in `[0.0, 1.0]` of full scale when given
    /// explicitly. `None` reproduces `mcu.py`'s raw-sentinel defaults
    /// (`0` / `0xffff`, not `0.0`/`1.0` fractions) — multiplying the
    /// `0xffff` sentinel by `max_adc` and clamping to `0xffff` always
    /// saturates `max_sample` to full scale regardless of `sample_count`.
    pub fn set_minmax(
        &mut self,
        sample_ticks: u32,
        sample_count: u8,
        minval: Option<f64>,
        maxval: Option<f64>,
    ) {
        let minval = minval.unwrap_or(0.0);
        let maxval = maxval.unwrap_or(0xffff as f64);
        self.sample_ticks = sample_ticks;
        self.sample_count = sample_count;
        let max_adc = (sample_count as u32) * ADC_MAX;
        self.min_sample = (minval * max_adc as f64) as u16;
        self.max_sample = (0xffffu32.min((maxval * max_adc as f64).ceil() as u32)) as u16;
        self.max_adc_inv = 1.0 / max_adc as f64;
    }

    /// Builds the `query_analog_in` command. The scheduling clock is
    /// staggered per-oid (`mcu_freq * (1.0 + oid*0.01)`) purely to avoid
    /// every ADC channel sampling in lockstep; this constant is inherited
    /// unchanged from the original firmware host and not otherwise
    /// load-bearing.
    pub fn query_analog_in(&mut self, report_clock: u64, mcu_freq: f64, last_clock: u64) -> EncodedCommand {
        self.report_clock = report_clock;
        let clock = last_clock + (mcu_freq * (1.0 + (self.oid as f64) * 0.01)) as u64;
        self.query_cmd
            .encode(&[
                self.oid as i64,
                clock as i64,
                self.sample_ticks as i64,
                self.sample_count as i64,
                report_clock as i64,
                self.min_sample as i64,
                self.max_sample as i64,
            ])
            .expect("query_analog_in template arity is fixed")
    }

    /// Applies a firmware-reported `analog_in_state` event. `next_clock`
    /// must already be translated into this MCU's own clock domain by the
    /// caller (see [`crate::serial_link::SerialLink::translate_clock`]).
    pub fn handle_analog_in_state(&mut self, value: u16, next_clock: u64) {
        self.last_value = value as f64 * self.max_adc_inv;
        self.last_read_clock = next_clock as i64 - self.report_clock as i64;
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn last_read_clock(&self) -> i64 {
        self.last_read_clock
    }
}
