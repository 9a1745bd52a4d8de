//! The firmware self-description dictionary.
//!
//! On connect, the firmware reports a dictionary of configuration values
//! (`CLOCK_FREQ`, `MCU`, ...) and the set of command/response format
//! strings it understands, each assigned a message id. This module models
//! that dictionary and the lookups the core performs against it.

use std::collections::HashMap;

use crate::template::CommandTemplate;
use crate::ProtoError;

/// The parsed firmware self-description: config key/value pairs plus the
/// set of resolvable command templates, keyed by their format string.
#[derive(Debug, Default)]
pub struct Dictionary {
    config: HashMap<String, String>,
    templates: HashMap<String, CommandTemplate>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a config key/value pair (e.g. `CLOCK_FREQ` -> `16000000`).
    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    /// Reads a config value, as `msgparser.config[key]` does.
    pub fn config(&self, key: &str) -> Result<&str, ProtoError> {
        self.config
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ProtoError::MissingConfigKey(key.to_string()))
    }

    /// Registers a command format string, assigning it the next msgid.
    pub fn add_command(&mut self, format: &str) -> Result<(), ProtoError> {
        let msgid = self.templates.len() as u16;
        let template = CommandTemplate::parse(format, msgid)?;
        self.templates.insert(format.to_string(), template);
        Ok(())
    }

    /// Resolves a command template by its exact format string, as
    /// `msgparser.lookup_command` does.
    pub fn lookup_command(&self, format: &str) -> Result<&CommandTemplate, ProtoError> {
        self.templates
            .get(format)
            .ok_or_else(|| ProtoError::UnknownTemplate(format.to_string()))
    }

    /// Builds the dictionary a typical printer MCU reports, for tests and
    /// for offline replay where no real firmware connection is available.
    pub fn stub(clock_freq: u32, mcu_name: &str) -> Self {
        let mut dict = Self::new();
        dict.set_config("CLOCK_FREQ", clock_freq.to_string());
        dict.set_config("MCU", mcu_name);
        for format in STUB_COMMAND_FORMATS {
            dict.add_command(format)
                .expect("stub dictionary formats are well-formed");
        }
        dict
    }
}

/// Command/response templates a stub firmware dictionary exposes. Mirrors
/// the vocabulary named in spec.md section 6.
pub const STUB_COMMAND_FORMATS: &[&str] = &[
    "allocate_oids count=%u",
    "finalize_config crc=%u",
    "get_config",
    "config oid=%c",
    "config_stepper oid=%c step_pin=%c dir_pin=%c min_stop_interval=%u invert_step=%c",
    "queue_step oid=%c interval=%u count=%hu add=%hi",
    "set_next_step_dir oid=%c dir=%c",
    "reset_step_clock oid=%c clock=%u",
    "config_end_stop oid=%c pin=%c pull_up=%c stepper_oid=%c",
    "end_stop_home oid=%c clock=%u rest_ticks=%u pin_value=%c",
    "end_stop_query oid=%c",
    "end_stop_state oid=%c homing=%c",
    "config_digital_out oid=%c pin=%c default_value=%c max_duration=%u",
    "schedule_digital_out oid=%c clock=%u value=%c",
    "config_pwm_out oid=%c pin=%c cycle_ticks=%u default_value=%c max_duration=%u",
    "schedule_pwm_out oid=%c clock=%u value=%hu",
    "config_soft_pwm_out oid=%c pin=%c cycle_ticks=%u default_value=%c max_duration=%u",
    "schedule_soft_pwm_out oid=%c clock=%u value=%hu",
    "config_analog_in oid=%c pin=%c",
    "query_analog_in oid=%c clock=%u sample_ticks=%u sample_count=%c rest_ticks=%u min_value=%hu max_value=%hu",
    "analog_in_state oid=%c next_clock=%u value=%hu",
    "stats count=%u sum=%u sumsq=%u",
    "shutdown",
    "is_shutdown",
];
