//! MCU-level session options.
//!
//! General `printer.cfg` parsing (steppers, heaters, kinematics) stays out
//! of scope for this core; these are just the options the `[mcu]` section
//! itself feeds into an `MCU_session` (mirrors `mcu.py`'s
//! `config.getint('baud', ...)` / `config.get('serial', ...)` reads).

/// Options consumed when building an [`crate::session::McuSession`].
#[derive(Debug, Clone)]
pub struct McuSessionConfig {
    /// Serial baud rate. Ignored by offline replay.
    pub baud: u32,
    /// Serial device path. Ignored by offline replay.
    pub serial: String,
    /// Name of a user pin map to resolve symbolic pins against, if any.
    /// `None` means "use the firmware's default pin map".
    pub pin_map: Option<String>,
    /// Raw newline-separated config lines appended verbatim (after `#`
    /// comment stripping and whitespace trimming) ahead of the rest of the
    /// generated config commands.
    pub custom: String,
}

impl Default for McuSessionConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            serial: "/dev/ttyS0".to_string(),
            pin_map: None,
            custom: String::new(),
        }
    }
}

impl McuSessionConfig {
    /// Splits `custom` into config commands, stripping `#` comments and
    /// blank lines, mirroring `MCU._add_custom`.
    pub fn custom_commands(&self) -> Vec<String> {
        self.custom
            .split('\n')
            .filter_map(|line| {
                let line = match line.find('#') {
                    Some(cpos) => &line[..cpos],
                    None => line,
                };
                let line = line.trim();
                if line.is_empty() {
                    None
                } else {
                    Some(line.to_string())
                }
            })
            .collect()
    }
}
