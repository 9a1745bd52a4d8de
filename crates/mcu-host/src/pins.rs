//! Pin string parsing.
//!
//! Every pin name that reaches a Device Object may be prefixed with `^`
//! (enable pull-up, only meaningful on peripherals that accept it) and/or
//! `!` (invert polarity). Mirrors `parse_pin_extras` in `mcu.py`.

/// The symbolic pin-alias table indirection named by `[mcu pin_map]` in
/// `mcu.py` (`mcu_to_pins`/`map_pins`/`update_command`). The table data
/// itself (a board's alias list) is out of scope for this core; this trait
/// is the seam the core calls through, so a caller that does carry such a
/// table can plug it in without the core needing to know its format.
pub trait PinMap {
    /// Rewrites a bare pin name before prefix parsing, e.g. resolving a
    /// board-specific alias like `ar9` to `PB5`.
    fn map_pin(&self, name: &str) -> String;

    /// Rewrites an already-rendered config command line, mirroring
    /// `mcu.py`'s `update_command` hook.
    fn update_command(&self, line: &str) -> String;
}

/// The default/test/offline `PinMap`: every name and command line passes
/// through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPinMap;

impl PinMap for IdentityPinMap {
    fn map_pin(&self, name: &str) -> String {
        name.to_string()
    }

    fn update_command(&self, line: &str) -> String {
        line.to_string()
    }
}

/// A parsed pin string: the bare pin name plus its pull-up and invert bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPin {
    pub pin: String,
    pub pullup: bool,
    pub invert: bool,
}

/// Parses a pin string of the form `[^][!]<name>`.
///
/// `^` sets both pull-up and invert; a subsequent `!` toggles invert again.
/// `can_pullup` gates whether `^` is recognized at all (some peripherals,
/// e.g. digital/PWM outputs, never accept an input pull-up).
pub fn parse_pin(pin: &str, can_pullup: bool) -> ParsedPin {
    let mut rest = pin;
    let mut pullup = false;
    let mut invert = false;

    if can_pullup {
        if let Some(stripped) = rest.strip_prefix('^') {
            pullup = true;
            invert = true;
            rest = stripped.trim_start();
        }
    }
    if let Some(stripped) = rest.strip_prefix('!') {
        invert = !invert;
        rest = stripped.trim_start();
    }

    ParsedPin {
        pin: rest.trim().to_string(),
        pullup,
        invert,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_pin() {
        let p = parse_pin("PA0", true);
        assert_eq!(p, ParsedPin { pin: "PA0".into(), pullup: false, invert: false });
    }

    #[test]
    fn inverted_pin() {
        let p = parse_pin("!PA0", true);
        assert_eq!(p, ParsedPin { pin: "PA0".into(), pullup: false, invert: true });
    }

    #[test]
    fn pullup_pin_implies_invert() {
        let p = parse_pin("^PA0", true);
        assert_eq!(p, ParsedPin { pin: "PA0".into(), pullup: true, invert: true });
    }

    #[test]
    fn pullup_then_bang_toggles_invert_back_off() {
        let p = parse_pin("^!PA0", true);
        assert_eq!(p, ParsedPin { pin: "PA0".into(), pullup: true, invert: false });
    }

    #[test]
    fn pullup_ignored_when_not_supported() {
        let p = parse_pin("^PA0", false);
        assert_eq!(p, ParsedPin { pin: "^PA0".into(), pullup: false, invert: false });
    }

    #[test]
    fn identity_pin_map_passes_everything_through() {
        let map = IdentityPinMap;
        assert_eq!(map.map_pin("ar9"), "ar9");
        assert_eq!(map.update_command("config_stepper oid=0"), "config_stepper oid=0");
    }
}
