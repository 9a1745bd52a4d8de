//! Command templates resolved from a firmware self-description dictionary.
//!
//! Klipper does not hard-code message ids: the host looks up a human
//! readable format string such as `"queue_step oid=%c interval=%u
//! count=%hu add=%hi"` against the dictionary the firmware reported at
//! connect time, and gets back an opaque id plus an argument schema. This
//! module implements that lookup and the rendering of a resolved template
//! plus arguments into an [`EncodedCommand`].

use std::fmt;

use crate::ProtoError;

/// The wire type of one template argument, taken from its `%`-conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// `%c` - small unsigned value (oid, single byte on the wire).
    U8,
    /// `%u` - unsigned 32-bit value.
    U32,
    /// `%hu` - unsigned 16-bit value.
    U16,
    /// `%hi` - signed 16-bit value.
    I16,
    /// `%i` - signed 32-bit value.
    I32,
}

impl WireType {
    fn from_conversion(s: &str) -> Option<Self> {
        match s {
            "%c" => Some(WireType::U8),
            "%u" => Some(WireType::U32),
            "%hu" => Some(WireType::U16),
            "%hi" => Some(WireType::I16),
            "%i" => Some(WireType::I32),
            _ => None,
        }
    }
}

/// One named, typed argument of a command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub wire_type: WireType,
}

/// A command template resolved from the firmware dictionary: an opaque
/// message id plus an ordered argument schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub msgid: u16,
    pub name: String,
    pub params: Vec<Param>,
}

impl CommandTemplate {
    /// Parses a format string (e.g. `"queue_step oid=%c interval=%u"`) into
    /// a template, assigning it `msgid`.
    pub fn parse(format: &str, msgid: u16) -> Result<Self, ProtoError> {
        let mut tokens = format.split_whitespace();
        let name = tokens
            .next()
            .ok_or_else(|| ProtoError::MalformedTemplate(format.to_string()))?
            .to_string();

        let mut params = Vec::new();
        for token in tokens {
            let (key, conv) = token
                .split_once('=')
                .ok_or_else(|| ProtoError::MalformedTemplate(format.to_string()))?;
            let wire_type = WireType::from_conversion(conv)
                .ok_or_else(|| ProtoError::MalformedTemplate(format.to_string()))?;
            params.push(Param {
                name: key.to_string(),
                wire_type,
            });
        }

        Ok(Self {
            msgid,
            name,
            params,
        })
    }

    /// Encodes `args` (in declaration order) against this template's schema.
    ///
    /// The wire representation this core deals in is the same textual
    /// `name key=value ...` form the firmware dictionary round-trips over
    /// debug/offline links; the binary packing of that text onto the wire is
    /// the SerialLink's job and is out of scope here.
    pub fn encode(&self, args: &[i64]) -> Result<EncodedCommand, ProtoError> {
        if args.len() != self.params.len() {
            return Err(ProtoError::ArityMismatch {
                expected: self.params.len(),
                got: args.len(),
            });
        }
        let fields = self
            .params
            .iter()
            .zip(args.iter())
            .map(|(p, &v)| (p.name.clone(), v))
            .collect();
        Ok(EncodedCommand {
            msgid: self.msgid,
            name: self.name.clone(),
            fields,
        })
    }
}

/// A fully-resolved command ready to hand to a `SerialLink`: the opaque
/// message id (for a real wire implementation) and the rendered textual
/// form (used by offline replay and by config-CRC computation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand {
    pub msgid: u16,
    pub name: String,
    pub fields: Vec<(String, i64)>,
}

impl fmt::Display for EncodedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (k, v) in &self.fields {
            write!(f, " {}={}", k, v)?;
        }
        Ok(())
    }
}

/// Parses an already fully-rendered command line (e.g. a raw `custom`
/// config line, or `allocate_oids count=5`) into an [`EncodedCommand`]
/// without going through a schema. Mirrors `msgparser.create_command`.
pub fn create_command(text: &str, msgid: u16) -> EncodedCommand {
    let mut tokens = text.split_whitespace();
    let name = tokens.next().unwrap_or_default().to_string();
    let fields = tokens
        .filter_map(|tok| {
            let (k, v) = tok.split_once('=')?;
            let v: i64 = v.parse().unwrap_or(0);
            Some((k.to_string(), v))
        })
        .collect();
    EncodedCommand {
        msgid,
        name,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_queue_step_template() {
        let t =
            CommandTemplate::parse("queue_step oid=%c interval=%u count=%hu add=%hi", 5).unwrap();
        assert_eq!(t.name, "queue_step");
        assert_eq!(t.msgid, 5);
        assert_eq!(
            t.params,
            vec![
                Param { name: "oid".into(), wire_type: WireType::U8 },
                Param { name: "interval".into(), wire_type: WireType::U32 },
                Param { name: "count".into(), wire_type: WireType::U16 },
                Param { name: "add".into(), wire_type: WireType::I16 },
            ]
        );
    }

    #[test]
    fn encode_renders_textual_form() {
        let t = CommandTemplate::parse("set_next_step_dir oid=%c dir=%c", 1).unwrap();
        let cmd = t.encode(&[3, 1]).unwrap();
        assert_eq!(cmd.to_string(), "set_next_step_dir oid=3 dir=1");
    }

    #[test]
    fn encode_rejects_arity_mismatch() {
        let t = CommandTemplate::parse("get_config", 2).unwrap();
        assert!(t.encode(&[1]).is_err());
    }

    #[test]
    fn create_command_parses_raw_text() {
        let cmd = create_command("allocate_oids count=3", 0);
        assert_eq!(cmd.name, "allocate_oids");
        assert_eq!(cmd.fields, vec![("count".to_string(), 3)]);
    }
}
