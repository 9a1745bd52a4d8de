#![deny(clippy::all)]

//! # MCU Protocol
//!
//! The host-side half of Klipper's message-template protocol: a firmware
//! self-description dictionary, dynamic command template resolution, and
//! the config-command CRC-32 used to verify host and firmware agree on a
//! configuration. Wire framing, retransmission and acknowledgement are not
//! part of this crate — they belong to the SerialLink boundary consumed by
//! `mcu-host`.

pub mod crc;
pub mod registry;
pub mod template;

pub use crc::crc32;
pub use registry::Dictionary;
pub use template::{CommandTemplate, EncodedCommand, Param, WireType};

use thiserror::Error;

/// Errors raised while resolving or encoding command templates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("config key {0} was not reported by the firmware dictionary")]
    MissingConfigKey(String),
    #[error("no command template registered for {0:?}")]
    UnknownTemplate(String),
    #[error("malformed command template {0:?}")]
    MalformedTemplate(String),
    #[error("template expects {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },
}
