//! Error types for the MCU coordination core.
//!
//! Anything that affects hardware safety or protocol consistency is fatal
//! (this module); anything that affects print quality or telemetry is
//! logged and counted instead (see [`crate::stepcompress`]'s error counter
//! and `ClockWindowExceeded`'s automatic recovery, neither of which is
//! surfaced as an error here).

use thiserror::Error;

/// Fatal errors raised by the MCU coordination core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum McuError {
    /// The firmware reported `is_config=true` with a CRC that does not
    /// match the host's computed config CRC. The firmware was configured
    /// by some other process; user action is required.
    #[error("Printer CRC does not match config (expected {expected}, got {got})")]
    ConfigMismatch { expected: u32, got: u32 },

    /// The firmware sent `shutdown` or `is_shutdown`.
    #[error("MCU {name} shut down: {message}")]
    FirmwareShutdown { name: String, message: String },

    /// The underlying link reported an unrecoverable I/O failure.
    #[error("serial link failure: {0}")]
    LinkIo(String),

    #[error(transparent)]
    Proto(#[from] mcu_proto::ProtoError),
}
