#![deny(clippy::all)]

//! # MCU Host
//!
//! The host-side MCU coordination core: per-stepper step compression, the
//! affine host-time/MCU-tick clock map, typed device objects, and the
//! connect/build-config/commit session lifecycle. Motion planning, G-code
//! interpretation and the wire transport itself are deliberately out of
//! scope — see [`serial_link::SerialLink`] for the seam this crate expects
//! its caller to provide.

pub mod clock;
pub mod config;
pub mod devices;
pub mod error;
pub mod pins;
pub mod serial_link;
pub mod session;
pub mod stats;
pub mod stepcompress;
pub mod steppersync;

pub use clock::ClockMapper;
pub use config::McuSessionConfig;
pub use error::McuError;
pub use pins::{IdentityPinMap, PinMap};
pub use serial_link::{
    CommandQueueId, ConfigResponse, McuEvent, MockSerialLink, OfflineSerialLink, SerialLink,
};
pub use session::McuSession;
pub use stats::TickStats;
pub use steppersync::{Dispatch, StepperSynchroniser};
