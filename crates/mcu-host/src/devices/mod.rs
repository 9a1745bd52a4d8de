//! Typed device objects.
//!
//! Each device object owns its own oid and command templates and renders
//! its own config line; none of them hold a reference back to the session
//! that created them, matching the spec's "any method suspending is a
//! defect" rule for the cooperative reactor (a device object is data plus
//! pure encode logic, nothing it does can block).

pub mod adc;
pub mod digital_out;
pub mod endstop;
pub mod pwm;
pub mod stepper;

pub use adc::Adc;
pub use digital_out::DigitalOut;
pub use endstop::Endstop;
pub use pwm::Pwm;
pub use stepper::Stepper;

/// An MCU clock value that can never legitimately occur, used as the
/// "no previous move" sentinel (mirrors Klipper's `-2**29`).
pub const CLOCK_NEVER: i64 = -(1i64 << 29);

/// Clock window a stepper may run ahead of its last `reset_step_clock`
/// before another reset is mandatory (2^29 ticks, per spec.md).
pub const CLOCK_WINDOW: i64 = 1 << 29;
