//! Virtual input devices fed by gamepad telemetry
//!
//! Two devices are exposed to the operating system:
//!
//! 1. a gamepad - buttons, two analog sticks, timestamps, rumble
//! 2. a motion sensor - accelerometer, gyroscope, timestamps
//!
//! # Architecture
//!
//! ```text
//! TelemetryPacket ──► VirtualDeviceSink ──► EventWriter (gamepad)
//!                     [mapping tables]  └─► EventWriter (motion)
//! ```
//!
//! [`mapping`] holds the immutable wire-to-evdev tables, [`sink`] the
//! translation, and [`uinput`] the kernel-facing devices.

pub mod error;
pub mod mapping;
pub mod sink;
pub mod uinput;

pub use error::DeviceError;
pub use sink::{EventWriter, VirtualDeviceSink};
pub use uinput::UinputDevice;
