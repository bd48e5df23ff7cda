//! Wire protocol between the remote gamepad and the bridge
//!
//! Two fixed binary layouts travel over UDP:
//!
//! 1. [`telemetry`] - inbound controller state, 58 bytes per datagram
//! 2. [`command`] - outbound rumble commands, 4 bytes per datagram
//!
//! # Layout
//!
//! ```text
//! Inbound (little-endian)
//! ┌──────────┬──────────┬──────────┬───────────┬─────────┬────────────────┐
//! │ accel    │ gyro     │ reserved │ timestamp │ buttons │ sticks         │
//! │ 3 x f32  │ 3 x f32  │ 6 bytes  │ u64       │ u32     │ 4 x f32        │
//! │ @0       │ @12      │ @24      │ @30       │ @38     │ @42            │
//! └──────────┴──────────┴──────────┴───────────┴─────────┴────────────────┘
//!
//! Outbound
//! ┌────────┬───────────┬─────────────────┐
//! │ opcode │ magnitude │ duration u16 LE │
//! └────────┴───────────┴─────────────────┘
//! ```
//!
//! The codec is pure: no sockets, no devices, no allocation.

pub mod command;
pub mod error;
pub mod telemetry;

pub use command::{encode_command, scale_magnitude, OutboundCommand, COMMAND_LEN, OPCODE_PLAY, OPCODE_STOP};
pub use error::DecodeError;
pub use telemetry::{decode_telemetry, StickPosition, TelemetryPacket, Vector3, TELEMETRY_PACKET_LEN};
