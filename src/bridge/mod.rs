//! The run loop joining the network to the virtual devices
//!
//! ```text
//! UDP ─► decode_telemetry ─► VirtualDeviceSink ─► gamepad / motion
//!                                                    │
//! UDP ◄─ encode_command ◄─ ForceFeedbackBridge ◄─────┘ (uinput queue)
//! ```
//!
//! Everything runs on one task. Each tick does at most one receive and one
//! feedback drain, then sleeps for the configured interval.

pub mod bridge_loop;

pub use bridge_loop::{BridgeError, BridgeLoop, BridgeStats};
