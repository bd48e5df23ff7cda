//! Force feedback between the virtual gamepad and the remote controller
//!
//! Games upload, erase and play rumble effects on the virtual gamepad. The
//! kernel queues those requests on the uinput handle; a [`FeedbackSource`]
//! drains them through the [`ForceFeedbackBridge`], which keeps the single
//! active effect and turns play requests into wire commands.
//!
//! ```text
//! game ──► uinput queue ──► FeedbackSource ──► ForceFeedbackBridge ──► OutboundCommand
//!                                ▲                    │
//!                                └──── acknowledge ◄──┘
//! ```

pub mod bridge;

pub use bridge::{EffectState, FeedbackAction, FeedbackRequest, ForceFeedbackBridge};

use crate::protocol::OutboundCommand;
use std::io;

/// A device whose queue carries force feedback requests
pub trait FeedbackSource {
    /// Routes every request queued right now through `bridge`.
    ///
    /// Returns the commands that must go out on the wire, in queue order.
    /// An empty queue is not an error.
    fn drain_feedback(
        &mut self,
        bridge: &mut ForceFeedbackBridge,
    ) -> io::Result<Vec<OutboundCommand>>;
}
