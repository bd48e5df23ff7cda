//! Telemetry to evdev translation
//!
//! The sink turns each decoded packet into two event frames, one per virtual
//! device, each closed by a `SYN_REPORT`. Buttons are only written when their
//! state changes; axes, the timestamp and the sync marker are written for every
//! packet.

use super::mapping::{AxisSpec, GAMEPAD_AXES, GAMEPAD_BUTTONS, MOTION_AXES};
use crate::protocol::TelemetryPacket;
use evdev::{EventType, InputEvent, MiscCode, SynchronizationCode};
use std::io;
use tracing::{debug, warn};

/// Destination for raw input events.
///
/// A `SYN_REPORT` event closes a frame; implementations may buffer until then.
/// A failed `SYN_REPORT` write means the whole frame was lost.
pub trait EventWriter {
    fn write_event(&mut self, event: InputEvent) -> io::Result<()>;
}

/// Owns both virtual devices and the last button state written to the gamepad
pub struct VirtualDeviceSink<G, M> {
    gamepad: G,
    motion: M,
    reported_buttons: u32,
}

impl<G: EventWriter, M: EventWriter> VirtualDeviceSink<G, M> {
    pub fn new(gamepad: G, motion: M) -> Self {
        Self {
            gamepad,
            motion,
            reported_buttons: 0,
        }
    }

    pub fn gamepad_mut(&mut self) -> &mut G {
        &mut self.gamepad
    }

    #[cfg(test)]
    pub fn motion_mut(&mut self) -> &mut M {
        &mut self.motion
    }

    /// Pushes one packet to both devices.
    ///
    /// Write failures are logged and skipped; the returned count tells the
    /// caller how many events were lost. Button state only counts as reported
    /// once the gamepad frame carrying it was published, so a lost frame is
    /// resent with the next packet.
    pub fn update(&mut self, packet: &TelemetryPacket) -> usize {
        let (staged, mut failed) = self.write_buttons(packet);
        failed += write_axes(&mut self.gamepad, "gamepad", GAMEPAD_AXES, packet);
        let (published, frame_failed) =
            write_frame_end(&mut self.gamepad, "gamepad", packet.timestamp);
        failed += frame_failed;
        if published {
            self.reported_buttons = staged;
        }

        failed += write_axes(&mut self.motion, "motion", MOTION_AXES, packet);
        failed += write_frame_end(&mut self.motion, "motion", packet.timestamp).1;
        failed
    }

    /// Writes changed buttons and returns the state the device holds once the
    /// frame is published, plus the failure count
    fn write_buttons(&mut self, packet: &TelemetryPacket) -> (u32, usize) {
        let changed = packet.buttons ^ self.reported_buttons;
        let mut staged = self.reported_buttons;
        let mut failed = 0;

        for mapping in GAMEPAD_BUTTONS.iter().filter(|m| changed & m.bit != 0) {
            let pressed = packet.is_held(mapping.bit);
            let event = InputEvent::new(EventType::KEY.0, mapping.code.code(), i32::from(pressed));
            match self.gamepad.write_event(event) {
                Ok(()) => {
                    debug!("{} {}", mapping.name, if pressed { "pressed" } else { "released" });
                    staged ^= mapping.bit;
                }
                Err(e) => {
                    warn!("Failed to write {} button event: {}", mapping.name, e);
                    failed += 1;
                }
            }
        }
        (staged, failed)
    }
}

fn write_axes<W: EventWriter>(
    writer: &mut W,
    device: &str,
    axes: &[AxisSpec],
    packet: &TelemetryPacket,
) -> usize {
    let mut failed = 0;
    for spec in axes {
        let event = InputEvent::new(EventType::ABSOLUTE.0, spec.code.0, spec.value(packet));
        if let Err(e) = writer.write_event(event) {
            warn!("Failed to write {} axis {:?}: {}", device, spec.code, e);
            failed += 1;
        }
    }
    failed
}

/// Timestamp plus the sync marker that publishes the frame.
///
/// Returns whether the sync marker was accepted and how many writes failed.
fn write_frame_end<W: EventWriter>(writer: &mut W, device: &str, timestamp: u64) -> (bool, usize) {
    // MSC_TIMESTAMP is 32 bits wide; keep the low word and let it wrap
    let stamp = timestamp as u32 as i32;
    let mut failed = 0;

    let timestamp_event = InputEvent::new(EventType::MISC.0, MiscCode::MSC_TIMESTAMP.0, stamp);
    if let Err(e) = writer.write_event(timestamp_event) {
        warn!("Failed to write {} timestamp: {}", device, e);
        failed += 1;
    }

    let sync = InputEvent::new(
        EventType::SYNCHRONIZATION.0,
        SynchronizationCode::SYN_REPORT.0,
        0,
    );
    match writer.write_event(sync) {
        Ok(()) => (true, failed),
        Err(e) => {
            warn!("Failed to publish {} frame: {}", device, e);
            (false, failed + 1)
        }
    }
}
