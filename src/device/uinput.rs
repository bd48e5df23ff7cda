//! uinput-backed virtual devices
//!
//! Thin adapters over `evdev::uinput::VirtualDevice`. Registration reads the
//! same static tables the sink uses, so every code the sink writes is enabled.

use super::error::DeviceError;
use super::mapping::{AxisSpec, GAMEPAD_AXES, GAMEPAD_BUTTONS, MOTION_AXES};
use super::sink::EventWriter;
use crate::config::DeviceConfig;
use crate::feedback::{
    EffectState, FeedbackAction, FeedbackRequest, FeedbackSource, ForceFeedbackBridge,
};
use crate::protocol::OutboundCommand;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AttributeSet, BusType, EventSummary, EventType, FFEffectCode, FFEffectData, FFEffectKind,
    InputEvent, InputId, KeyCode, MiscCode, PropType, UInputCode,
};
use std::io;
use tracing::{debug, info, warn};

const VENDOR_ID: u16 = 0x057e;
const PRODUCT_ID: u16 = 0x0341;

/// A created uinput device that buffers events until the frame's `SYN_REPORT`
pub struct UinputDevice {
    name: String,
    device: VirtualDevice,
    frame: Vec<InputEvent>,
}

impl UinputDevice {
    /// Creates the gamepad: buttons, both sticks, timestamp, rumble
    pub fn create_gamepad(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let mut keys = AttributeSet::<KeyCode>::new();
        for mapping in GAMEPAD_BUTTONS {
            keys.insert(mapping.code);
        }

        let mut effects = AttributeSet::<FFEffectCode>::new();
        for effect in [
            FFEffectCode::FF_RUMBLE,
            FFEffectCode::FF_PERIODIC,
            FFEffectCode::FF_SQUARE,
            FFEffectCode::FF_TRIANGLE,
            FFEffectCode::FF_SINE,
            FFEffectCode::FF_GAIN,
        ] {
            effects.insert(effect);
        }

        let name = config.gamepad_name.clone();
        let build = || -> io::Result<VirtualDevice> {
            let builder = base_builder(&name)?
                .with_keys(&keys)?
                .with_ff(&effects)?
                .with_ff_effects_max(config.ff_effects_max);
            with_axes(builder, GAMEPAD_AXES)?.build()
        };

        let device = build().map_err(|source| DeviceError::Creation {
            device: "gamepad",
            source,
        })?;
        info!(
            "Created virtual gamepad '{}' with {} buttons and {} effect slots",
            name,
            GAMEPAD_BUTTONS.len(),
            config.ff_effects_max
        );
        Ok(Self::wrap(name, device))
    }

    /// Creates the motion sensor: accelerometer, gyroscope, timestamp
    pub fn create_motion(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let mut properties = AttributeSet::<PropType>::new();
        properties.insert(PropType::ACCELEROMETER);

        let name = config.motion_name.clone();
        let build = || -> io::Result<VirtualDevice> {
            let builder = base_builder(&name)?.with_properties(&properties)?;
            with_axes(builder, MOTION_AXES)?.build()
        };

        let device = build().map_err(|source| DeviceError::Creation {
            device: "motion",
            source,
        })?;
        info!("Created virtual motion sensor '{}'", name);
        Ok(Self::wrap(name, device))
    }

    fn wrap(name: String, device: VirtualDevice) -> Self {
        Self {
            name,
            device,
            frame: Vec::with_capacity(32),
        }
    }

    fn pending_events(&mut self) -> io::Result<Vec<InputEvent>> {
        match self.device.fetch_events() {
            Ok(events) => Ok(events.collect()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

fn base_builder(name: &str) -> io::Result<VirtualDeviceBuilder<'_>> {
    let mut timestamps = AttributeSet::<MiscCode>::new();
    timestamps.insert(MiscCode::MSC_TIMESTAMP);

    VirtualDevice::builder()?
        .name(name)
        .input_id(InputId::new(BusType::BUS_VIRTUAL, VENDOR_ID, PRODUCT_ID, 1))
        .with_msc(&timestamps)
}

fn with_axes<'a>(
    mut builder: VirtualDeviceBuilder<'a>,
    axes: &[AxisSpec],
) -> io::Result<VirtualDeviceBuilder<'a>> {
    for spec in axes {
        builder = builder.with_absolute_axis(&spec.abs_setup())?;
    }
    Ok(builder)
}

impl EventWriter for UinputDevice {
    fn write_event(&mut self, event: InputEvent) -> io::Result<()> {
        if event.event_type() != EventType::SYNCHRONIZATION {
            self.frame.push(event);
            return Ok(());
        }
        // emit() closes the batch with its own SYN_REPORT
        let result = self.device.emit(&self.frame);
        self.frame.clear();
        result
    }
}

impl FeedbackSource for UinputDevice {
    fn drain_feedback(
        &mut self,
        bridge: &mut ForceFeedbackBridge,
    ) -> io::Result<Vec<OutboundCommand>> {
        let events = self.pending_events()?;
        let name = self.name.clone();
        Ok(collect_commands(&name, events, |event| self.route(event, bridge)))
    }
}

impl UinputDevice {
    /// Hands one queued event to the bridge and completes the kernel handshake
    /// for uploads and erases
    fn route(
        &mut self,
        event: InputEvent,
        bridge: &mut ForceFeedbackBridge,
    ) -> io::Result<Option<OutboundCommand>> {
        match event.destructure() {
            EventSummary::UInput(event, UInputCode::UI_FF_UPLOAD, ..) => {
                let mut upload = self.device.process_ff_upload(event)?;
                let effect = effect_state(&upload.effect());
                if bridge.handle(FeedbackRequest::Upload(effect)) == FeedbackAction::Acknowledge {
                    upload.set_retval(0);
                }
            }
            EventSummary::UInput(event, UInputCode::UI_FF_ERASE, ..) => {
                let mut erase = self.device.process_ff_erase(event)?;
                if bridge.handle(FeedbackRequest::Erase) == FeedbackAction::Acknowledge {
                    erase.set_retval(0);
                }
            }
            EventSummary::UInput(_, code, value) => {
                warn!("{}: unhandled uinput request {:?} ({})", self.name, code, value);
            }
            EventSummary::ForceFeedback(_, code, value) => {
                let request = if code == FFEffectCode::FF_GAIN {
                    FeedbackRequest::SetGain(value)
                } else {
                    FeedbackRequest::Play {
                        effect_id: code.0,
                        intensity: value,
                    }
                };
                if let FeedbackAction::Send(command) = bridge.handle(request) {
                    return Ok(Some(command));
                }
            }
            other => debug!("{}: ignoring {:?}", self.name, other),
        }
        Ok(None)
    }
}

/// Routes every queued event. A request that fails is logged and dropped;
/// the rest of the queue is still handled.
fn collect_commands<T>(
    device: &str,
    events: impl IntoIterator<Item = T>,
    mut route: impl FnMut(T) -> io::Result<Option<OutboundCommand>>,
) -> Vec<OutboundCommand> {
    let mut commands = Vec::new();
    for event in events {
        match route(event) {
            Ok(Some(command)) => commands.push(command),
            Ok(None) => {}
            Err(e) => warn!("{}: failed to process feedback request: {}", device, e),
        }
    }
    commands
}

/// Reduces a kernel effect to duration and a 16-bit strength
fn effect_state(effect: &FFEffectData) -> EffectState {
    let magnitude = match effect.kind {
        FFEffectKind::Rumble {
            strong_magnitude,
            weak_magnitude,
        } => strong_magnitude.max(weak_magnitude),
        FFEffectKind::Periodic { magnitude, .. } => signed_magnitude(magnitude),
        FFEffectKind::Constant { level, .. } => signed_magnitude(level),
        _ => 0,
    };

    EffectState {
        duration_ms: effect.replay.length,
        magnitude,
    }
}

/// Maps |i16| onto the full u16 range
fn signed_magnitude(value: i16) -> u16 {
    value.unsigned_abs().saturating_mul(2)
}
