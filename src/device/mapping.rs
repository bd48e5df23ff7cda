//! Static translation tables from wire fields to evdev codes
//!
//! The tables are immutable and shared read-only by the sink and the uinput
//! backends, so device registration and event emission can never disagree.

use crate::protocol::TelemetryPacket;
use evdev::{AbsInfo, AbsoluteAxisCode, KeyCode, UinputAbsSetup};

/// One physical button: its wire bit and the virtual key it drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonMapping {
    pub bit: u32,
    pub code: KeyCode,
    pub name: &'static str,
}

const fn button(bit: u32, code: KeyCode, name: &'static str) -> ButtonMapping {
    ButtonMapping { bit, code, name }
}

/// Every button the gamepad reports, one entry per wire bit
pub const GAMEPAD_BUTTONS: &[ButtonMapping] = &[
    button(0x0000_0001, KeyCode::BTN_TRIGGER_HAPPY1, "Sync"),
    button(0x0000_0002, KeyCode::BTN_MODE, "Home"),
    button(0x0000_0004, KeyCode::BTN_SELECT, "Minus"),
    button(0x0000_0008, KeyCode::BTN_START, "Plus"),
    button(0x0000_0010, KeyCode::BTN_TR, "R"),
    button(0x0000_0020, KeyCode::BTN_TL, "L"),
    button(0x0000_0040, KeyCode::BTN_TR2, "ZR"),
    button(0x0000_0080, KeyCode::BTN_TL2, "ZL"),
    button(0x0000_0100, KeyCode::BTN_DPAD_DOWN, "Down"),
    button(0x0000_0200, KeyCode::BTN_DPAD_UP, "Up"),
    button(0x0000_0400, KeyCode::BTN_DPAD_RIGHT, "Right"),
    button(0x0000_0800, KeyCode::BTN_DPAD_LEFT, "Left"),
    button(0x0000_1000, KeyCode::BTN_NORTH, "Y"),
    button(0x0000_2000, KeyCode::BTN_WEST, "X"),
    button(0x0000_4000, KeyCode::BTN_SOUTH, "B"),
    button(0x0000_8000, KeyCode::BTN_EAST, "A"),
    button(0x0001_0000, KeyCode::BTN_TRIGGER_HAPPY2, "TV"),
    button(0x0002_0000, KeyCode::BTN_THUMBR, "Right stick"),
    button(0x0004_0000, KeyCode::BTN_THUMBL, "Left stick"),
];

/// Direction applied before scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSign {
    Normal,
    Inverted,
}

impl AxisSign {
    fn factor(self) -> f64 {
        match self {
            AxisSign::Normal => 1.0,
            AxisSign::Inverted => -1.0,
        }
    }
}

/// Converts a normalized float to integer device units.
///
/// 1.0 maps to `+radius` and -1.0 to `-radius`, flipped for inverted axes.
/// Fractions truncate toward zero; NaN maps to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisScaling {
    pub radius: i32,
    pub sign: AxisSign,
}

impl AxisScaling {
    pub const fn new(radius: i32, sign: AxisSign) -> Self {
        Self { radius, sign }
    }

    pub fn scale(&self, value: f32) -> i32 {
        let scaled = f64::from(value) * f64::from(self.radius) * self.sign.factor();
        // saturating cast
        scaled.trunc() as i32
    }
}

/// Telemetry field an axis reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSource {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    AccelerometerX,
    AccelerometerY,
    AccelerometerZ,
    GyroscopeX,
    GyroscopeY,
    GyroscopeZ,
}

impl AxisSource {
    pub fn read(self, packet: &TelemetryPacket) -> f32 {
        match self {
            AxisSource::LeftStickX => packet.left_stick.x,
            AxisSource::LeftStickY => packet.left_stick.y,
            AxisSource::RightStickX => packet.right_stick.x,
            AxisSource::RightStickY => packet.right_stick.y,
            AxisSource::AccelerometerX => packet.accelerometer.x,
            AxisSource::AccelerometerY => packet.accelerometer.y,
            AxisSource::AccelerometerZ => packet.accelerometer.z,
            AxisSource::GyroscopeX => packet.gyroscope.x,
            AxisSource::GyroscopeY => packet.gyroscope.y,
            AxisSource::GyroscopeZ => packet.gyroscope.z,
        }
    }
}

/// A registered absolute axis: where its value comes from, how it scales,
/// and the range the device advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSpec {
    pub code: AbsoluteAxisCode,
    pub source: AxisSource,
    pub scaling: AxisScaling,
    /// Advertised range is [-limit, limit]
    pub limit: i32,
    /// Units per physical unit, as advertised to consumers
    pub resolution: i32,
}

impl AxisSpec {
    /// Scaled value for `packet`, clamped to the advertised range
    pub fn value(&self, packet: &TelemetryPacket) -> i32 {
        self.scaling
            .scale(self.source.read(packet))
            .clamp(-self.limit, self.limit)
    }

    pub fn abs_setup(&self) -> UinputAbsSetup {
        UinputAbsSetup::new(
            self.code,
            AbsInfo::new(0, -self.limit, self.limit, 0, 0, self.resolution),
        )
    }
}

pub const STICK_RADIUS: i32 = 32_767;

/// Accelerometer units per g
pub const ACCELEROMETER_RESOLUTION: i32 = 8_192;
pub const ACCELEROMETER_LIMIT: i32 = 32_767;

pub const GYROSCOPE_RESOLUTION: i32 = 1_000;
/// The gamepad samples gyroscope axes with 24 bits
pub const GYROSCOPE_LIMIT: i32 = 8_388_607;

const fn stick(code: AbsoluteAxisCode, source: AxisSource, sign: AxisSign) -> AxisSpec {
    AxisSpec {
        code,
        source,
        scaling: AxisScaling::new(STICK_RADIUS, sign),
        limit: STICK_RADIUS,
        resolution: 0,
    }
}

const fn accelerometer(code: AbsoluteAxisCode, source: AxisSource) -> AxisSpec {
    AxisSpec {
        code,
        source,
        scaling: AxisScaling::new(ACCELEROMETER_RESOLUTION, AxisSign::Normal),
        limit: ACCELEROMETER_LIMIT,
        resolution: ACCELEROMETER_RESOLUTION,
    }
}

const fn gyroscope(code: AbsoluteAxisCode, source: AxisSource) -> AxisSpec {
    AxisSpec {
        code,
        source,
        scaling: AxisScaling::new(GYROSCOPE_RESOLUTION, AxisSign::Normal),
        limit: GYROSCOPE_LIMIT,
        resolution: GYROSCOPE_RESOLUTION,
    }
}

/// Stick axes; Y grows downward on evdev, so both Y axes are inverted
pub const GAMEPAD_AXES: &[AxisSpec] = &[
    stick(AbsoluteAxisCode::ABS_X, AxisSource::LeftStickX, AxisSign::Normal),
    stick(AbsoluteAxisCode::ABS_Y, AxisSource::LeftStickY, AxisSign::Inverted),
    stick(AbsoluteAxisCode::ABS_RX, AxisSource::RightStickX, AxisSign::Normal),
    stick(AbsoluteAxisCode::ABS_RY, AxisSource::RightStickY, AxisSign::Inverted),
];

/// Accelerometer on X/Y/Z, gyroscope on RX/RY/RZ
pub const MOTION_AXES: &[AxisSpec] = &[
    accelerometer(AbsoluteAxisCode::ABS_X, AxisSource::AccelerometerX),
    accelerometer(AbsoluteAxisCode::ABS_Y, AxisSource::AccelerometerY),
    accelerometer(AbsoluteAxisCode::ABS_Z, AxisSource::AccelerometerZ),
    gyroscope(AbsoluteAxisCode::ABS_RX, AxisSource::GyroscopeX),
    gyroscope(AbsoluteAxisCode::ABS_RY, AxisSource::GyroscopeY),
    gyroscope(AbsoluteAxisCode::ABS_RZ, AxisSource::GyroscopeZ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_bit_maps_to_one_distinct_code() {
        let mut bits = HashSet::new();
        let mut codes = HashSet::new();
        for mapping in GAMEPAD_BUTTONS {
            assert_eq!(mapping.bit.count_ones(), 1, "{} is not a single bit", mapping.name);
            assert!(bits.insert(mapping.bit), "bit {:#x} mapped twice", mapping.bit);
            assert!(codes.insert(mapping.code.code()), "{} collides", mapping.name);
        }
        let all_bits = GAMEPAD_BUTTONS.iter().fold(0u32, |acc, mapping| acc | mapping.bit);
        assert_eq!(all_bits.count_ones() as usize, GAMEPAD_BUTTONS.len());
    }

    #[test]
    fn bit_zero_is_mapped() {
        assert!(GAMEPAD_BUTTONS.iter().any(|mapping| mapping.bit == 0x01));
    }

    #[test]
    fn unit_inputs_hit_the_radius_on_every_axis() {
        for spec in GAMEPAD_AXES.iter().chain(MOTION_AXES) {
            let radius = spec.scaling.radius;
            let (plus, minus) = match spec.scaling.sign {
                AxisSign::Normal => (radius, -radius),
                AxisSign::Inverted => (-radius, radius),
            };
            assert_eq!(spec.scaling.scale(1.0), plus, "{:?}", spec.code);
            assert_eq!(spec.scaling.scale(-1.0), minus, "{:?}", spec.code);
            assert_eq!(spec.scaling.scale(0.0), 0, "{:?}", spec.code);
            assert!(radius <= spec.limit);
        }
    }

    #[test]
    fn scaling_truncates_toward_zero() {
        let scaling = AxisScaling::new(STICK_RADIUS, AxisSign::Normal);
        assert_eq!(scaling.scale(0.5), 16_383);
        assert_eq!(scaling.scale(-0.5), -16_383);
        assert_eq!(scaling.scale(f32::NAN), 0);
    }

    #[test]
    fn values_clamp_to_the_advertised_range() {
        let packet = TelemetryPacket {
            left_stick: crate::protocol::StickPosition { x: 3.0, y: 0.0 },
            accelerometer: crate::protocol::Vector3 { x: -9.0, y: 2.0, z: 0.0 },
            ..Default::default()
        };
        assert_eq!(GAMEPAD_AXES[0].value(&packet), STICK_RADIUS);
        assert_eq!(MOTION_AXES[0].value(&packet), -ACCELEROMETER_LIMIT);
        assert_eq!(MOTION_AXES[1].value(&packet), 2 * ACCELEROMETER_RESOLUTION);
    }
}
