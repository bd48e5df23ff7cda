//! Inbound telemetry layout
//!
//! Every datagram from the gamepad carries one complete snapshot of its state.
//! Offsets are fixed; the decoder checks the length once and then reads each
//! field in place.

use super::error::DecodeError;

/// Total size of an inbound telemetry datagram
pub const TELEMETRY_PACKET_LEN: usize = 58;

const ACCELEROMETER_OFFSET: usize = 0;
const GYROSCOPE_OFFSET: usize = 12;
const TIMESTAMP_OFFSET: usize = 30;
const BUTTONS_OFFSET: usize = 38;
const STICKS_OFFSET: usize = 42;

/// Three-axis sensor reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Normalized analog stick position, both axes in [-1.0, 1.0]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StickPosition {
    pub x: f32,
    pub y: f32,
}

/// One decoded controller snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryPacket {
    /// Acceleration in g
    pub accelerometer: Vector3,
    /// Angular velocity, one unit per full turn per second
    pub gyroscope: Vector3,
    /// Monotonic sender timestamp
    pub timestamp: u64,
    /// Held buttons, one bit per physical button
    pub buttons: u32,
    pub left_stick: StickPosition,
    pub right_stick: StickPosition,
}

impl TelemetryPacket {
    /// Returns true if any of the bits in `mask` are set in the button field
    pub fn is_held(&self, mask: u32) -> bool {
        self.buttons & mask != 0
    }

    /// Serializes the packet into the inbound wire layout.
    ///
    /// Only the gamepad produces these in production; the bridge needs it to
    /// build datagrams in tests.
    #[cfg(test)]
    pub fn encode(&self) -> [u8; TELEMETRY_PACKET_LEN] {
        let mut bytes = [0u8; TELEMETRY_PACKET_LEN];
        write_vector(&mut bytes, ACCELEROMETER_OFFSET, self.accelerometer);
        write_vector(&mut bytes, GYROSCOPE_OFFSET, self.gyroscope);
        bytes[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[BUTTONS_OFFSET..BUTTONS_OFFSET + 4].copy_from_slice(&self.buttons.to_le_bytes());
        let sticks = [
            self.left_stick.x,
            self.left_stick.y,
            self.right_stick.x,
            self.right_stick.y,
        ];
        for (index, value) in sticks.iter().enumerate() {
            let offset = STICKS_OFFSET + index * 4;
            bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

/// Decodes one inbound datagram.
///
/// Bytes past [`TELEMETRY_PACKET_LEN`] are ignored.
///
/// # Errors
///
/// [`DecodeError::Truncated`] if `buffer` is shorter than the fixed layout.
/// Nothing is read from the buffer in that case.
pub fn decode_telemetry(buffer: &[u8]) -> Result<TelemetryPacket, DecodeError> {
    let bytes = buffer
        .first_chunk::<TELEMETRY_PACKET_LEN>()
        .ok_or(DecodeError::Truncated {
            expected: TELEMETRY_PACKET_LEN,
            actual: buffer.len(),
        })?;

    Ok(TelemetryPacket {
        accelerometer: read_vector(bytes, ACCELEROMETER_OFFSET),
        gyroscope: read_vector(bytes, GYROSCOPE_OFFSET),
        timestamp: u64::from_le_bytes(field(bytes, TIMESTAMP_OFFSET)),
        buttons: u32::from_le_bytes(field(bytes, BUTTONS_OFFSET)),
        left_stick: StickPosition {
            x: read_f32(bytes, STICKS_OFFSET),
            y: read_f32(bytes, STICKS_OFFSET + 4),
        },
        right_stick: StickPosition {
            x: read_f32(bytes, STICKS_OFFSET + 8),
            y: read_f32(bytes, STICKS_OFFSET + 12),
        },
    })
}

fn field<const N: usize>(bytes: &[u8; TELEMETRY_PACKET_LEN], offset: usize) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(&bytes[offset..offset + N]);
    raw
}

fn read_f32(bytes: &[u8; TELEMETRY_PACKET_LEN], offset: usize) -> f32 {
    f32::from_le_bytes(field(bytes, offset))
}

fn read_vector(bytes: &[u8; TELEMETRY_PACKET_LEN], offset: usize) -> Vector3 {
    Vector3 {
        x: read_f32(bytes, offset),
        y: read_f32(bytes, offset + 4),
        z: read_f32(bytes, offset + 8),
    }
}

#[cfg(test)]
fn write_vector(bytes: &mut [u8; TELEMETRY_PACKET_LEN], offset: usize, vector: Vector3) {
    for (index, value) in [vector.x, vector.y, vector.z].iter().enumerate() {
        let start = offset + index * 4;
        bytes[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> TelemetryPacket {
        TelemetryPacket {
            accelerometer: Vector3 { x: 0.25, y: -1.0, z: 0.5 },
            gyroscope: Vector3 { x: -0.125, y: 0.0, z: 0.75 },
            timestamp: 0x0102_0304_0506_0708,
            buttons: 0x0004_8001,
            left_stick: StickPosition { x: 1.0, y: -0.5 },
            right_stick: StickPosition { x: -1.0, y: 0.125 },
        }
    }

    #[test]
    fn reads_fields_at_fixed_offsets() {
        let mut bytes = [0u8; TELEMETRY_PACKET_LEN];
        bytes[0..4].copy_from_slice(&1.5f32.to_le_bytes());
        bytes[20..24].copy_from_slice(&(-2.0f32).to_le_bytes());
        bytes[30..38].copy_from_slice(&42u64.to_le_bytes());
        bytes[38..42].copy_from_slice(&0x8000u32.to_le_bytes());
        bytes[54..58].copy_from_slice(&0.5f32.to_le_bytes());

        let packet = decode_telemetry(&bytes).unwrap();
        assert_eq!(packet.accelerometer.x, 1.5);
        assert_eq!(packet.gyroscope.z, -2.0);
        assert_eq!(packet.timestamp, 42);
        assert_eq!(packet.buttons, 0x8000);
        assert_eq!(packet.right_stick.y, 0.5);
        assert_eq!(packet.left_stick, StickPosition::default());
    }

    #[test]
    fn reserved_bytes_are_ignored() {
        let mut bytes = sample().encode();
        bytes[24..30].copy_from_slice(&[0xFF; 6]);
        assert_eq!(decode_telemetry(&bytes).unwrap(), sample());
    }

    #[test]
    fn undersized_buffers_are_truncated() {
        let bytes = sample().encode();
        for len in [0, 1, 30, TELEMETRY_PACKET_LEN - 1] {
            assert_eq!(
                decode_telemetry(&bytes[..len]),
                Err(DecodeError::Truncated {
                    expected: TELEMETRY_PACKET_LEN,
                    actual: len,
                })
            );
        }
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut long = sample().encode().to_vec();
        long.extend_from_slice(&[0xAB; 16]);
        assert_eq!(decode_telemetry(&long).unwrap(), sample());
    }

    #[test]
    fn held_buttons() {
        let packet = sample();
        assert!(packet.is_held(0x0001));
        assert!(packet.is_held(0x0004_0000));
        assert!(!packet.is_held(0x4000));
    }

    proptest! {
        #[test]
        fn encode_then_decode_recovers_fields(
            accel in prop::array::uniform3(-8.0f32..8.0),
            gyro in prop::array::uniform3(-4.0f32..4.0),
            sticks in prop::array::uniform4(-1.0f32..=1.0),
            timestamp in any::<u64>(),
            buttons in any::<u32>(),
        ) {
            let packet = TelemetryPacket {
                accelerometer: Vector3 { x: accel[0], y: accel[1], z: accel[2] },
                gyroscope: Vector3 { x: gyro[0], y: gyro[1], z: gyro[2] },
                timestamp,
                buttons,
                left_stick: StickPosition { x: sticks[0], y: sticks[1] },
                right_stick: StickPosition { x: sticks[2], y: sticks[3] },
            };
            let decoded = decode_telemetry(&packet.encode()).unwrap();
            prop_assert_eq!(decoded, packet);
        }
    }
}
