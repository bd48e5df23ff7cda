//! Outbound rumble commands

/// Size of every outbound command datagram
pub const COMMAND_LEN: usize = 4;

pub const OPCODE_PLAY: u8 = 0x01;
pub const OPCODE_STOP: u8 = 0x02;

/// A rumble command for the remote gamepad.
///
/// Built per play/stop request, serialized and sent immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Start rumbling at `magnitude` (native 16-bit range) for `duration_ms`
    Play { magnitude: u16, duration_ms: u16 },
    Stop,
}

impl OutboundCommand {
    pub fn opcode(&self) -> u8 {
        match self {
            OutboundCommand::Play { .. } => OPCODE_PLAY,
            OutboundCommand::Stop => OPCODE_STOP,
        }
    }
}

/// Compresses a native 16-bit magnitude to the single wire byte.
///
/// Linear `magnitude * 255 / 65536`, rounded to nearest so full scale stays full scale.
pub fn scale_magnitude(magnitude: u16) -> u8 {
    let scaled = (u32::from(magnitude) * 255 + 32_768) >> 16;
    // at most 255 for any u16 input
    scaled as u8
}

/// Serializes a command into its 4-byte wire form.
///
/// ```text
/// byte 0    opcode (1 = play, 2 = stop)
/// byte 1    magnitude, 0 for stop
/// bytes 2-3 duration in ms, little-endian, 0 for stop
/// ```
pub fn encode_command(command: OutboundCommand) -> [u8; COMMAND_LEN] {
    match command {
        OutboundCommand::Play {
            magnitude,
            duration_ms,
        } => {
            let [lo, hi] = duration_ms.to_le_bytes();
            [OPCODE_PLAY, scale_magnitude(magnitude), lo, hi]
        }
        OutboundCommand::Stop => [OPCODE_STOP, 0x00, 0x00, 0x00],
    }
}
