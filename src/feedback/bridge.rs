//! Single-effect force feedback state machine

use crate::protocol::OutboundCommand;
use tracing::{debug, info};

/// The uploaded effect, reduced to what the wire protocol can express
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectState {
    pub duration_ms: u16,
    /// Native 16-bit strength
    pub magnitude: u16,
}

/// A request taken from the gamepad's event queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackRequest {
    Upload(EffectState),
    Erase,
    /// Play `effect_id`; an intensity of 0 stops it
    Play { effect_id: u16, intensity: i32 },
    SetGain(i32),
}

/// What the device side must do after a request was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackAction {
    /// Complete the upload/erase transaction with success
    Acknowledge,
    Send(OutboundCommand),
    Ignore,
}

/// Tracks at most one effect; upload replaces it, erase clears it
#[derive(Debug, Default)]
pub struct ForceFeedbackBridge {
    effect: Option<EffectState>,
}

impl ForceFeedbackBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effect(&self) -> Option<EffectState> {
        self.effect
    }

    pub fn handle(&mut self, request: FeedbackRequest) -> FeedbackAction {
        match request {
            FeedbackRequest::Upload(effect) => {
                debug!(
                    "Storing effect: {} ms at magnitude {}",
                    effect.duration_ms, effect.magnitude
                );
                self.effect = Some(effect);
                FeedbackAction::Acknowledge
            }
            FeedbackRequest::Erase => {
                debug!("Clearing stored effect");
                self.effect = None;
                FeedbackAction::Acknowledge
            }
            FeedbackRequest::Play {
                effect_id,
                intensity,
            } => {
                let command = self.play_command(intensity);
                debug!("Effect {} intensity {} -> {:?}", effect_id, intensity, command);
                FeedbackAction::Send(command)
            }
            FeedbackRequest::SetGain(gain) => {
                // the wire protocol has no gain channel
                info!("Ignoring gain request ({})", gain);
                FeedbackAction::Ignore
            }
        }
    }

    fn play_command(&self, intensity: i32) -> OutboundCommand {
        match self.effect {
            Some(effect) if intensity != 0 && effect.duration_ms > 0 => OutboundCommand::Play {
                magnitude: effect.magnitude,
                duration_ms: effect.duration_ms,
            },
            _ => OutboundCommand::Stop,
        }
    }
}
