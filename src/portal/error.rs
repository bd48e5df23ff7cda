//! Error types for the portal negotiation

use super::transport::ResponseCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The four portal calls, in handshake order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateSession,
    SelectSources,
    Start,
    OpenPipeWireRemote,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::CreateSession => write!(f, "CreateSession"),
            Step::SelectSources => write!(f, "SelectSources"),
            Step::Start => write!(f, "Start"),
            Step::OpenPipeWireRemote => write!(f, "OpenPipeWireRemote"),
        }
    }
}

/// Transport-level failures
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),

    #[error("Malformed object path '{path}': {reason}")]
    MalformedPath { path: String, reason: &'static str },

    #[error("Response stream for {0} closed before a reply arrived")]
    ResponseClosed(String),

    #[error("No response listener armed for {0}")]
    NotArmed(String),

    #[error("Session bus connection has no unique name")]
    NoUniqueName,
}

/// Failures that end the handshake
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("{step} failed: {source}")]
    Transport {
        step: Step,
        #[source]
        source: PortalError,
    },

    #[error("{step} was rejected by the portal: {code}")]
    Rejected { step: Step, code: ResponseCode },

    #[error("{step} got no reply within {timeout:?}")]
    Timeout { step: Step, timeout: Duration },

    #[error("{0} requested before a session exists")]
    NoSession(Step),

    #[error("Negotiation task ended without a result")]
    Abandoned,
}

impl NegotiationError {
    pub fn step(&self) -> Option<Step> {
        match self {
            NegotiationError::Transport { step, .. }
            | NegotiationError::Rejected { step, .. }
            | NegotiationError::Timeout { step, .. }
            | NegotiationError::NoSession(step) => Some(*step),
            NegotiationError::Abandoned => None,
        }
    }
}
