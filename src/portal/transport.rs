//! Seam between the negotiator and the bus

use super::error::PortalError;
use super::paths::{RequestPath, SessionPath};
use async_trait::async_trait;
use std::fmt;
use std::os::fd::OwnedFd;

/// Capture options sent with SelectSources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOptions {
    pub multiple: bool,
    pub cursor_mode: u32,
    pub types: u32,
}

/// A portal call answered through a Request object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalCall {
    CreateSession {
        handle_token: String,
        session_handle_token: String,
    },
    SelectSources {
        session: SessionPath,
        handle_token: String,
        options: SourceOptions,
    },
    Start {
        session: SessionPath,
        parent_window: String,
        handle_token: String,
    },
}

impl PortalCall {
    pub fn handle_token(&self) -> &str {
        match self {
            PortalCall::CreateSession { handle_token, .. }
            | PortalCall::SelectSources { handle_token, .. }
            | PortalCall::Start { handle_token, .. } => handle_token,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            PortalCall::CreateSession { .. } => "CreateSession",
            PortalCall::SelectSources { .. } => "SelectSources",
            PortalCall::Start { .. } => "Start",
        }
    }
}

/// Outcome code of a Response signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    Cancelled,
    Other(u32),
}

impl From<u32> for ResponseCode {
    fn from(code: u32) -> Self {
        match code {
            0 => ResponseCode::Success,
            1 => ResponseCode::Cancelled,
            other => ResponseCode::Other(other),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::Success => write!(f, "success"),
            ResponseCode::Cancelled => write!(f, "cancelled by the user"),
            ResponseCode::Other(code) => write!(f, "failed with code {}", code),
        }
    }
}

/// Decoded Response signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub code: ResponseCode,
    /// Set by CreateSession on portals that report the session explicitly
    pub session_handle: Option<String>,
}

impl PortalResponse {
    pub fn success() -> Self {
        Self {
            code: ResponseCode::Success,
            session_handle: None,
        }
    }
}

#[async_trait]
pub trait PortalTransport: Send {
    /// Issues `call` and returns its direct reply, the Request object path.
    ///
    /// The Response listener for that request is armed before the call goes
    /// out, so a fast reply cannot be missed.
    async fn request(&mut self, call: PortalCall) -> Result<RequestPath, PortalError>;

    /// Waits for the Response signal of an earlier [`request`](Self::request)
    async fn response(&mut self, request: &RequestPath) -> Result<PortalResponse, PortalError>;

    /// Asks for the PipeWire remote of a started session
    async fn open_pipewire_remote(&mut self, session: &SessionPath) -> Result<OwnedFd, PortalError>;
}
