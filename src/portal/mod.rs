//! Screen-cast portal negotiation
//!
//! Obtains a PipeWire remote for a screen or window capture through
//! `org.freedesktop.portal.ScreenCast`:
//!
//! ```text
//! CreateSession -> SelectSources -> Start -> OpenPipeWireRemote
//! ```
//!
//! The first three calls return a Request object and answer later through its
//! `Response` signal; the last returns the descriptor directly. The resulting
//! [`CaptureHandle`] is the input of the display pipeline.

pub mod dbus;
pub mod error;
pub mod negotiator;
pub mod paths;
pub mod transport;

pub use dbus::DbusPortal;
pub use error::{NegotiationError, PortalError, Step};
pub use negotiator::{negotiate, NegotiationHandle, NegotiationSettings, SessionNegotiator};
pub use paths::{RequestPath, SessionPath};
pub use transport::{PortalCall, PortalResponse, PortalTransport, ResponseCode, SourceOptions};

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Observable progress of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SessionCreated,
    SourcesSelected,
    Started,
    RemoteOpened,
    Failed,
}

/// An open PipeWire remote and the session it belongs to
///
/// The session stays alive for as long as the bus connection that created it,
/// and the descriptor closes when this is dropped.
#[derive(Debug)]
pub struct CaptureHandle {
    session: SessionPath,
    fd: OwnedFd,
}

impl CaptureHandle {
    pub fn new(session: SessionPath, fd: OwnedFd) -> Self {
        Self { session, fd }
    }

    pub fn session(&self) -> &SessionPath {
        &self.session
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
