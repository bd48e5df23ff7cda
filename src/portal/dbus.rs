//! ScreenCast portal over the session bus

use super::error::PortalError;
use super::paths::{sender_token, RequestPath, SessionPath};
use super::transport::{PortalCall, PortalResponse, PortalTransport, ResponseCode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::os::fd::OwnedFd;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use zbus::proxy::SignalStream;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};
use zbus::{Connection, Proxy};

const PORTAL_DESTINATION: &str = "org.freedesktop.portal.Desktop";
const PORTAL_OBJECT_PATH: &str = "/org/freedesktop/portal/desktop";
const SCREENCAST_INTERFACE: &str = "org.freedesktop.portal.ScreenCast";
const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";
const RESPONSE_SIGNAL: &str = "Response";

pub struct DbusPortal {
    connection: Connection,
    screencast: Proxy<'static>,
    sender: String,
    listeners: HashMap<RequestPath, SignalStream<'static>>,
}

impl DbusPortal {
    pub async fn connect() -> Result<Self, PortalError> {
        let connection = Connection::session().await?;
        let sender = connection
            .unique_name()
            .map(|name| sender_token(name.as_str()))
            .ok_or(PortalError::NoUniqueName)?;
        let screencast = Proxy::new(
            &connection,
            PORTAL_DESTINATION,
            PORTAL_OBJECT_PATH,
            SCREENCAST_INTERFACE,
        )
        .await?;

        info!("Connected to the screen-cast portal as {}", sender);
        Ok(Self {
            connection,
            screencast,
            sender,
            listeners: HashMap::new(),
        })
    }

    /// The session lives as long as this connection, so callers keep a clone
    pub fn connection(&self) -> Connection {
        self.connection.clone()
    }

    async fn listen(&self, request: &RequestPath) -> Result<SignalStream<'static>, PortalError> {
        let proxy = Proxy::new(
            &self.connection,
            PORTAL_DESTINATION,
            request.to_string(),
            REQUEST_INTERFACE,
        )
        .await?;
        debug!("Listening for {} on {}", RESPONSE_SIGNAL, request);
        Ok(proxy.receive_signal(RESPONSE_SIGNAL).await?)
    }
}

fn object_path(session: &SessionPath) -> Result<ObjectPath<'static>, PortalError> {
    ObjectPath::try_from(session.to_string())
        .map_err(|e| PortalError::Bus(zbus::Error::from(e)))
}

/// `session_handle` is a string on most portals, an object path on some
fn session_handle(results: &HashMap<String, OwnedValue>) -> Option<String> {
    let value = results.get("session_handle")?;
    String::try_from(value.try_clone().ok()?).ok().or_else(|| {
        OwnedObjectPath::try_from(value.try_clone().ok()?)
            .ok()
            .map(|path| path.to_string())
    })
}

#[async_trait]
impl PortalTransport for DbusPortal {
    async fn request(&mut self, call: PortalCall) -> Result<RequestPath, PortalError> {
        let expected = RequestPath::new(&self.sender, call.handle_token())?;
        let listener = self.listen(&expected).await?;

        let mut options: HashMap<&str, Value<'_>> = HashMap::new();
        options.insert("handle_token", Value::from(call.handle_token()));

        let reply: OwnedObjectPath = match &call {
            PortalCall::CreateSession {
                session_handle_token,
                ..
            } => {
                options.insert(
                    "session_handle_token",
                    Value::from(session_handle_token.as_str()),
                );
                self.screencast.call(call.method(), &(options,)).await?
            }
            PortalCall::SelectSources {
                session,
                options: sources,
                ..
            } => {
                options.insert("multiple", Value::from(sources.multiple));
                options.insert("cursor_mode", Value::from(sources.cursor_mode));
                options.insert("types", Value::from(sources.types));
                let session = object_path(session)?;
                self.screencast
                    .call(call.method(), &(session, options))
                    .await?
            }
            PortalCall::Start {
                session,
                parent_window,
                ..
            } => {
                let session = object_path(session)?;
                self.screencast
                    .call(call.method(), &(session, parent_window.as_str(), options))
                    .await?
            }
        };

        let actual = RequestPath::parse(reply.as_str())?;
        if actual == expected {
            self.listeners.insert(actual.clone(), listener);
        } else {
            // Old portals pick their own request path
            warn!("Portal answered on {} instead of {}", actual, expected);
            let listener = self.listen(&actual).await?;
            self.listeners.insert(actual.clone(), listener);
        }
        Ok(actual)
    }

    async fn response(&mut self, request: &RequestPath) -> Result<PortalResponse, PortalError> {
        let mut listener = self
            .listeners
            .remove(request)
            .ok_or_else(|| PortalError::NotArmed(request.to_string()))?;

        let message = listener
            .next()
            .await
            .ok_or_else(|| PortalError::ResponseClosed(request.to_string()))?;
        let body = message.body();
        let (code, results): (u32, HashMap<String, OwnedValue>) = body.deserialize()?;

        let response = PortalResponse {
            code: ResponseCode::from(code),
            session_handle: session_handle(&results),
        };
        debug!("{} answered {:?}", request, response);
        Ok(response)
    }

    async fn open_pipewire_remote(&mut self, session: &SessionPath) -> Result<OwnedFd, PortalError> {
        let options: HashMap<&str, Value<'_>> = HashMap::new();
        let fd: zbus::zvariant::OwnedFd = self
            .screencast
            .call("OpenPipeWireRemote", &(object_path(session)?, options))
            .await?;
        Ok(fd.into())
    }
}
