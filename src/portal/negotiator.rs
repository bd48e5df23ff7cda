//! Screen-cast handshake as a typestate machine
//!
//! Each step consumes the negotiator in one stage and returns it in the next,
//! so steps cannot be skipped or reordered. Progress is mirrored into a watch
//! channel for observers; a failed step publishes `SessionState::Failed` and
//! ends the handshake.

use super::error::{NegotiationError, PortalError, Step};
use super::paths::{RequestPath, SessionPath};
use super::transport::{PortalCall, PortalResponse, PortalTransport, ResponseCode, SourceOptions};
use super::{CaptureHandle, SessionState};
use crate::config::PortalConfig;
use statum::{machine, state};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Options for one handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationSettings {
    pub token_prefix: String,
    pub parent_window: String,
    pub sources: SourceOptions,
    pub step_timeout: Option<Duration>,
}

impl From<&PortalConfig> for NegotiationSettings {
    fn from(config: &PortalConfig) -> Self {
        Self {
            token_prefix: config.handle_token_prefix.clone(),
            parent_window: config.parent_window.clone(),
            sources: SourceOptions {
                multiple: config.multiple,
                cursor_mode: config.cursor_mode,
                types: config.source_types,
            },
            step_timeout: config.step_timeout(),
        }
    }
}

impl NegotiationSettings {
    fn token(&self, suffix: &str) -> String {
        format!("{}_{}", self.token_prefix, suffix)
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum HandshakeStage {
    Fresh,    // nothing sent yet
    Created,  // session object exists
    Selected, // capture sources chosen
    Started,  // user approved, stream running
}

#[machine]
pub struct SessionNegotiator<S: HandshakeStage> {
    transport: Box<dyn PortalTransport>,
    settings: NegotiationSettings,
    state_sender: watch::Sender<SessionState>,
    session: Option<SessionPath>,
}

impl<S: HandshakeStage> SessionNegotiator<S> {
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_sender.subscribe()
    }

    fn publish(&self, state: SessionState) {
        debug!("Portal session state: {:?}", state);
        self.state_sender.send_replace(state);
    }

    fn fail(&self, err: NegotiationError) -> NegotiationError {
        error!("Screen-cast negotiation failed: {}", err);
        self.publish(SessionState::Failed);
        err
    }

    fn current_session(&self, step: Step) -> Result<SessionPath, NegotiationError> {
        self.session
            .clone()
            .ok_or_else(|| self.fail(NegotiationError::NoSession(step)))
    }

    /// Sends `call` and waits for its Response, checking the result code
    async fn exchange(
        &mut self,
        step: Step,
        call: PortalCall,
    ) -> Result<(RequestPath, PortalResponse), NegotiationError> {
        let timeout = self.settings.step_timeout;
        debug!("Calling {} with token {}", call.method(), call.handle_token());

        let request = bounded(step, timeout, self.transport.request(call)).await;
        let request = request.map_err(|e| self.fail(e))?;
        debug!("{} pending at {}", step, request);

        let response = bounded(step, timeout, self.transport.response(&request)).await;
        let response = response.map_err(|e| self.fail(e))?;

        if response.code != ResponseCode::Success {
            return Err(self.fail(NegotiationError::Rejected {
                step,
                code: response.code,
            }));
        }
        Ok((request, response))
    }
}

impl SessionNegotiator<Fresh> {
    pub fn create(transport: Box<dyn PortalTransport>, settings: NegotiationSettings) -> Self {
        let (state_sender, _) = watch::channel(SessionState::Idle);
        Self::new(transport, settings, state_sender, None)
    }

    pub async fn create_session(
        mut self,
    ) -> Result<SessionNegotiator<Created>, NegotiationError> {
        let session_token = self.settings.token("session");
        let call = PortalCall::CreateSession {
            handle_token: self.settings.token("create"),
            session_handle_token: session_token.clone(),
        };

        let (request, response) = self.exchange(Step::CreateSession, call).await?;

        let derived = request
            .session_path(&session_token)
            .map_err(|source| {
                self.fail(NegotiationError::Transport {
                    step: Step::CreateSession,
                    source,
                })
            })?;

        // Portals that report the handle explicitly are authoritative
        let session = match response.session_handle.as_deref().map(SessionPath::parse) {
            Some(Ok(reported)) => {
                if reported != derived {
                    warn!("Portal reported session {} instead of {}", reported, derived);
                }
                reported
            }
            Some(Err(e)) => {
                warn!("Ignoring unusable session handle: {}", e);
                derived
            }
            None => derived,
        };

        info!("Screen-cast session created at {}", session);
        self.session = Some(session);
        self.publish(SessionState::SessionCreated);
        Ok(self.transition())
    }
}

impl SessionNegotiator<Created> {
    pub async fn select_sources(
        mut self,
    ) -> Result<SessionNegotiator<Selected>, NegotiationError> {
        let session = self.current_session(Step::SelectSources)?;
        let call = PortalCall::SelectSources {
            session,
            handle_token: self.settings.token("select"),
            options: self.settings.sources,
        };

        self.exchange(Step::SelectSources, call).await?;

        info!("Capture sources selected");
        self.publish(SessionState::SourcesSelected);
        Ok(self.transition())
    }
}

impl SessionNegotiator<Selected> {
    pub async fn start(mut self) -> Result<SessionNegotiator<Started>, NegotiationError> {
        let session = self.current_session(Step::Start)?;
        let call = PortalCall::Start {
            session,
            parent_window: self.settings.parent_window.clone(),
            handle_token: self.settings.token("start"),
        };

        self.exchange(Step::Start, call).await?;

        info!("Screen-cast session started");
        self.publish(SessionState::Started);
        Ok(self.transition())
    }
}

impl SessionNegotiator<Started> {
    /// Final step: hands back the PipeWire descriptor with the session it belongs to
    pub async fn open_remote(mut self) -> Result<CaptureHandle, NegotiationError> {
        let step = Step::OpenPipeWireRemote;
        let session = self.current_session(step)?;

        let fd = bounded(
            step,
            self.settings.step_timeout,
            self.transport.open_pipewire_remote(&session),
        )
        .await;
        let fd = fd.map_err(|e| self.fail(e))?;

        info!("PipeWire remote opened for {}", session);
        self.publish(SessionState::RemoteOpened);
        Ok(CaptureHandle::new(session, fd))
    }
}

/// Runs all four steps in order
pub async fn negotiate(
    negotiator: SessionNegotiator<Fresh>,
) -> Result<CaptureHandle, NegotiationError> {
    negotiator
        .create_session()
        .await?
        .select_sources()
        .await?
        .start()
        .await?
        .open_remote()
        .await
}

async fn bounded<T>(
    step: Step,
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T, PortalError>>,
) -> Result<T, NegotiationError> {
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| NegotiationError::Timeout {
                step,
                timeout: limit,
            })?,
        None => call.await,
    };
    result.map_err(|source| NegotiationError::Transport { step, source })
}

/// Handshake running on its own task
pub struct NegotiationHandle {
    state_receiver: watch::Receiver<SessionState>,
    result_receiver: oneshot::Receiver<Result<CaptureHandle, NegotiationError>>,
    task: JoinHandle<()>,
}

impl NegotiationHandle {
    pub fn spawn(transport: Box<dyn PortalTransport>, settings: NegotiationSettings) -> Self {
        let negotiator = SessionNegotiator::create(transport, settings);
        let state_receiver = negotiator.subscribe();
        let (result_sender, result_receiver) = oneshot::channel();

        let task = tokio::spawn(async move {
            let result = negotiate(negotiator).await;
            if result_sender.send(result).is_err() {
                warn!("Negotiation finished after its handle was dropped");
            }
        });

        Self {
            state_receiver,
            result_receiver,
            task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_receiver.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state_receiver.borrow()
    }

    /// Waits for the handshake to finish. Cancel safe.
    pub async fn wait(&mut self) -> Result<CaptureHandle, NegotiationError> {
        (&mut self.result_receiver)
            .await
            .unwrap_or(Err(NegotiationError::Abandoned))
    }

    /// Stops a handshake that is still waiting on the portal
    pub fn abort(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::os::fd::OwnedFd;
    use std::sync::{Arc, Mutex};

    const SENDER: &str = "1_42";

    /// Replays queued responses; once they run out every wait stalls forever
    struct ScriptedPortal {
        calls: Arc<Mutex<Vec<PortalCall>>>,
        responses: VecDeque<PortalResponse>,
    }

    impl ScriptedPortal {
        fn new(responses: Vec<PortalResponse>) -> (Self, Arc<Mutex<Vec<PortalCall>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let portal = Self {
                calls: calls.clone(),
                responses: responses.into(),
            };
            (portal, calls)
        }

        fn approving() -> (Self, Arc<Mutex<Vec<PortalCall>>>) {
            Self::new(vec![PortalResponse::success(); 3])
        }
    }

    #[async_trait]
    impl PortalTransport for ScriptedPortal {
        async fn request(&mut self, call: PortalCall) -> Result<RequestPath, PortalError> {
            let path = RequestPath::new(SENDER, call.handle_token())?;
            self.calls.lock().unwrap().push(call);
            Ok(path)
        }

        async fn response(&mut self, _: &RequestPath) -> Result<PortalResponse, PortalError> {
            match self.responses.pop_front() {
                Some(response) => Ok(response),
                None => std::future::pending().await,
            }
        }

        async fn open_pipewire_remote(&mut self, _: &SessionPath) -> Result<OwnedFd, PortalError> {
            Ok(std::fs::File::open("/dev/null").unwrap().into())
        }
    }

    fn settings() -> NegotiationSettings {
        NegotiationSettings::from(&PortalConfig::default())
    }

    #[tokio::test]
    async fn steps_publish_states_in_order() {
        let (portal, calls) = ScriptedPortal::approving();
        let negotiator = SessionNegotiator::create(Box::new(portal), settings());
        let states = negotiator.subscribe();
        assert_eq!(*states.borrow(), SessionState::Idle);

        let negotiator = negotiator.create_session().await.unwrap();
        assert_eq!(*states.borrow(), SessionState::SessionCreated);
        let negotiator = negotiator.select_sources().await.unwrap();
        assert_eq!(*states.borrow(), SessionState::SourcesSelected);
        let negotiator = negotiator.start().await.unwrap();
        assert_eq!(*states.borrow(), SessionState::Started);
        let capture = negotiator.open_remote().await.unwrap();
        assert_eq!(*states.borrow(), SessionState::RemoteOpened);

        assert_eq!(
            capture.session().to_string(),
            "/org/freedesktop/portal/desktop/session/1_42/gamepad_bridge_session"
        );

        let calls = calls.lock().unwrap();
        let methods: Vec<_> = calls.iter().map(PortalCall::method).collect();
        assert_eq!(methods, ["CreateSession", "SelectSources", "Start"]);
        match &calls[1] {
            PortalCall::SelectSources { session, options, .. } => {
                assert_eq!(session, capture.session());
                assert_eq!(options.types, 2);
                assert_eq!(options.cursor_mode, 1);
                assert!(!options.multiple);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn reported_session_handle_wins() {
        let reported = "/org/freedesktop/portal/desktop/session/1_42/other";
        let mut responses = vec![PortalResponse::success(); 3];
        responses[0].session_handle = Some(reported.to_string());
        let (portal, _) = ScriptedPortal::new(responses);

        let capture = negotiate(SessionNegotiator::create(Box::new(portal), settings()))
            .await
            .unwrap();
        assert_eq!(capture.session().to_string(), reported);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_reply_stalls_in_current_state() {
        let (portal, calls) = ScriptedPortal::new(vec![PortalResponse::success()]);
        let negotiator = SessionNegotiator::create(Box::new(portal), settings());
        let states = negotiator.subscribe();

        let outcome =
            tokio::time::timeout(Duration::from_secs(3600), negotiate(negotiator)).await;
        assert!(outcome.is_err());
        assert_eq!(*states.borrow(), SessionState::SessionCreated);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn step_timeout_fails_the_handshake() {
        let (portal, _) = ScriptedPortal::new(vec![PortalResponse::success()]);
        let mut settings = settings();
        settings.step_timeout = Some(Duration::from_secs(5));
        let negotiator = SessionNegotiator::create(Box::new(portal), settings);
        let states = negotiator.subscribe();

        let err = negotiate(negotiator).await.unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Timeout {
                step: Step::SelectSources,
                ..
            }
        ));
        assert_eq!(*states.borrow(), SessionState::Failed);
    }

    #[tokio::test]
    async fn cancelled_response_is_rejected() {
        let cancelled = PortalResponse {
            code: ResponseCode::from(1),
            session_handle: None,
        };
        let (portal, calls) = ScriptedPortal::new(vec![PortalResponse::success(), cancelled]);
        let negotiator = SessionNegotiator::create(Box::new(portal), settings());
        let states = negotiator.subscribe();

        let err = negotiate(negotiator).await.unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Rejected {
                step: Step::SelectSources,
                code: ResponseCode::Cancelled,
            }
        ));
        assert_eq!(err.step(), Some(Step::SelectSources));
        assert_eq!(*states.borrow(), SessionState::Failed);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn handle_delivers_the_capture() {
        let (portal, _) = ScriptedPortal::approving();
        let mut handle = NegotiationHandle::spawn(Box::new(portal), settings());
        let states = handle.subscribe();

        let capture = handle.wait().await.unwrap();
        assert_eq!(*states.borrow(), SessionState::RemoteOpened);
        assert_eq!(
            capture.session().to_string().rsplit('/').next(),
            Some("gamepad_bridge_session")
        );
    }

    #[test]
    fn tokens_use_the_configured_prefix() {
        let mut config = PortalConfig::default();
        config.handle_token_prefix = "pad".to_string();
        config.step_timeout_secs = Some(2);
        let settings = NegotiationSettings::from(&config);
        assert_eq!(settings.token("create"), "pad_create");
        assert_eq!(settings.step_timeout, Some(Duration::from_secs(2)));
    }
}
