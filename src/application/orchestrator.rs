//! Call orchestrator
//!
//! Starts the conversation session and the outbound dial for one call,
//! binds the callee once they answer, and owns the single teardown path
//! every termination converges on.

use crate::application::agent::CallAgent;
use crate::application::tools::ToolRegistry;
use crate::domain::call::{CallEvent, CallEventKind, CallPhase, CallSession, DialInfo, TerminalReason};
use crate::domain::conversation::{ConversationEngine, EngineError, SessionOptions, ToolDispatcher};
use crate::domain::gateway::{DialClient, DialError, DialRequest};
use crate::domain::scheduling::AvailabilityProvider;
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{ParticipantIdentity, RoomName};
use crate::infrastructure::call_metrics;
use std::sync::Arc;
use std::task::Poll;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Orchestrator settings, fixed for the lifetime of the worker
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Gateway trunk that originates outbound calls
    pub outbound_trunk_id: String,
    /// How long to wait for the callee to answer
    pub dial_timeout: Duration,
    /// How long an answered callee may wait for the agent session
    pub session_timeout: Duration,
    /// Session options; instructions are filled in per call
    pub session: SessionOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            outbound_trunk_id: String::new(),
            dial_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(10),
            session: SessionOptions::default(),
        }
    }
}

/// Teardown path for one call.
///
/// Cloned into the agent so tools can end the call; the orchestrator stays
/// the only code that touches the gateway session handle.
#[derive(Clone)]
pub struct CallControl {
    inner: Arc<ControlInner>,
}

struct ControlInner {
    session: Arc<CallSession>,
    dial: Arc<dyn DialClient>,
    engine: Arc<dyn ConversationEngine>,
    released: watch::Sender<bool>,
}

impl CallControl {
    pub(crate) fn new(
        session: Arc<CallSession>,
        dial: Arc<dyn DialClient>,
        engine: Arc<dyn ConversationEngine>,
    ) -> Self {
        let (released, _) = watch::channel(false);
        Self {
            inner: Arc::new(ControlInner {
                session,
                dial,
                engine,
                released,
            }),
        }
    }

    pub fn session(&self) -> &Arc<CallSession> {
        &self.inner.session
    }

    /// End the call at the gateway and stop the conversation session.
    ///
    /// Only the first call has any effect; it returns `true`. Holds no lock,
    /// so a tool may call it as its last step while its own dispatch is
    /// still in flight.
    pub async fn teardown(&self, reason: TerminalReason) -> bool {
        let session = &self.inner.session;
        if !session.terminate(reason) {
            debug!(
                "Teardown of room {} already performed ({:?}), ignoring {}",
                session.room(),
                session.terminal_reason(),
                reason
            );
            return false;
        }

        info!("Tearing down call in room {}: {}", session.room(), reason);
        self.inner.dial.terminate_session(session.room()).await;
        self.inner.engine.close().await;
        call_metrics::record_call_terminated(reason);

        self.inner.released.send_replace(true);
        true
    }

    /// Wait until teardown has fully released the call
    pub async fn wait_released(&self) -> Option<TerminalReason> {
        let mut released = self.inner.released.subscribe();
        // The sender lives as long as `self`
        let _ = released.wait_for(|done| *done).await;
        self.inner.session.terminal_reason()
    }
}

/// Live call returned by [`CallOrchestrator::start_call`]
pub struct CallHandle {
    session: Arc<CallSession>,
    control: CallControl,
    agent: Arc<CallAgent>,
    connect: Option<JoinHandle<Result<ParticipantIdentity>>>,
    connected: Option<Result<ParticipantIdentity>>,
}

impl CallHandle {
    pub fn session(&self) -> &Arc<CallSession> {
        &self.session
    }

    pub fn agent(&self) -> &Arc<CallAgent> {
        &self.agent
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CallEvent> {
        self.session.subscribe_events()
    }

    /// Teardown path usable while `connected` is being awaited
    pub fn control(&self) -> CallControl {
        self.control.clone()
    }

    /// Wait for the dial to resolve: the bound callee, or why the call
    /// never connected
    pub async fn connected(&mut self) -> Result<ParticipantIdentity> {
        if let Some(task) = self.connect.take() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Connect task for room {} failed: {}", self.session.room(), e);
                    self.control.teardown(TerminalReason::DialFailed).await;
                    Err(CallError::Dial(DialError::Transport(e.to_string())))
                }
            };
            self.connected = Some(outcome);
        }

        self.connected
            .clone()
            .unwrap_or(Err(CallError::NotConnected))
    }

    /// End the call from outside the conversation
    pub async fn hangup(&self, reason: TerminalReason) -> bool {
        self.control.teardown(reason).await
    }

    /// Wait until the call has been torn down
    pub async fn finished(&self) -> Option<TerminalReason> {
        self.control.wait_released().await
    }
}

/// Drives a single outbound call from dial to teardown
pub struct CallOrchestrator {
    config: OrchestratorConfig,
    dial: Arc<dyn DialClient>,
    engine: Arc<dyn ConversationEngine>,
    availability: Arc<dyn AvailabilityProvider>,
}

impl CallOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        dial: Arc<dyn DialClient>,
        engine: Arc<dyn ConversationEngine>,
        availability: Arc<dyn AvailabilityProvider>,
    ) -> Result<Self> {
        if config.outbound_trunk_id.trim().is_empty() {
            return Err(CallError::Configuration(
                "outbound trunk id is not configured".to_string(),
            ));
        }

        Ok(Self {
            config,
            dial,
            engine,
            availability,
        })
    }

    /// Start the conversation session and dial the callee concurrently.
    ///
    /// Returns as soon as both are in flight; use [`CallHandle::connected`]
    /// to wait for the callee. Invalid dial info fails before anything is
    /// issued.
    pub async fn start_call(&self, room: RoomName, dial_info: DialInfo) -> Result<CallHandle> {
        dial_info.validate()?;

        let session = Arc::new(CallSession::new(room));
        let control = CallControl::new(session.clone(), self.dial.clone(), self.engine.clone());
        let agent = Arc::new(CallAgent::new(
            dial_info,
            control.clone(),
            self.engine.clone(),
            self.dial.clone(),
            self.availability.clone(),
        ));
        let tools: Arc<dyn ToolDispatcher> = Arc::new(ToolRegistry::for_agent(agent.clone()));
        let options = SessionOptions {
            instructions: agent.instructions(),
            ..self.config.session.clone()
        };

        info!(
            "Starting outbound call {} to {} in room {}",
            session.id(),
            agent.dial_info().callee_number(),
            session.room()
        );
        call_metrics::record_call_started();

        // The session goes out first so nothing the callee says on pickup
        // is lost
        session.record(CallEventKind::SessionRequested {
            room: session.room().clone(),
        });
        let session_start = issue_session_start(
            self.engine.clone(),
            session.room().clone(),
            tools,
            options,
        )
        .await;

        let callee = agent.dial_info().callee_number().to_string();
        let request = DialRequest {
            room: session.room().clone(),
            trunk_id: self.config.outbound_trunk_id.clone(),
            destination: callee.clone(),
            participant_identity: ParticipantIdentity::new(callee.clone()),
            deadline: self.config.dial_timeout,
        };
        session.record(CallEventKind::DialRequested {
            destination: callee,
        });
        let connect = tokio::spawn(connect(
            control.clone(),
            self.dial.clone(),
            request,
            session_start,
            self.config.session_timeout,
        ));

        Ok(CallHandle {
            session,
            control,
            agent,
            connect: Some(connect),
            connected: None,
        })
    }
}

/// Issue the session start and hand it to its own task.
///
/// The start future is polled once here, which drives the engine request up
/// to its first suspension point before the caller moves on to dialing.
async fn issue_session_start(
    engine: Arc<dyn ConversationEngine>,
    room: RoomName,
    tools: Arc<dyn ToolDispatcher>,
    options: SessionOptions,
) -> JoinHandle<std::result::Result<(), EngineError>> {
    let mut start =
        Box::pin(async move { engine.start_session(&room, tools, &options).await });

    match futures::poll!(start.as_mut()) {
        Poll::Ready(result) => tokio::spawn(async move { result }),
        Poll::Pending => tokio::spawn(start),
    }
}

/// Dial the callee, join with the session start, and bind the participant.
///
/// Every failure path tears the call down before returning, so a session
/// that came up without a callee never outlives this task.
async fn connect(
    control: CallControl,
    dial: Arc<dyn DialClient>,
    request: DialRequest,
    mut session_start: JoinHandle<std::result::Result<(), EngineError>>,
    session_timeout: Duration,
) -> Result<ParticipantIdentity> {
    let session = control.session().clone();
    let deadline = request.deadline;
    let started = Instant::now();
    let mut phase = session.subscribe_phase();
    let mut session_ready: Option<std::result::Result<(), EngineError>> = None;

    let placing = tokio::time::timeout(deadline, dial.place_call(&request));
    tokio::pin!(placing);

    let answered = loop {
        tokio::select! {
            placed = &mut placing => {
                break placed.unwrap_or(Err(DialError::Timeout(deadline)));
            }
            joined = &mut session_start, if session_ready.is_none() => {
                let ready = flatten_join(joined);
                if let Err(e) = &ready {
                    error!("Agent session for room {} failed to start: {}", session.room(), e);
                    control.teardown(TerminalReason::DialFailed).await;
                    return Err(CallError::Engine(e.to_string()));
                }
                session_ready = Some(ready);
            }
            _ = ended(&mut phase) => {
                warn!("Call in room {} ended while dialing", session.room());
                session_start.abort();
                return Err(CallError::CallEnded(
                    session.terminal_reason().map(|r| r.to_string()).unwrap_or_default(),
                ));
            }
        }
    };
    call_metrics::record_dial_duration(answered.is_ok(), started.elapsed());

    let identity = match answered {
        Ok(identity) => identity,
        Err(e) => {
            match e.status_code() {
                Some(code) => error!(
                    "Error creating SIP participant for {}: {}, SIP status: {}",
                    request.destination, e, code
                ),
                None => error!(
                    "Error creating SIP participant for {}: {}",
                    request.destination, e
                ),
            }
            session_start.abort();
            control.teardown(TerminalReason::DialFailed).await;
            return Err(CallError::Dial(e));
        }
    };

    info!("Callee {} answered, waiting for the agent session", identity);
    let ready = match session_ready {
        Some(ready) => ready,
        None => tokio::select! {
            joined = tokio::time::timeout(session_timeout, &mut session_start) => match joined {
                Ok(joined) => flatten_join(joined),
                Err(_) => {
                    session_start.abort();
                    Err(EngineError::Start(format!(
                        "session not ready {:?} after answer",
                        session_timeout
                    )))
                }
            },
            _ = ended(&mut phase) => {
                warn!("Call in room {} ended before the agent session was ready", session.room());
                session_start.abort();
                return Err(CallError::CallEnded(
                    session.terminal_reason().map(|r| r.to_string()).unwrap_or_default(),
                ));
            }
        },
    };
    if let Err(e) = ready {
        error!("Agent session for room {} failed to start: {}", session.room(), e);
        control.teardown(TerminalReason::DialFailed).await;
        return Err(CallError::Engine(e.to_string()));
    }
    session.record(CallEventKind::SessionReady);

    session.bind_participant(identity.clone()).map_err(|e| {
        warn!("Could not bind {} in room {}: {}", identity, session.room(), e);
        CallError::CallEnded(e.to_string())
    })?;
    info!("Participant joined: {}", identity);

    Ok(identity)
}

/// Resolve once the call has reached its terminal phase
async fn ended(phase: &mut watch::Receiver<CallPhase>) {
    // The sender lives in the session, which outlives the receiver
    let _ = phase.wait_for(CallPhase::is_terminal).await;
}

fn flatten_join(
    joined: std::result::Result<std::result::Result<(), EngineError>, tokio::task::JoinError>,
) -> std::result::Result<(), EngineError> {
    joined.unwrap_or_else(|e| Err(EngineError::Start(e.to_string())))
}
