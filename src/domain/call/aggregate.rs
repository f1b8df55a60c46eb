//! Call session aggregate root

use crate::domain::call::event::{CallEvent, CallEventKind};
use crate::domain::call::value_object::{CallPhase, TerminalReason};
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{CallId, ParticipantIdentity, RoomName};
use chrono::{DateTime, Utc};
use std::sync::OnceLock;
use tokio::sync::{broadcast, watch};

/// Capacity of the per-call event broadcast channel
const CALL_EVENT_CAPACITY: usize = 64;

/// One outbound call: the room it lives in, the callee once bound, and the
/// single source of truth for whether the call is still active.
///
/// Every mutation is a compare-and-set on the phase, so the session can be
/// shared behind an `Arc` between the orchestrator and the agent without
/// holding a lock across an await.
#[derive(Debug)]
pub struct CallSession {
    id: CallId,
    room: RoomName,
    participant: OnceLock<ParticipantIdentity>,
    phase: watch::Sender<CallPhase>,
    events: broadcast::Sender<CallEvent>,
    started_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(room: RoomName) -> Self {
        let (phase, _) = watch::channel(CallPhase::Created);
        let (events, _) = broadcast::channel(CALL_EVENT_CAPACITY);
        Self {
            id: CallId::new(),
            room,
            participant: OnceLock::new(),
            phase,
            events,
            started_at: Utc::now(),
        }
    }

    /// Bind the callee's participant and activate the call.
    ///
    /// Fails if a participant is already bound or the call already ended.
    pub fn bind_participant(&self, identity: ParticipantIdentity) -> Result<()> {
        let mut rejection = None;
        let bound = self.phase.send_if_modified(|phase| {
            if !phase.can_transition_to(&CallPhase::Active) {
                rejection = Some(format!("Cannot bind participant in phase {:?}", phase));
                return false;
            }
            if self.participant.set(identity.clone()).is_err() {
                rejection = Some("Participant already bound".to_string());
                return false;
            }
            *phase = CallPhase::Active;
            true
        });

        if !bound {
            return Err(CallError::InvalidStateTransition(
                rejection.unwrap_or_default(),
            ));
        }

        self.record(CallEventKind::ParticipantBound {
            participant: identity,
        });
        Ok(())
    }

    /// Move the call to its terminal phase.
    ///
    /// Returns `true` only for the caller that performed the transition;
    /// every later call is a no-op returning `false`.
    pub fn terminate(&self, reason: TerminalReason) -> bool {
        let terminated = self.phase.send_if_modified(|phase| {
            let next = CallPhase::Terminal(reason);
            if phase.can_transition_to(&next) {
                *phase = next;
                true
            } else {
                false
            }
        });

        if terminated {
            self.record(CallEventKind::Terminated { reason });
        }
        terminated
    }

    pub(crate) fn record(&self, kind: CallEventKind) {
        // No subscribers is fine
        let _ = self.events.send(CallEvent::new(self.id, kind));
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CallPhase> {
        self.phase.subscribe()
    }

    // Getters
    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn room(&self) -> &RoomName {
        &self.room
    }

    pub fn participant(&self) -> Option<&ParticipantIdentity> {
        self.participant.get()
    }

    pub fn phase(&self) -> CallPhase {
        *self.phase.borrow()
    }

    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        self.phase().terminal_reason()
    }

    pub fn started_at(&self) -> &DateTime<Utc> {
        &self.started_at
    }

    pub fn is_active(&self) -> bool {
        !self.phase().is_terminal()
    }
}
