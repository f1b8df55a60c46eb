//! Call events published by the orchestrator

use crate::domain::call::value_object::TerminalReason;
use crate::domain::shared::events::EventMetadata;
use crate::domain::shared::value_objects::{CallId, ParticipantIdentity, RoomName};
use serde::Serialize;

/// What happened to the call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEventKind {
    SessionRequested { room: RoomName },
    DialRequested { destination: String },
    SessionReady,
    ParticipantBound { participant: ParticipantIdentity },
    ToolInvoked { tool: String },
    Terminated { reason: TerminalReason },
}

impl CallEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            CallEventKind::SessionRequested { .. } => "call.session_requested",
            CallEventKind::DialRequested { .. } => "call.dial_requested",
            CallEventKind::SessionReady => "call.session_ready",
            CallEventKind::ParticipantBound { .. } => "call.participant_bound",
            CallEventKind::ToolInvoked { .. } => "call.tool_invoked",
            CallEventKind::Terminated { .. } => "call.terminated",
        }
    }
}

/// Timestamped call event
#[derive(Debug, Clone, Serialize)]
pub struct CallEvent {
    pub metadata: EventMetadata,
    pub call_id: CallId,
    pub kind: CallEventKind,
}

impl CallEvent {
    pub fn new(call_id: CallId, kind: CallEventKind) -> Self {
        Self {
            metadata: EventMetadata::new(kind.event_type()),
            call_id,
            kind,
        }
    }
}
