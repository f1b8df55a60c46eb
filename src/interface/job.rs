//! Job dispatch DTOs

use crate::domain::call::{CallSession, DialInfo};
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::RoomName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dispatch request for one outbound call.
///
/// `metadata` is a JSON object encoded as a string, e.g.
/// `{"phone_number": "+15551230000", "transfer_to": "+15559998888"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub metadata: String,
}

impl JobRequest {
    pub fn new(room: Option<String>, metadata: impl Into<String>) -> Self {
        Self {
            room,
            metadata: metadata.into(),
        }
    }

    /// Parse a job request from its JSON encoding
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CallError::Configuration(format!("invalid job request: {}", e)))
    }

    /// Room to host the call in; generated when the dispatcher left it blank
    pub fn room(&self) -> RoomName {
        match self.room.as_deref().map(str::trim) {
            Some(room) if !room.is_empty() => RoomName::new(room),
            _ => RoomName::generate(),
        }
    }

    /// Decode and validate the dial info carried in the metadata
    pub fn dial_info(&self) -> Result<DialInfo> {
        if self.metadata.trim().is_empty() {
            return Err(CallError::Configuration("job metadata is empty".to_string()));
        }

        let dial_info: DialInfo = serde_json::from_str(&self.metadata)
            .map_err(|e| CallError::Configuration(format!("invalid job metadata: {}", e)))?;
        dial_info.validate()?;
        Ok(dial_info)
    }
}

/// Outcome of a finished call
#[derive(Debug, Serialize, Deserialize)]
pub struct CallSummary {
    pub call_id: Uuid,
    pub room: String,
    pub participant: Option<String>,
    pub terminal_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
}

impl From<&CallSession> for CallSummary {
    fn from(session: &CallSession) -> Self {
        let ended_at = Utc::now();
        CallSummary {
            call_id: session.id().as_uuid(),
            room: session.room().to_string(),
            participant: session.participant().map(ToString::to_string),
            terminal_reason: session.terminal_reason().map(|r| r.as_str().to_string()),
            started_at: *session.started_at(),
            ended_at,
            duration_secs: (ended_at - *session.started_at()).num_seconds(),
        }
    }
}
