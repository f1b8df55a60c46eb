//! Conversation engine port
//!
//! Speech recognition, turn detection, the language model and speech
//! synthesis all sit behind [`ConversationEngine`]. The core starts a
//! session, asks the engine to speak, waits for playout, and receives tool
//! invocations through the [`ToolDispatcher`] it registered at start.

use crate::domain::shared::error::CallError;
use crate::domain::shared::value_objects::RoomName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("session start failed: {0}")]
    Start(String),

    #[error("speech generation failed: {0}")]
    Speech(String),

    #[error("engine transport error: {0}")]
    Transport(String),

    #[error("session is closed")]
    Closed,
}

/// Options passed to the engine when the session starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// System instructions for the agent
    pub instructions: String,
    /// Let the callee barge in over agent speech
    pub allow_interruptions: bool,
    /// Upper bound on end-of-turn detection delay
    pub max_endpointing_delay_ms: u64,
    /// Telephony background-noise and voice cancellation
    pub noise_cancellation: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            allow_interruptions: true,
            max_endpointing_delay_ms: 300,
            noise_cancellation: true,
        }
    }
}

/// Tool advertised to the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

/// Tool invocation decided by the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result handed back to the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutput {
    Ok { message: String },
    Data { data: Value },
    Declined { reason: String },
    NotConnected,
    CallEnded,
    Failed { message: String },
}

impl ToolOutput {
    pub fn ok(message: impl Into<String>) -> Self {
        ToolOutput::Ok {
            message: message.into(),
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        ToolOutput::Declined {
            reason: reason.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ToolOutput::Failed {
            message: message.into(),
        }
    }
}

impl From<CallError> for ToolOutput {
    fn from(error: CallError) -> Self {
        match error {
            CallError::NotConnected => ToolOutput::NotConnected,
            CallError::CallEnded(_) => ToolOutput::CallEnded,
            CallError::ToolPrecondition(reason) => ToolOutput::Declined { reason },
            other => ToolOutput::failed(other.to_string()),
        }
    }
}

/// Routes tool invocations from the engine into the call
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Tools to advertise to the language model
    fn specs(&self) -> Vec<ToolSpec>;

    /// Run one tool call to completion
    async fn dispatch(&self, call: ToolCall) -> ToolOutput;
}

/// Handle on one agent utterance
#[derive(Debug, Clone)]
pub struct SpeechHandle {
    id: String,
    done: watch::Receiver<bool>,
}

/// Completion side of a [`SpeechHandle`], held by the engine
#[derive(Debug)]
pub struct PlayoutNotifier {
    done: watch::Sender<bool>,
}

impl SpeechHandle {
    /// Create a handle that completes when the returned notifier fires or
    /// is dropped
    pub fn pending(id: impl Into<String>) -> (Self, PlayoutNotifier) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                id: id.into(),
                done: rx,
            },
            PlayoutNotifier { done: tx },
        )
    }

    /// Create a handle for an utterance that already finished
    pub fn finished(id: impl Into<String>) -> Self {
        let (_, rx) = watch::channel(true);
        Self {
            id: id.into(),
            done: rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_done(&self) -> bool {
        *self.done.borrow() || self.done.has_changed().is_err()
    }

    /// Wait until the utterance has fully played out
    pub async fn wait_for_playout(&self) {
        let mut done = self.done.clone();
        // A dropped notifier means the engine gave up on the utterance
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl PlayoutNotifier {
    pub fn finish(self) {
        let _ = self.done.send(true);
    }
}

/// Real-time voice-agent session
#[async_trait]
pub trait ConversationEngine: Send + Sync {
    /// Attach the agent to the room and start listening.
    ///
    /// Resolves once the session is ready. Caller audio is captured from the
    /// moment the request is issued.
    async fn start_session(
        &self,
        room: &RoomName,
        tools: Arc<dyn ToolDispatcher>,
        options: &SessionOptions,
    ) -> Result<(), EngineError>;

    /// Ask the agent to say something; the handle tracks its playout
    async fn generate_reply(&self, instructions: &str) -> Result<SpeechHandle, EngineError>;

    /// Utterance currently being played, if any
    async fn current_speech(&self) -> Option<SpeechHandle>;

    /// Stop the session. Safe to call more than once.
    async fn close(&self);
}
