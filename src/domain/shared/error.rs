//! Call errors

use crate::domain::gateway::DialError;
use thiserror::Error;

/// Error taxonomy for a single outbound call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The gateway rejected or failed the outbound dial attempt
    #[error("Dial failed: {0}")]
    Dial(DialError),

    /// The gateway rejected a transfer of the bound participant
    #[error("Transfer failed: {0}")]
    Transfer(DialError),

    /// Required call parameters are missing; the call never starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A tool was invoked without its preconditions; the call continues
    #[error("Tool precondition failed: {0}")]
    ToolPrecondition(String),

    /// A tool needed the callee's participant before it was bound
    #[error("Call is not yet connected")]
    NotConnected,

    /// The call already reached a terminal state
    #[error("Call has ended: {0}")]
    CallEnded(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The conversation engine failed
    #[error("Conversation engine error: {0}")]
    Engine(String),
}
