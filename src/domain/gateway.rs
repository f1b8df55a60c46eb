//! Telephony gateway port
//!
//! The gateway places, transfers and terminates PSTN call legs. The domain
//! only sees this trait; the wire adapter lives in the infrastructure layer.
//! None of these calls are retried here.

use crate::domain::shared::value_objects::{ParticipantIdentity, RoomName};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Gateway failures, translated from whatever transport the adapter uses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialError {
    /// Signaling-level rejection, e.g. `486 Busy Here`
    #[error("gateway rejected request: {status_code} {reason}")]
    Rejected { status_code: u16, reason: String },

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("gateway transport error: {0}")]
    Transport(String),
}

impl DialError {
    /// SIP-style status code, when the gateway supplied one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DialError::Rejected { status_code, .. } => Some(*status_code),
            DialError::Timeout(_) => Some(408),
            DialError::InvalidDestination(_) => Some(404),
            DialError::Transport(_) => None,
        }
    }
}

/// Outbound dial request for a new call leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    /// Room the new leg joins
    pub room: RoomName,
    /// Trunk that originates the call
    pub trunk_id: String,
    /// Number to call
    pub destination: String,
    /// Identity the answered leg will carry in the room
    pub participant_identity: ParticipantIdentity,
    /// How long to wait for an answer
    pub deadline: Duration,
}

/// Telephony gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DialClient: Send + Sync {
    /// Dial out and wait until the callee answers, the call fails, or the
    /// deadline elapses
    async fn place_call(&self, request: &DialRequest) -> Result<ParticipantIdentity, DialError>;

    /// Hand an existing participant off to a new destination
    async fn transfer_participant(
        &self,
        room: &RoomName,
        participant: &ParticipantIdentity,
        destination: &str,
    ) -> Result<(), DialError>;

    /// End every leg in the room.
    ///
    /// Best effort: failures are logged by the adapter and never surfaced,
    /// the room handle is dead either way.
    async fn terminate_session(&self, room: &RoomName);
}
