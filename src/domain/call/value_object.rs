//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a call reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The callee asked to end the call
    UserEnded,
    /// The callee was handed off to the transfer target
    Transferred,
    /// The call reached an answering machine
    VoicemailDetected,
    /// The dial attempt, the session start, or a gateway action failed
    DialFailed,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::UserEnded => "user_ended",
            TerminalReason::Transferred => "transferred",
            TerminalReason::VoicemailDetected => "voicemail_detected",
            TerminalReason::DialFailed => "dial_failed",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a call as seen by the agent
///
/// Transitions only move forward: `Created -> Active -> Terminal`, or
/// straight from `Created` to `Terminal` when the dial never connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallPhase {
    /// Session and dial issued, callee not yet bound
    Created,
    /// Callee participant bound, tools may act on the call
    Active,
    /// Call torn down
    Terminal(TerminalReason),
}

impl CallPhase {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, next: &CallPhase) -> bool {
        use CallPhase::*;

        matches!(
            (self, next),
            (Created, Active) | (Created, Terminal(_)) | (Active, Terminal(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallPhase::Terminal(_))
    }

    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        match self {
            CallPhase::Terminal(reason) => Some(*reason),
            _ => None,
        }
    }
}
