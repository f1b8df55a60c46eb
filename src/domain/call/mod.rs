//! Call bounded context - the lifecycle of a single outbound call

pub mod aggregate;
pub mod entity;
pub mod event;
pub mod value_object;

pub use aggregate::CallSession;
pub use entity::DialInfo;
pub use event::{CallEvent, CallEventKind};
pub use value_object::{CallPhase, TerminalReason};
