//! Domain layer - Core call model and the ports it depends on
//!
//! This layer contains:
//! - The call session aggregate and its phase machine
//! - Value objects and the shared error taxonomy
//! - Ports for the telephony gateway, the conversation engine and scheduling

pub mod call;
pub mod conversation;
pub mod gateway;
pub mod scheduling;
pub mod shared;

// Re-export commonly used types
pub use shared::{CallError, Result};
