//! Outbound Caller - An outbound voice agent worker built with Rust
//!
//! Places one outbound phone call per dispatched job, runs a conversation
//! session with the callee, and exposes call-control tools (transfer, hang
//! up, voicemail, appointment scheduling) to the conversation engine.
//! Follows the same Domain-Driven Design layering as the rest of our stack.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::CallError;
pub use domain::shared::result::Result;
