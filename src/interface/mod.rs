//! Interface layer - how calls reach the worker
//!
//! A dispatched job carries the room name and a JSON metadata string; this
//! layer turns it into the dial info the orchestrator starts a call with,
//! and reports the outcome back in the same JSON shape.

pub mod job;

pub use job::{CallSummary, JobRequest};
