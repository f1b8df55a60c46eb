//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to run one outbound call:
//! - The orchestrator coordinates session start, dialing and teardown
//! - The agent implements the call-control tools
//! - The registry routes tool invocations from the engine to the agent

pub mod agent;
pub mod orchestrator;
pub mod tools;

pub use agent::CallAgent;
pub use orchestrator::{CallControl, CallHandle, CallOrchestrator, OrchestratorConfig};
pub use tools::ToolRegistry;
