//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The JSON-RPC telephony gateway client
//! - The JSON-RPC conversation engine client
//! - The static scheduling backend
//! - Metrics recording

pub mod call_metrics;
pub mod engine;
pub mod gateway;
pub mod scheduling;
