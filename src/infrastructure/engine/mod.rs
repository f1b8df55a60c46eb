//! Conversation engine adapters

pub mod rpc;

pub use rpc::RpcConversationEngine;
