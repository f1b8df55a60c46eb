//! Telephony gateway adapters

pub mod rpc;

pub use rpc::RpcDialClient;
