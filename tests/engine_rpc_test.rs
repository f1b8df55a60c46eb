//! Conversation Engine JSON-RPC Integration Tests
//!
//! Runs the RPC engine client against a local JSON-RPC WebSocket server that
//! pushes one tool call and records everything the client sends back.

use async_trait::async_trait;
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::server::{PendingSubscriptionSink, RpcModule, Server, ServerHandle, SubscriptionMessage};
use jsonrpsee::types::ErrorObjectOwned;
use outbound_caller::domain::conversation::{
    ConversationEngine, SessionOptions, ToolCall, ToolDispatcher, ToolOutput, ToolSpec,
};
use outbound_caller::domain::shared::value_objects::RoomName;
use outbound_caller::infrastructure::engine::RpcConversationEngine;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_tool_call_round_trip() {
    let (addr, _handle, mut received) = start_engine().await;
    let engine = connect(addr).await;
    let dispatcher = Arc::new(RecordingDispatcher::default());

    engine
        .start_session(
            &RoomName::new("outbound-test"),
            dispatcher.clone(),
            &SessionOptions::default(),
        )
        .await
        .expect("Failed to start session");

    let (method, start) = next(&mut received).await;
    assert_eq!(method, "session.start");
    assert_eq!(start["room"], "outbound-test");
    assert_eq!(start["tools"][0]["name"], "confirm_appointment");
    assert_eq!(start["options"]["allow_interruptions"], true);

    let (method, result) = next(&mut received).await;
    assert_eq!(method, "session.submit_tool_result");
    assert_eq!(result["call_id"], "call-1");
    assert_eq!(
        result["output"],
        json!({"status": "ok", "message": "reservation confirmed"})
    );
    assert_eq!(
        dispatcher.calls(),
        vec![("confirm_appointment".to_string(), json!({"date": "Tuesday", "time": "2pm"}))]
    );
}

#[tokio::test]
async fn test_close_is_sent_once() {
    let (addr, _handle, mut received) = start_engine().await;
    let engine = connect(addr).await;

    engine
        .start_session(
            &RoomName::new("outbound-test"),
            Arc::new(RecordingDispatcher::default()),
            &SessionOptions::default(),
        )
        .await
        .expect("Failed to start session");
    assert_eq!(next(&mut received).await.0, "session.start");
    assert_eq!(next(&mut received).await.0, "session.submit_tool_result");

    engine.close().await;
    engine.close().await;

    let (method, params) = next(&mut received).await;
    assert_eq!(method, "session.close");
    assert_eq!(params["room"], "outbound-test");
    assert!(
        tokio::time::timeout(Duration::from_millis(200), received.recv())
            .await
            .is_err(),
        "close was sent more than once"
    );
    assert!(engine.generate_reply("hello").await.is_err());
}

// Helper functions

type Received = mpsc::UnboundedReceiver<(String, Value)>;

#[derive(Default)]
struct RecordingDispatcher {
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingDispatcher {
    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolDispatcher for RecordingDispatcher {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: "confirm_appointment".to_string(),
            description: "Confirm the appointment".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }]
    }

    async fn dispatch(&self, call: ToolCall) -> ToolOutput {
        self.calls.lock().unwrap().push((call.name, call.arguments));
        ToolOutput::ok("reservation confirmed")
    }
}

async fn next(received: &mut Received) -> (String, Value) {
    tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .expect("Timed out waiting for the client")
        .expect("Server went away")
}

async fn connect(addr: SocketAddr) -> RpcConversationEngine {
    RpcConversationEngine::connect(&format!("ws://{}", addr), Duration::from_secs(5))
        .await
        .expect("Failed to connect to engine")
}

async fn start_engine() -> (SocketAddr, ServerHandle, Received) {
    let (tx, rx) = mpsc::unbounded_channel();
    let server = Server::builder()
        .build("127.0.0.1:0")
        .await
        .expect("Failed to bind engine");
    let addr = server.local_addr().expect("Failed to get local address");

    let mut module = RpcModule::new(());

    for method in ["session.start", "session.submit_tool_result", "session.close"] {
        let tx = tx.clone();
        module
            .register_method(method, move |params, _, _| {
                let request: Value = params.one()?;
                let _ = tx.send((method.to_string(), request));
                Ok::<_, ErrorObjectOwned>(json!({}))
            })
            .expect("Failed to register method");
    }

    module
        .register_subscription(
            "session.subscribe_tool_calls",
            "session.tool_call",
            "session.unsubscribe_tool_calls",
            |_, pending, _, _| push_tool_call(pending),
        )
        .expect("Failed to register subscription");

    let handle = server.start(module);
    (addr, handle, rx)
}

/// Push a single tool call, then hold the subscription open
async fn push_tool_call(pending: PendingSubscriptionSink) -> SubscriptionResult {
    let sink = pending.accept().await?;
    let call = json!({
        "call_id": "call-1",
        "name": "confirm_appointment",
        "arguments": {"date": "Tuesday", "time": "2pm"}
    });
    sink.send(SubscriptionMessage::from_json(&call)?).await?;
    sink.closed().await;
    Ok(())
}
