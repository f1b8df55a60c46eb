//! Gateway JSON-RPC Integration Tests
//!
//! Runs the RPC dial client against a local JSON-RPC server standing in for
//! the telephony gateway.

use jsonrpsee::server::{RpcModule, Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use outbound_caller::domain::gateway::{DialClient, DialError, DialRequest};
use outbound_caller::domain::shared::value_objects::{ParticipantIdentity, RoomName};
use outbound_caller::infrastructure::gateway::RpcDialClient;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_place_call_returns_answered_identity() {
    let (addr, _handle, requests) = start_gateway().await;
    let client = client(addr);

    let identity = client
        .place_call(&dial_request("+15551230000"))
        .await
        .expect("Failed to place call");
    assert_eq!(identity.as_str(), "+15551230000");

    let requests = requests.lock().unwrap().clone();
    let (method, params) = &requests[0];
    assert_eq!(method, "sip.create_participant");
    assert_eq!(params["room_name"], "outbound-test");
    assert_eq!(params["sip_trunk_id"], "ST_test");
    assert_eq!(params["sip_call_to"], "+15551230000");
    assert_eq!(params["wait_until_answered"], true);
}

#[tokio::test]
async fn test_busy_callee_is_rejected_with_status() {
    let (addr, _handle, _requests) = start_gateway().await;
    let client = client(addr);

    let error = client
        .place_call(&dial_request("+15550000486"))
        .await
        .expect_err("Busy callee should not answer");
    assert_eq!(
        error,
        DialError::Rejected {
            status_code: 486,
            reason: "Busy Here".to_string()
        }
    );
    assert_eq!(error.status_code(), Some(486));
}

#[tokio::test]
async fn test_transfer_and_terminate() {
    let (addr, _handle, requests) = start_gateway().await;
    let client = client(addr);
    let room = RoomName::new("outbound-test");

    client
        .transfer_participant(
            &room,
            &ParticipantIdentity::new("+15551230000"),
            "tel:+15559998888",
        )
        .await
        .expect("Failed to transfer");
    client.terminate_session(&room).await;

    let requests = requests.lock().unwrap().clone();
    let methods: Vec<&str> = requests.iter().map(|(method, _)| method.as_str()).collect();
    assert_eq!(methods, vec!["sip.transfer_participant", "room.delete"]);
    assert_eq!(requests[0].1["transfer_to"], "tel:+15559998888");
    assert_eq!(requests[0].1["play_dialtone"], true);
    assert_eq!(requests[1].1["room"], "outbound-test");
}

#[tokio::test]
async fn test_transfer_without_dialtone() {
    let (addr, _handle, requests) = start_gateway().await;
    let client = client(addr).with_dialtone(false);

    client
        .transfer_participant(
            &RoomName::new("outbound-test"),
            &ParticipantIdentity::new("+15551230000"),
            "tel:+15559998888",
        )
        .await
        .expect("Failed to transfer");

    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests[0].1["play_dialtone"], false);
}

#[tokio::test]
async fn test_terminate_swallows_unreachable_gateway() {
    let (addr, handle, _requests) = start_gateway().await;
    let client = client(addr);

    handle.stop().expect("Failed to stop server");
    handle.stopped().await;

    // Teardown never fails, even when the gateway is gone
    client.terminate_session(&RoomName::new("outbound-test")).await;
}

// Helper functions

type Requests = Arc<Mutex<Vec<(String, Value)>>>;

async fn start_gateway() -> (SocketAddr, ServerHandle, Requests) {
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let server = Server::builder()
        .build("127.0.0.1:0")
        .await
        .expect("Failed to bind gateway");
    let addr = server.local_addr().expect("Failed to get local address");

    let mut module = RpcModule::new(());

    let log = requests.clone();
    module
        .register_method("sip.create_participant", move |params, _, _| {
            let request: Value = params.one()?;
            log.lock()
                .unwrap()
                .push(("sip.create_participant".to_string(), request.clone()));

            if request["sip_call_to"] == "+15550000486" {
                return Err(ErrorObjectOwned::owned(
                    -32000,
                    "twirp error: unavailable",
                    Some(json!({"sip_status_code": "486", "sip_status": "Busy Here"})),
                ));
            }
            Ok::<_, ErrorObjectOwned>(json!({
                "participant_identity": request["participant_identity"],
                "sip_call_id": "SCL_test",
            }))
        })
        .expect("Failed to register method");

    for method in ["sip.transfer_participant", "room.delete"] {
        let log = requests.clone();
        module
            .register_method(method, move |params, _, _| {
                let request: Value = params.one()?;
                log.lock().unwrap().push((method.to_string(), request));
                Ok::<_, ErrorObjectOwned>(json!({}))
            })
            .expect("Failed to register method");
    }

    let handle = server.start(module);
    (addr, handle, requests)
}

fn client(addr: SocketAddr) -> RpcDialClient {
    RpcDialClient::new(&format!("http://{}", addr), Duration::from_secs(5))
        .expect("Failed to build client")
}

fn dial_request(destination: &str) -> DialRequest {
    DialRequest {
        room: RoomName::new("outbound-test"),
        trunk_id: "ST_test".to_string(),
        destination: destination.to_string(),
        participant_identity: ParticipantIdentity::new(destination),
        deadline: Duration::from_secs(5),
    }
}
