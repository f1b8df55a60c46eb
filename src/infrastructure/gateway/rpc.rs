//! JSON-RPC telephony gateway client
//!
//! Speaks to a SIP gateway sidecar over JSON-RPC/HTTP. Dial and transfer
//! failures arrive as JSON-RPC errors whose `data` carries the SIP status
//! code and reason phrase.

use crate::domain::gateway::{DialClient, DialError, DialRequest};
use crate::domain::shared::value_objects::{ParticipantIdentity, RoomName};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extra time on top of the dial deadline before the HTTP request gives up
const DIAL_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Status reported when the gateway rejects without SIP details
const GATEWAY_ERROR_STATUS: u16 = 500;

#[derive(Debug, Serialize)]
struct CreateSipParticipant<'a> {
    room_name: &'a str,
    sip_trunk_id: &'a str,
    sip_call_to: &'a str,
    participant_identity: &'a str,
    wait_until_answered: bool,
    ringing_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct SipParticipantInfo {
    participant_identity: String,
}

#[derive(Debug, Serialize)]
struct TransferSipParticipant<'a> {
    room_name: &'a str,
    participant_identity: &'a str,
    transfer_to: &'a str,
    play_dialtone: bool,
}

#[derive(Debug, Serialize)]
struct DeleteRoom<'a> {
    room: &'a str,
}

/// SIP details attached to a gateway error
#[derive(Debug, Default, Deserialize)]
struct SipStatus {
    #[serde(default)]
    sip_status_code: Value,
    #[serde(default)]
    sip_status: Option<String>,
}

impl SipStatus {
    fn code(&self) -> Option<u16> {
        match &self.sip_status_code {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// [`DialClient`] backed by a JSON-RPC gateway
pub struct RpcDialClient {
    client: HttpClient,
    play_dialtone: bool,
}

impl RpcDialClient {
    /// Build a client for the gateway at `url`.
    ///
    /// `dial_timeout` is the longest dial deadline the client will be asked
    /// to honour; the HTTP timeout leaves room beyond it.
    pub fn new(url: &str, dial_timeout: Duration) -> Result<Self, DialError> {
        let client = HttpClientBuilder::default()
            .request_timeout(dial_timeout + DIAL_TIMEOUT_MARGIN)
            .build(url)
            .map_err(|e| DialError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            play_dialtone: true,
        })
    }

    /// Whether the callee hears a dial tone while being transferred
    pub fn with_dialtone(mut self, play_dialtone: bool) -> Self {
        self.play_dialtone = play_dialtone;
        self
    }
}

#[async_trait]
impl DialClient for RpcDialClient {
    async fn place_call(&self, request: &DialRequest) -> Result<ParticipantIdentity, DialError> {
        info!(
            "Dialing {} into room {} via trunk {}",
            request.destination, request.room, request.trunk_id
        );

        let params = CreateSipParticipant {
            room_name: request.room.as_str(),
            sip_trunk_id: &request.trunk_id,
            sip_call_to: &request.destination,
            participant_identity: request.participant_identity.as_str(),
            wait_until_answered: true,
            ringing_timeout_secs: request.deadline.as_secs(),
        };

        let info: SipParticipantInfo = self
            .client
            .request("sip.create_participant", rpc_params![params])
            .await
            .map_err(|e| dial_error(e, request.deadline))?;

        Ok(ParticipantIdentity::new(info.participant_identity))
    }

    async fn transfer_participant(
        &self,
        room: &RoomName,
        participant: &ParticipantIdentity,
        destination: &str,
    ) -> Result<(), DialError> {
        let params = TransferSipParticipant {
            room_name: room.as_str(),
            participant_identity: participant.as_str(),
            transfer_to: destination,
            play_dialtone: self.play_dialtone,
        };

        let _: Value = self
            .client
            .request("sip.transfer_participant", rpc_params![params])
            .await
            .map_err(|e| dial_error(e, Duration::ZERO))?;

        debug!("Gateway accepted transfer of {} to {}", participant, destination);
        Ok(())
    }

    async fn terminate_session(&self, room: &RoomName) {
        let params = DeleteRoom {
            room: room.as_str(),
        };

        match self
            .client
            .request::<Value, _>("room.delete", rpc_params![params])
            .await
        {
            Ok(_) => debug!("Deleted room {}", room),
            Err(e) => warn!("Failed to delete room {}: {}", room, e),
        }
    }
}

/// Translate a transport error into the gateway error taxonomy
fn dial_error(error: ClientError, deadline: Duration) -> DialError {
    match error {
        ClientError::Call(call) => {
            let status = call
                .data()
                .and_then(|raw| serde_json::from_str::<SipStatus>(raw.get()).ok())
                .unwrap_or_default();
            let reason = status
                .sip_status
                .clone()
                .unwrap_or_else(|| call.message().to_string());

            match status.code() {
                Some(404) | Some(484) => DialError::InvalidDestination(reason),
                Some(408) => DialError::Timeout(deadline),
                Some(status_code) => DialError::Rejected {
                    status_code,
                    reason,
                },
                None => DialError::Rejected {
                    status_code: GATEWAY_ERROR_STATUS,
                    reason,
                },
            }
        }
        ClientError::RequestTimeout => DialError::Timeout(deadline),
        other => DialError::Transport(other.to_string()),
    }
}
