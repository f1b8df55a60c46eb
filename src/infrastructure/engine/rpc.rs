//! JSON-RPC conversation engine client
//!
//! The voice-agent runtime (speech recognition, turn detection, language
//! model, speech synthesis) runs as a separate service reached over a
//! JSON-RPC WebSocket. Tool invocations arrive on a subscription and are
//! dispatched one at a time; their results are posted back.

use crate::domain::conversation::{
    ConversationEngine, EngineError, SessionOptions, SpeechHandle, ToolCall, ToolDispatcher,
    ToolOutput, ToolSpec,
};
use crate::domain::shared::value_objects::RoomName;
use async_trait::async_trait;
use futures::StreamExt;
use jsonrpsee::core::client::{ClientT, Subscription, SubscriptionClientT};
use jsonrpsee::core::ClientError;
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct StartSession<'a> {
    room: &'a str,
    options: &'a SessionOptions,
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Serialize)]
struct GenerateReply<'a> {
    room: &'a str,
    instructions: &'a str,
}

#[derive(Debug, Serialize)]
struct SpeechRef<'a> {
    room: &'a str,
    speech_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolResult<'a> {
    room: &'a str,
    call_id: &'a str,
    output: &'a ToolOutput,
}

#[derive(Debug, Serialize)]
struct RoomRef<'a> {
    room: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct SpeechInfo {
    speech_id: String,
    #[serde(default)]
    done: bool,
}

/// [`ConversationEngine`] backed by a JSON-RPC voice-agent service
pub struct RpcConversationEngine {
    client: Arc<WsClient>,
    room: Mutex<Option<RoomName>>,
    closed: Arc<AtomicBool>,
}

impl RpcConversationEngine {
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self, EngineError> {
        let client = WsClientBuilder::default()
            .request_timeout(request_timeout)
            .build(url)
            .await
            .map_err(transport_error)?;
        info!("Connected to conversation engine at {}", url);

        Ok(Self {
            client: Arc::new(client),
            room: Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn room(&self) -> Result<RoomName, EngineError> {
        self.room
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(EngineError::Closed)
    }

    /// Turn a speech reference into a handle that completes on playout
    fn track_speech(&self, room: RoomName, info: SpeechInfo) -> SpeechHandle {
        if info.done {
            return SpeechHandle::finished(info.speech_id);
        }

        let (handle, notifier) = SpeechHandle::pending(info.speech_id.clone());
        let client = self.client.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            let params = SpeechRef {
                room: room.as_str(),
                speech_id: &info.speech_id,
            };
            // Long-polls until the utterance has played out; a poll that
            // outlives the request timeout says nothing about playout
            loop {
                match client
                    .request::<Value, _>("session.wait_for_playout", rpc_params![&params])
                    .await
                {
                    Ok(_) => break,
                    Err(e) if should_repoll(&e, closed.load(Ordering::SeqCst)) => {
                        debug!("Still waiting for speech {} to play out", info.speech_id);
                    }
                    Err(e) => {
                        warn!("Lost track of speech {}: {}", info.speech_id, e);
                        break;
                    }
                }
            }
            notifier.finish();
        });
        handle
    }
}

/// Whether a failed playout poll should be issued again
fn should_repoll(error: &ClientError, session_closed: bool) -> bool {
    !session_closed && matches!(error, ClientError::RequestTimeout)
}

#[async_trait]
impl ConversationEngine for RpcConversationEngine {
    async fn start_session(
        &self,
        room: &RoomName,
        tools: Arc<dyn ToolDispatcher>,
        options: &SessionOptions,
    ) -> Result<(), EngineError> {
        *self
            .room
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(room.clone());

        let params = StartSession {
            room: room.as_str(),
            options,
            tools: tools.specs(),
        };
        self.client
            .request::<Value, _>("session.start", rpc_params![params])
            .await
            .map_err(|e| EngineError::Start(e.to_string()))?;

        let calls: Subscription<ToolCall> = self
            .client
            .subscribe(
                "session.subscribe_tool_calls",
                rpc_params![RoomRef {
                    room: room.as_str()
                }],
                "session.unsubscribe_tool_calls",
            )
            .await
            .map_err(|e| EngineError::Start(e.to_string()))?;

        tokio::spawn(dispatch_tool_calls(
            self.client.clone(),
            room.clone(),
            calls,
            tools,
            self.closed.clone(),
        ));

        info!("Agent session started in room {}", room);
        Ok(())
    }

    async fn generate_reply(&self, instructions: &str) -> Result<SpeechHandle, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        let room = self.room()?;

        let params = GenerateReply {
            room: room.as_str(),
            instructions,
        };
        let info: SpeechInfo = self
            .client
            .request("session.generate_reply", rpc_params![params])
            .await
            .map_err(|e| EngineError::Speech(e.to_string()))?;

        Ok(self.track_speech(room, info))
    }

    async fn current_speech(&self) -> Option<SpeechHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let room = self.room().ok()?;

        let params = RoomRef {
            room: room.as_str(),
        };
        match self
            .client
            .request::<Option<SpeechInfo>, _>("session.current_speech", rpc_params![params])
            .await
        {
            Ok(info) => info.map(|info| self.track_speech(room, info)),
            Err(e) => {
                warn!("Could not query current speech in room {}: {}", room, e);
                None
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(room) = self.room() else {
            return;
        };

        let params = RoomRef {
            room: room.as_str(),
        };
        match self
            .client
            .request::<Value, _>("session.close", rpc_params![params])
            .await
        {
            Ok(_) => info!("Agent session in room {} closed", room),
            Err(e) => warn!("Failed to close agent session in room {}: {}", room, e),
        }
    }
}

/// Run tool calls one at a time and post each result back.
///
/// Never joined by `close`: a tool that ends the call runs on this task.
async fn dispatch_tool_calls(
    client: Arc<WsClient>,
    room: RoomName,
    mut calls: Subscription<ToolCall>,
    tools: Arc<dyn ToolDispatcher>,
    closed: Arc<AtomicBool>,
) {
    while let Some(next) = calls.next().await {
        if closed.load(Ordering::SeqCst) {
            break;
        }
        let call = match next {
            Ok(call) => call,
            Err(e) => {
                warn!("Dropping malformed tool call in room {}: {}", room, e);
                continue;
            }
        };

        let call_id = call.call_id.clone();
        let output = tools.dispatch(call).await;
        if closed.load(Ordering::SeqCst) {
            debug!("Session in room {} closed during tool call {}", room, call_id);
            break;
        }

        let params = ToolResult {
            room: room.as_str(),
            call_id: &call_id,
            output: &output,
        };
        if let Err(e) = client
            .request::<Value, _>("session.submit_tool_result", rpc_params![params])
            .await
        {
            warn!("Failed to submit result of tool call {}: {}", call_id, e);
        }
    }
    debug!("Tool call subscription for room {} ended", room);
}

fn transport_error(error: ClientError) -> EngineError {
    EngineError::Transport(error.to_string())
}
