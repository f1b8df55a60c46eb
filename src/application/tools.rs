//! Tool registry
//!
//! Maps tool names to typed handlers closed over one call's agent. Built once
//! per call and handed to the conversation engine at session start.

use crate::application::agent::CallAgent;
use crate::domain::call::{CallEventKind, CallSession};
use crate::domain::conversation::{ToolCall, ToolDispatcher, ToolOutput, ToolSpec};
use crate::infrastructure::call_metrics;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type ToolHandler = Box<dyn Fn(Value) -> BoxFuture<'static, ToolOutput> + Send + Sync>;

struct RegisteredTool {
    spec: ToolSpec,
    handler: ToolHandler,
}

#[derive(Debug, Deserialize)]
struct LookUpAvailabilityArgs {
    date: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmAppointmentArgs {
    date: String,
    time: String,
}

/// Named tools for one call
pub struct ToolRegistry {
    session: Arc<CallSession>,
    tools: BTreeMap<String, RegisteredTool>,
    /// Serializes dispatch so tools run one at a time per call
    turn: Mutex<()>,
}

impl ToolRegistry {
    pub fn new(session: Arc<CallSession>) -> Self {
        Self {
            session,
            tools: BTreeMap::new(),
            turn: Mutex::new(()),
        }
    }

    /// Registry with every call-control tool bound to `agent`
    pub fn for_agent(agent: Arc<CallAgent>) -> Self {
        let mut registry = Self::new(agent.session().clone());

        let transfer = agent.clone();
        registry.register(
            tool_spec(
                "transfer_call",
                "Transfer the call to a human agent, called after confirming with the user",
                no_arguments(),
            ),
            move |_| {
                let agent = transfer.clone();
                async move { agent.transfer_call().await }
            },
        );

        let end = agent.clone();
        registry.register(
            tool_spec(
                "end_call",
                "Called when the user wants to end the call",
                no_arguments(),
            ),
            move |_| {
                let agent = end.clone();
                async move { agent.end_call().await }
            },
        );

        let look_up = agent.clone();
        registry.register(
            tool_spec(
                "look_up_availability",
                "Called when the user asks about alternative appointment availability",
                json!({
                    "type": "object",
                    "properties": {
                        "date": {
                            "type": "string",
                            "description": "The date of the appointment to check availability for"
                        }
                    },
                    "required": ["date"]
                }),
            ),
            move |arguments| {
                let agent = look_up.clone();
                async move {
                    match parse_arguments::<LookUpAvailabilityArgs>(arguments) {
                        Ok(args) => agent.look_up_availability(&args.date).await,
                        Err(output) => output,
                    }
                }
            },
        );

        let confirm = agent.clone();
        registry.register(
            tool_spec(
                "confirm_appointment",
                "Called when the user confirms their appointment on a specific date. \
                 Use this tool only when they are certain about the date and time.",
                json!({
                    "type": "object",
                    "properties": {
                        "date": {
                            "type": "string",
                            "description": "The date of the appointment"
                        },
                        "time": {
                            "type": "string",
                            "description": "The time of the appointment"
                        }
                    },
                    "required": ["date", "time"]
                }),
            ),
            move |arguments| {
                let agent = confirm.clone();
                async move {
                    match parse_arguments::<ConfirmAppointmentArgs>(arguments) {
                        Ok(args) => agent.confirm_appointment(&args.date, &args.time).await,
                        Err(output) => output,
                    }
                }
            },
        );

        let voicemail = agent;
        registry.register(
            tool_spec(
                "detected_answering_machine",
                "Called when the call reaches voicemail. \
                 Use this tool AFTER you hear the voicemail greeting",
                no_arguments(),
            ),
            move |_| {
                let agent = voicemail.clone();
                async move { agent.detected_answering_machine().await }
            },
        );

        registry
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<F, Fut>(&mut self, spec: ToolSpec, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutput> + Send + 'static,
    {
        let name = spec.name.clone();
        let handler: ToolHandler = Box::new(move |arguments| handler(arguments).boxed());
        if self
            .tools
            .insert(name.clone(), RegisteredTool { spec, handler })
            .is_some()
        {
            debug!("Replaced tool {}", name);
        }
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec.clone()).collect()
    }

    async fn dispatch(&self, call: ToolCall) -> ToolOutput {
        let _turn = self.turn.lock().await;

        let Some(tool) = self.tools.get(&call.name) else {
            warn!("Unknown tool {} requested in room {}", call.name, self.session.room());
            return ToolOutput::failed(format!("unknown tool: {}", call.name));
        };

        debug!("Dispatching tool {} ({})", call.name, call.call_id);
        call_metrics::record_tool_invocation(&call.name);
        self.session.record(CallEventKind::ToolInvoked {
            tool: call.name.clone(),
        });

        (tool.handler)(call.arguments).await
    }
}

fn tool_spec(name: &str, description: &str, parameters: Value) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn no_arguments() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolOutput> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolOutput::failed(format!("invalid arguments: {}", e)))
}
