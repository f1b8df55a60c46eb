//! Call entities

use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_CUSTOMER_NAME: &str = "there";
const DEFAULT_APPOINTMENT_TIME: &str = "your upcoming appointment";

/// Who to dial and where to send them on request.
///
/// Deserialized from the job metadata: `phone_number` and `transfer_to` are
/// the well-known keys, everything else is kept as appointment context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialInfo {
    #[serde(rename = "phone_number", default)]
    callee_number: String,
    #[serde(rename = "transfer_to", default)]
    transfer_target: Option<String>,
    #[serde(flatten)]
    appointment_context: BTreeMap<String, Value>,
}

impl DialInfo {
    pub fn new(callee_number: impl Into<String>, transfer_target: impl Into<String>) -> Self {
        Self {
            callee_number: callee_number.into(),
            transfer_target: Some(transfer_target.into()),
            appointment_context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.appointment_context.insert(key.into(), value.into());
        self
    }

    /// Reject dial info the call cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.callee_number.trim().is_empty() {
            return Err(CallError::Configuration(
                "missing callee phone number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn callee_number(&self) -> &str {
        self.callee_number.trim()
    }

    /// Transfer destination, if one was configured and is not blank
    pub fn transfer_target(&self) -> Option<&str> {
        self.transfer_target
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
    }

    pub fn appointment_context(&self) -> &BTreeMap<String, Value> {
        &self.appointment_context
    }

    pub fn customer_name(&self) -> &str {
        self.context_str("customer_name")
            .unwrap_or(DEFAULT_CUSTOMER_NAME)
    }

    pub fn appointment_time(&self) -> &str {
        self.context_str("appointment_time")
            .unwrap_or(DEFAULT_APPOINTMENT_TIME)
    }

    fn context_str(&self, key: &str) -> Option<&str> {
        self.appointment_context
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}
