//! Configuration management
//!
//! Values come from an optional TOML file, then environment variables
//! prefixed with `OUTBOUND_CALLER__` (sections separated by `__`, e.g.
//! `OUTBOUND_CALLER__CALL__DIAL_TIMEOUT_SECS=45`). `SIP_OUTBOUND_TRUNK_ID`
//! overrides the trunk for compatibility with existing deployments.

use crate::application::OrchestratorConfig;
use crate::domain::conversation::SessionOptions;
use ::config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Config file read when no path is given; optional
pub const DEFAULT_CONFIG_FILE: &str = "outbound-caller";

const ENV_PREFIX: &str = "OUTBOUND_CALLER";
const TRUNK_ENV_VAR: &str = "SIP_OUTBOUND_TRUNK_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub engine: EngineConfig,
    pub call: CallConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub url: String,
    pub outbound_trunk_id: String,
    pub play_dialtone: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub url: String,
    pub request_timeout_secs: u64,
    pub allow_interruptions: bool,
    pub max_endpointing_delay_ms: u64,
    pub noise_cancellation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub agent_name: String,
    pub dial_timeout_secs: u64,
    pub session_timeout_secs: u64,
    pub availability_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7880".to_string(),
            outbound_trunk_id: String::new(),
            play_dialtone: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7881".to_string(),
            request_timeout_secs: 60,
            allow_interruptions: true,
            max_endpointing_delay_ms: 300,
            noise_cancellation: true,
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            agent_name: "outbound-caller".to_string(),
            dial_timeout_secs: 30,
            session_timeout_secs: 10,
            availability_delay_ms: 3000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9464".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default file, if present)
    /// and the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        ::config::Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_CONFIG_FILE)).required(path.is_some()))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override_option("gateway.outbound_trunk_id", std::env::var(TRUNK_ENV_VAR).ok())?
            .build()?
            .try_deserialize()
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.call.dial_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.call.session_timeout_secs)
    }

    pub fn engine_request_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.request_timeout_secs)
    }

    pub fn availability_delay(&self) -> Duration {
        Duration::from_millis(self.call.availability_delay_ms)
    }

    /// Settings handed to the orchestrator at construction
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            outbound_trunk_id: self.gateway.outbound_trunk_id.clone(),
            dial_timeout: self.dial_timeout(),
            session_timeout: self.session_timeout(),
            session: SessionOptions {
                instructions: String::new(),
                allow_interruptions: self.engine.allow_interruptions,
                max_endpointing_delay_ms: self.engine.max_endpointing_delay_ms,
                noise_cancellation: self.engine.noise_cancellation,
            },
        }
    }
}
