use anyhow::Context;
use outbound_caller::application::CallOrchestrator;
use outbound_caller::config::Config;
use outbound_caller::domain::call::TerminalReason;
use outbound_caller::infrastructure::call_metrics::init_metrics;
use outbound_caller::infrastructure::engine::RpcConversationEngine;
use outbound_caller::infrastructure::gateway::RpcDialClient;
use outbound_caller::infrastructure::scheduling::StaticAvailability;
use outbound_caller::interface::{CallSummary, JobRequest};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH_VAR: &str = "OUTBOUND_CALLER_CONFIG";
const JOB_VAR: &str = "OUTBOUND_CALLER_JOB";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::var(CONFIG_PATH_VAR).ok();
    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting outbound caller worker {}", config.call.agent_name);
    info!("Configuration loaded: {:?}", config);

    if config.metrics.enabled {
        let listen: SocketAddr = config
            .metrics
            .listen
            .parse()
            .with_context(|| format!("invalid metrics listen address {}", config.metrics.listen))?;
        init_metrics(listen).context("failed to install metrics exporter")?;
        info!("Metrics exporter listening on {}", listen);
    }

    // The job comes from the first argument, or the environment
    let job_json = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(JOB_VAR).ok())
        .with_context(|| format!("no job given: pass it as an argument or set {}", JOB_VAR))?;
    let job = JobRequest::from_json(&job_json)?;
    let room = job.room();
    let dial_info = job.dial_info()?;

    // Wire up adapters
    let dial = Arc::new(
        RpcDialClient::new(&config.gateway.url, config.dial_timeout())?
            .with_dialtone(config.gateway.play_dialtone),
    );
    info!("Telephony gateway client ready: {}", config.gateway.url);

    let engine = Arc::new(
        RpcConversationEngine::connect(&config.engine.url, config.engine_request_timeout()).await?,
    );

    let availability =
        Arc::new(StaticAvailability::default().with_delay(config.availability_delay()));

    let orchestrator = CallOrchestrator::new(config.orchestrator(), dial, engine, availability)?;

    let mut call = orchestrator.start_call(room, dial_info).await?;
    let control = call.control();

    let run = async {
        match call.connected().await {
            Ok(identity) => info!("Call connected to {}", identity),
            Err(e) => error!("Call did not connect: {}", e),
        }
        call.finished().await
    };

    let reason = tokio::select! {
        reason = run => reason,
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, hanging up");
            control.teardown(TerminalReason::UserEnded).await;
            control.wait_released().await
        }
    };
    info!(
        "Call in room {} finished: {}",
        call.session().room(),
        reason.map(|r| r.as_str()).unwrap_or("unknown")
    );

    let summary = CallSummary::from(call.session().as_ref());
    println!("{}", serde_json::to_string(&summary)?);

    Ok(())
}
