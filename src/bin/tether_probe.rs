//! Probe binary for a tether endpoint
//!
//! Connects, authenticates, joins the configured rooms and logs every
//! lifecycle event and inbound application message until Ctrl+C.
//!
//! Usage:
//!   cargo run --bin tether-probe
//!
//! Environment variables:
//!   TETHER_WS_URL      - ws:// or wss:// endpoint (required)
//!   TETHER_TOKEN       - session token
//!   TETHER_ROOMS       - comma-separated room ids
//!   TETHER_CONFIG_PATH - supervisor config (default config/tether.yaml)

use anyhow::Result;
use std::time::Duration;
use tether_client::bin_common::{init_tracing, ProbeSettings, StopSignal};
use tether_client::tether::{self, ClientEvent, Envelope, SupervisorConfig, WebSocketTransport};
use tracing::{error, info, warn};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn load_config(settings: &ProbeSettings) -> Result<SupervisorConfig> {
    if settings.config_path.exists() {
        info!("Loading config from {}", settings.config_path.display());
        Ok(SupervisorConfig::load(&settings.config_path)?)
    } else {
        warn!(
            "{} not found, using defaults",
            settings.config_path.display()
        );
        Ok(SupervisorConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let settings = ProbeSettings::from_env()?;
    let config = load_config(&settings)?;
    config.log();

    let stop = StopSignal::new();
    stop.listen_for_ctrl_c();

    let transport = WebSocketTransport::from_config(settings.url.as_str(), &config);
    let supervisor = tether::builder()
        .transport(transport)
        .config(config)
        .build()
        .await?;

    let _messages = supervisor.on("new_message", |env: &Envelope| -> tether::Result<()> {
        info!("[message] {}", env.data.clone().unwrap_or_default());
        Ok(())
    });

    for room in &settings.rooms {
        supervisor.join_room(room);
    }

    info!("Connecting to {}", settings.url);
    info!("Press Ctrl+C to stop");
    supervisor.initialize(settings.token.as_deref()).await;

    let mut last_health_log = tokio::time::Instant::now();
    while !stop.is_stopped() {
        while let Some(event) = supervisor.try_recv_event() {
            match event {
                ClientEvent::AuthFailed(reason) => error!("Authentication failed: {}", reason),
                ClientEvent::RetriesExhausted => {
                    error!("Gave up reconnecting, forcing a fresh attempt");
                    supervisor.force_reconnect().await;
                }
                ClientEvent::Reconnecting { attempt, delay } => {
                    warn!("Reconnecting (attempt {}) in {:?}", attempt, delay)
                }
                other => info!("Event: {:?}", other),
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let health = supervisor.connection_health();
            let metrics = supervisor.metrics();
            info!(
                "Health: {:?} | sent {} recv {} dropped {} | latency {:?}ms",
                supervisor.connection_state(),
                metrics.messages_sent,
                metrics.messages_received,
                metrics.messages_dropped,
                metrics.last_latency_ms
            );
            if let Some(error) = health.last_error {
                info!("Last error: {}", error);
            }
            last_health_log = tokio::time::Instant::now();
        }

        stop.sleep_or_stop(POLL_INTERVAL).await;
    }

    supervisor.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
