//! Snoti listener
//!
//! Connects to the Snoti push service, logs every pushed event and
//! acknowledges it.
//!
//! Usage: `snoti_listen [config.yaml]` (default: `$SNOTI_CONFIG_PATH` or
//! `config/snoti.yaml`).

use anyhow::{Context, Result};
use snoti::{ClientConfig, EventPush, SnotiClient};
use snoti_listener::bin_common::{
    init_tracing, load_config_from_env, parse_args, spawn_event_logger, ConfigType,
};
use tracing::{error, info, warn};

fn handle_event(client: &SnotiClient, event: EventPush) -> snoti::Result<()> {
    info!(
        did = event.did.as_deref().unwrap_or("-"),
        event_type = event.event_type.as_deref().unwrap_or("-"),
        "{}",
        String::from_utf8_lossy(&event.payload)
    );

    match event.ack_ids() {
        Some((msg_id, delivery_id)) => client.ack_blocking(msg_id, delivery_id),
        None => {
            warn!("event_push without msg_id/delivery_id, not acknowledged");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config_type = match parse_args().into_iter().next() {
        Some(path) => ConfigType::Custom(path),
        None => ConfigType::Client,
    };
    let config_path = load_config_from_env(config_type);
    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    info!("");
    info!("========================================");
    info!("Starting snoti listener for {}", config.endpoint);
    info!("Press Ctrl+C to stop");
    info!("========================================");

    let client = SnotiClient::builder()
        .config(config)
        .handler(handle_event)
        .build()?;
    client.start()?;

    let (event_logger, terminated) = spawn_event_logger(&client)?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Ctrl+C received, shutting down");
        }
        _ = terminated => warn!("Client terminated, shutting down"),
    }
    client.stop().await;

    if event_logger.join().is_err() {
        error!("Event logger thread panicked");
    }

    let metrics = client.metrics();
    info!("========================================");
    info!(
        "Snoti listener stopped: {} events, {} frames sent, {} reconnects",
        metrics.events_dispatched, metrics.frames_sent, metrics.reconnect_count
    );
    info!("========================================");
    Ok(())
}
