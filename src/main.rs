//! telebridge server entry point.
//!
//! Starts the lifecycle controller, wires a demo heartbeat producer,
//! and shuts down cleanly on Ctrl-C.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use telebridge::app_state::AppState;
use telebridge::config::{SettingsSnapshot, settings_channel};
use telebridge::discovery::DiscoveryAdvertiser;
use telebridge::domain::{ConnectionRegistry, EventBus, TelemetryEvent};
use telebridge::lifecycle::Lifecycle;
use telebridge::service::SessionService;
use telebridge::signaling::SignalingBroker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let settings = SettingsSnapshot::from_env();
    tracing::info!(
        api_port = settings.api_port,
        ws_port = settings.ws_port,
        key_configured = settings.api_key.is_some(),
        launch_on_startup = settings.launch_on_startup,
        "starting telebridge"
    );
    let event_bus_capacity = settings.event_bus_capacity;
    let (settings_tx, settings_rx) = settings_channel(settings);

    let instance_id = std::env::var("TELEBRIDGE_INSTANCE_ID")
        .unwrap_or_else(|_| format!("telebridge-{}", Uuid::new_v4().simple()));

    // Build domain layer
    let event_bus = EventBus::new(event_bus_capacity);
    let registry = Arc::new(ConnectionRegistry::new(settings_rx.clone()));
    let broker = Arc::new(SignalingBroker::new(Arc::clone(&registry)));

    // Build service layer
    let service = Arc::new(SessionService::new(
        registry,
        event_bus.clone(),
        broker,
    ));

    // Build lifecycle + application state
    let advertiser = Arc::new(DiscoveryAdvertiser::new(instance_id.clone()));
    let lifecycle = Arc::new(Lifecycle::new(
        settings_tx,
        Arc::clone(&service),
        Some(advertiser),
    ));
    let app_state = AppState {
        service,
        lifecycle: Arc::clone(&lifecycle),
        settings: settings_rx,
        instance_id,
    };

    lifecycle.start(app_state).await?;

    // Minimal built-in producer; real telemetry producers attach the
    // same way, each with its own clone of the bus.
    let heartbeat_bus = event_bus.clone();
    let heartbeat = tokio::spawn(async move {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let uptime = started.elapsed().as_secs();
            heartbeat_bus
                .publish(TelemetryEvent::new(
                    "gateway.uptime",
                    serde_json::json!(uptime),
                    "heartbeat",
                ))
                .await;
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    heartbeat.abort();
    lifecycle.stop().await;

    Ok(())
}
