use anyhow::{Context, Result};
use std::sync::Arc;
use tilewatch::api::{create_router, AppState};
use tilewatch::config::load_config_or_default;
use tilewatch::control::{run_pending_cleanup, ControlService};
use tilewatch::ingest::{ingest_queue, IngestRouter};
use tilewatch::nats::{spawn_subscribers, NatsClient, NatsCommandSink};
use tilewatch::probe::{HttpProbe, LivenessProber};
use tilewatch::state::EntityStore;
use tilewatch::topology::load_topology;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tilewatch=info".into()),
        )
        .init();

    info!("Tilewatch starting...");

    let config_path =
        std::env::var("TILEWATCH_CONFIG").unwrap_or_else(|_| "tilewatch.toml".to_string());
    let config = load_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    info!(
        config_path = %config_path,
        topology_path = %config.topology_path.display(),
        nats_url = %config.nats.url,
        api_port = config.api.port,
        "Configuration loaded"
    );

    // Without a topology there is nothing to track
    let topology = load_topology(&config.topology_path).with_context(|| {
        format!(
            "Failed to load topology from {}",
            config.topology_path.display()
        )
    })?;
    let store = Arc::new(EntityStore::from_topology(&topology));

    let nats = NatsClient::connect(&config.nats.url).await?;

    let sink = Arc::new(NatsCommandSink::new(nats.client().clone()));
    let control = Arc::new(ControlService::new(
        sink,
        Arc::clone(&store),
        config.nats.control_prefix.clone(),
        config.control.request_expiry_seconds,
    ));

    // Subscribers -> bounded queue -> single router
    let (tx, rx) = ingest_queue(config.ingest.queue_capacity);
    let subscriber_handles = spawn_subscribers(nats.client(), &config.nats.subjects, &tx);
    drop(tx);

    let router = IngestRouter::new(Arc::clone(&store)).with_control(Arc::clone(&control));
    let router_handle = tokio::spawn(router.run(rx));
    info!(channels = subscriber_handles.len(), "Ingest pipeline started");

    let prober = Arc::new(LivenessProber::new(
        Arc::clone(&store),
        Arc::new(HttpProbe::new()),
        config.probe.clone(),
    ));
    let prober_handle = tokio::spawn(Arc::clone(&prober).run_probe_loop());

    let cleanup_handle = tokio::spawn(run_pending_cleanup(
        control.pending().clone(),
        config.control.cleanup_interval_seconds,
    ));

    // Start HTTP API server
    let app_state = Arc::new(AppState {
        store: Arc::clone(&store),
        prober,
        control,
    });
    let app = create_router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api.port))
        .await
        .context("Failed to bind API port")?;
    info!(port = config.api.port, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    prober_handle.abort();
    cleanup_handle.abort();
    for handle in subscriber_handles {
        handle.abort();
    }
    router_handle.abort();
    info!("Tilewatch stopped");

    Ok(())
}
