use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use transit_presence::api::{self, ApiContext};
use transit_presence::config;
use transit_presence::coordinator::Coordinator;
use transit_presence::driver::{RefreshDriver, TRIGGER_QUEUE_CAPACITY};
use transit_presence::feed::http::HttpVehicleFeed;
use transit_presence::state::AppState;
use tokio::sync::{mpsc, watch};

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        trackers = config.trackers().len(),
        "transit-presence starting"
    );

    let settings = config.engine_settings();
    let state = Arc::new(RwLock::new(AppState::new(
        settings.trackers.clone(),
        settings.tracker_names.clone(),
    )));

    let feed = HttpVehicleFeed::new(config.feed_url().to_string(), config.feed_timeout())?;
    tracing::info!(
        url = feed.url(),
        radius_m = config.radius_meters(),
        interval_secs = config.tick_interval().as_secs(),
        "Vehicle feed configured"
    );

    let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);
    let driver = RefreshDriver::new(
        Coordinator::new(settings, feed),
        Arc::clone(&state),
        trigger_rx,
        config.tick_interval(),
        stop_rx,
    );
    let driver_handle = tokio::spawn(driver.run());

    let app = api::router(ApiContext {
        state: Arc::clone(&state),
        triggers: trigger_tx,
    });
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Signal refresh driver to stop
    let _ = stop_tx.send(true);
    if let Err(err) = driver_handle.await {
        tracing::warn!(error = %err, "Refresh driver did not shut down cleanly");
    }

    Ok(())
}
