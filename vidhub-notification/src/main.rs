use std::sync::Arc;

use vidhub_notification::config::AppConfig;
use vidhub_notification::delivery::{run_node_heartbeat, run_node_listener};
use vidhub_notification::routes;
use vidhub_notification::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vidhub_shared::middleware::init_tracing("vidhub-notification");

    let config = AppConfig::load()?;
    let port = config.port;

    // Set JWT_SECRET env var for the auth extractor middleware
    std::env::set_var("JWT_SECRET", &config.jwt_secret);

    let metrics_handle = vidhub_shared::middleware::init_metrics(vidhub_notification::COUNTERS)?;
    let state = Arc::new(AppState::connect(config).await?.with_metrics(metrics_handle));

    // Other nodes reach sockets owned by this one through its relay channel
    if let Some(redis) = state.redis.clone() {
        tokio::spawn(run_node_heartbeat(redis.clone(), state.config.node_id.clone()));
        tokio::spawn(run_node_listener(redis, state.config.node_id.clone(), state.hub.clone()));
    }

    let app = routes::router(state.clone());

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, node_id = %state.config.node_id, "vidhub-notification starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
