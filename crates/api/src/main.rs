use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use tillsync_api::app::services::{build_services, ServiceConfig};

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

#[tokio::main]
async fn main() {
    tillsync_observability::init();

    let config = ServiceConfig {
        database_url: std::env::var("DATABASE_URL").ok(),
        upstream_base_url: std::env::var("POS_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.clover.com".to_string()),
        worker_interval: env_secs("SYNC_WORKER_INTERVAL_SECS", 30),
        inventory_interval: env_secs("INVENTORY_SYNC_INTERVAL_SECS", 30 * 60),
    };

    let services = build_services(config)
        .await
        .expect("failed to build services");

    // The entry point owns the background loops; the Notify fans the
    // shutdown signal out to both.
    let shutdown = Arc::new(Notify::new());
    let worker = services.orchestrator.clone().spawn(shutdown.clone());
    let scheduler = services.scheduler.clone().spawn(shutdown.clone());

    let app = tillsync_api::app::build_app(services);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();

    shutdown.notify_waiters();
    let _ = tokio::join!(worker, scheduler);
}
