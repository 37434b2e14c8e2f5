use std::sync::Arc;

use axum::{
    extract::Extension,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/run", post(run_now))
        .route("/status", get(status))
}

/// Manual trigger; respects the scheduler's overlap guard.
pub async fn run_now(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.scheduler.run_once().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

pub async fn status(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    Json(services.scheduler.status()).into_response()
}
