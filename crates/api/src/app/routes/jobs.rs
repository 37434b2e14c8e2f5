use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use tillsync_core::{Channel, SyncJobId};
use tillsync_engine::HistoricalSyncRequest;
use tillsync_infra::JobStore;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(start_job))
        .route("/:id", get(job_status))
        .route("/:id/cancel", post(cancel_job))
}

pub async fn start_job(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StartJobRequest>,
) -> axum::response::Response {
    let channel: Channel = match body.channel.parse() {
        Ok(c) => c,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_channel", "unknown channel")
        }
    };

    let request = HistoricalSyncRequest {
        channel,
        range_start: body.range_start,
        range_end: body.range_end,
        force_full_sync: body.force_full_sync,
    };

    match services.orchestrator.start_historical_sync(request).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"job_id": job_id.to_string()})),
        )
            .into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

pub async fn job_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: SyncJobId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"),
    };

    let job = match services.store.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "job not found"),
        Err(e) => return errors::sync_error_to_response(e.into()),
    };
    let checkpoints = match services.store.checkpoints_for_job(job_id).await {
        Ok(checkpoints) => checkpoints,
        Err(e) => return errors::sync_error_to_response(e.into()),
    };

    Json(dto::JobStatusResponse::from_parts(&job, &checkpoints)).into_response()
}

pub async fn cancel_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: SyncJobId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"),
    };

    match services.orchestrator.cancel_job(job_id).await {
        Ok(()) => Json(serde_json::json!({"cancelled": true})).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}
