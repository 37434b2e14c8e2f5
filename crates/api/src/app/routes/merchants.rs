use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use tillsync_core::MerchantId;
use tillsync_engine::SyncOptions;
use tillsync_infra::{CursorDataType, CursorStore, MerchantStore};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/:id", post(trigger_sync))
        .route("/:id/cursor", get(cursor_status))
}

/// Run one incremental order sync for a merchant, inline.
pub async fn trigger_sync(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let merchant_id: MerchantId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid merchant id")
        }
    };

    match services
        .engine
        .sync_merchant(merchant_id, SyncOptions::default())
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

pub async fn cursor_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::CursorQuery>,
) -> axum::response::Response {
    let merchant_id: MerchantId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid merchant id")
        }
    };
    let data_type = match query.data_type.as_deref() {
        None | Some("orders") => CursorDataType::Orders,
        Some("inventory") => CursorDataType::Inventory,
        Some(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_data_type",
                "data_type must be orders or inventory",
            )
        }
    };

    let merchant = match services.store.get_merchant(merchant_id).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "merchant not found")
        }
        Err(e) => return errors::sync_error_to_response(e.into()),
    };

    match services
        .store
        .get_cursor(merchant_id, merchant.channel, data_type)
        .await
    {
        Ok(Some(cursor)) => Json(dto::CursorView::from(&cursor)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no cursor yet"),
        Err(e) => errors::sync_error_to_response(e.into()),
    }
}
