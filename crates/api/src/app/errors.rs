use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tillsync_core::DomainError;
use tillsync_engine::SyncError;

pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::MerchantNotFound(_) | SyncError::JobNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        SyncError::MissingCredentials(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "missing_credentials", err.to_string())
        }
        SyncError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        SyncError::Domain(e) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "domain_error", e.to_string())
        }
        SyncError::Upstream(e) => json_error(StatusCode::BAD_GATEWAY, "upstream_error", e.to_string()),
        SyncError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        SyncError::VerificationFailed { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "verification_failed", err.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
