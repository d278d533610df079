// src/api/scan.rs

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, warn};

use crate::api::AppState;
use crate::core::models::{ScanOutcome, ScanRequest};

pub const MSG_INVALID_BODY: &str = "Invalid request body.";

/// `POST /v1/scan`
///
/// Handled outcomes, successful or not, are returned with 200. Only a fault
/// that escapes the core (a panicked task) produces a 500.
pub async fn scan_target(
    State(state): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> (StatusCode, Json<ScanOutcome>) {
    let request = match payload {
        Ok(Json(request)) if !request.target.trim().is_empty() => request,
        Ok(_) => {
            warn!("Rejected scan request with an empty target.");
            return (StatusCode::BAD_REQUEST, Json(ScanOutcome::failure(MSG_INVALID_BODY)));
        }
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected malformed scan request.");
            return (StatusCode::BAD_REQUEST, Json(ScanOutcome::failure(MSG_INVALID_BODY)));
        }
    };

    let target = request.target.clone();
    let handler = state.handler.clone();
    match tokio::spawn(async move { handler.handle(request).await }).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)),
        Err(e) => {
            error!(target = %target, error = %e, "Scan task failed unexpectedly.");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ScanOutcome::internal_error()))
        }
    }
}
