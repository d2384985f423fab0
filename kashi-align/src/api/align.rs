//! Alignment endpoint

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};

use crate::error::{ApiError, ApiResult};
use crate::models::{AlignmentRequestBody, AlignmentResult};
use crate::validation::{validate_request, ValidationError};
use crate::AppState;

/// POST /align
///
/// Validates the body, then runs the full pipeline. Results come back in
/// input order, one per line.
pub async fn align_lyrics(
    State(state): State<AppState>,
    payload: Result<Json<AlignmentRequestBody>, JsonRejection>,
) -> ApiResult<Json<Vec<AlignmentResult>>> {
    let Json(body) = payload.map_err(|rejection| ValidationError::Body(rejection.body_text()))?;
    let request = validate_request(body)?;

    match state.pipeline.run(&request).await {
        Ok(results) => Ok(Json(results)),
        Err(err) => {
            state.record_error(&err).await;
            Err(ApiError::from(err))
        }
    }
}

/// Build alignment routes
pub fn align_routes() -> Router<AppState> {
    Router::new().route("/align", post(align_lyrics))
}
