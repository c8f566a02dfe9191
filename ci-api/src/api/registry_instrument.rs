//! Registry instrument endpoints
//!
//! Bodies on these routes are plain strings, apart from the JSON listings.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ci_common::{db::RegistryInstrument, uuid_utils};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::registry::{self, DELETED, INVALID_JSON, NOT_FOUND, SAVED};
use crate::AppState;

fn plain<T: IntoResponse>(result: ApiResult<T>) -> Response {
    match result {
        Ok(body) => body.into_response(),
        Err(e) => e.into_plain_response(),
    }
}

fn parse_exercise(exercise_id: &str) -> ApiResult<Uuid> {
    Ok(uuid_utils::parse(exercise_id)?)
}

async fn list(state: &AppState, exercise_id: &str) -> ApiResult<Vec<RegistryInstrument>> {
    let exercise_id = parse_exercise(exercise_id)?;
    let rows = registry::list(state, &exercise_id).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound(NOT_FOUND.to_string()));
    }
    Ok(rows)
}

async fn get_one(state: &AppState, exercise_id: &str, form_type: &str) -> ApiResult<RegistryInstrument> {
    let exercise_id = parse_exercise(exercise_id)?;
    registry::get(state, &exercise_id, form_type).await
}

async fn put(state: &AppState, exercise_id: &str, body: &[u8]) -> ApiResult<StatusCode> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|_| ApiError::Validation(INVALID_JSON.to_string()))?;
    let instrument = registry::validate_payload(exercise_id, &payload)?;
    if registry::save(state, &instrument).await? {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::OK)
    }
}

async fn delete(state: &AppState, exercise_id: &str, form_type: &str) -> ApiResult<()> {
    let exercise_id = parse_exercise(exercise_id)?;
    registry::delete(state, &exercise_id, form_type).await
}

async fn count(state: &AppState, exercise_id: &str) -> ApiResult<i64> {
    let exercise_id = parse_exercise(exercise_id)?;
    registry::count(state, &exercise_id).await
}

/// GET /registry-instrument/exercise-id/:exercise_id
pub async fn list_for_exercise(State(state): State<AppState>, Path(exercise_id): Path<String>) -> Response {
    plain(list(&state, &exercise_id).await.map(Json))
}

/// GET /registry-instrument/exercise-id/:exercise_id/formtype/:form_type
pub async fn get_for_form_type(
    State(state): State<AppState>,
    Path((exercise_id, form_type)): Path<(String, String)>,
) -> Response {
    plain(get_one(&state, &exercise_id, &form_type).await.map(Json))
}

/// PUT /registry-instrument/exercise-id/:exercise_id
///
/// The body is read raw so malformed JSON gets the fixed message rather than
/// the extractor's rejection text.
pub async fn put_for_exercise(
    State(state): State<AppState>,
    Path(exercise_id): Path<String>,
    body: Bytes,
) -> Response {
    plain(put(&state, &exercise_id, &body).await.map(|status| (status, SAVED)))
}

/// DELETE /registry-instrument/exercise-id/:exercise_id/formtype/:form_type
pub async fn delete_for_form_type(
    State(state): State<AppState>,
    Path((exercise_id, form_type)): Path<(String, String)>,
) -> Response {
    plain(delete(&state, &exercise_id, &form_type).await.map(|_| DELETED))
}

/// GET /registry-instrument/exercise-id/:exercise_id/count
pub async fn count_for_exercise(State(state): State<AppState>, Path(exercise_id): Path<String>) -> Response {
    plain(
        count(&state, &exercise_id)
            .await
            .map(|n| Json(json!({ "registry_instrument_count": n }))),
    )
}

pub fn registry_instrument_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/registry-instrument/exercise-id/:exercise_id",
            get(list_for_exercise).put(put_for_exercise),
        )
        .route(
            "/registry-instrument/exercise-id/:exercise_id/formtype/:form_type",
            get(get_for_form_type).delete(delete_for_form_type),
        )
        .route(
            "/registry-instrument/exercise-id/:exercise_id/count",
            get(count_for_exercise),
        )
}
