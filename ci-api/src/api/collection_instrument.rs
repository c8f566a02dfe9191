//! Collection instrument endpoints

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use ci_common::uuid_utils;
use serde::Deserialize;
use uuid::Uuid;

use super::multipart;
use crate::db::catalog::InstrumentView;
use crate::error::{ApiError, ApiResult};
use crate::services::instruments::{self, UPLOAD_SUCCESSFUL};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub classifiers: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EqUploadQuery {
    pub survey_id: Option<String>,
    pub classifiers: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "searchString")]
    pub search_string: Option<String>,
    pub limit: Option<String>,
}

fn parse_uuid(value: &str) -> ApiResult<Uuid> {
    Ok(uuid_utils::parse(value)?)
}

fn parse_limit(limit: Option<&str>) -> ApiResult<Option<i64>> {
    match limit.map(str::trim).filter(|l| !l.is_empty()) {
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::Validation(format!("Invalid limit {}", raw))),
        None => Ok(None),
    }
}

/// POST /upload/:exercise_id
pub async fn upload_seft(
    State(state): State<AppState>,
    Path(exercise_id): Path<String>,
    Query(query): Query<UploadQuery>,
    form: Result<Multipart, MultipartRejection>,
) -> ApiResult<&'static str> {
    let exercise_id = parse_uuid(&exercise_id)?;
    let file = multipart::require_file(form).await?;
    instruments::upload_seft(&state, &exercise_id, None, file, query.classifiers.as_deref()).await?;
    Ok(UPLOAD_SUCCESSFUL)
}

/// POST /upload/:exercise_id/:ru_ref
pub async fn upload_seft_for_ru(
    State(state): State<AppState>,
    Path((exercise_id, ru_ref)): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    form: Result<Multipart, MultipartRejection>,
) -> ApiResult<&'static str> {
    let exercise_id = parse_uuid(&exercise_id)?;
    let file = multipart::require_file(form).await?;
    instruments::upload_seft(
        &state,
        &exercise_id,
        Some(&ru_ref),
        file,
        query.classifiers.as_deref(),
    )
    .await?;
    Ok(UPLOAD_SUCCESSFUL)
}

/// POST /upload?survey_id=..&classifiers=..
pub async fn upload_eq(
    State(state): State<AppState>,
    Query(query): Query<EqUploadQuery>,
) -> ApiResult<&'static str> {
    let survey_id = query
        .survey_id
        .as_deref()
        .ok_or_else(|| ApiError::Validation("Missing survey_id".to_string()))?;
    let survey_id = parse_uuid(survey_id)?;
    instruments::upload_eq(&state, &survey_id, query.classifiers.as_deref()).await?;
    Ok(UPLOAD_SUCCESSFUL)
}

/// POST /link-exercise/:instrument_id/:exercise_id
pub async fn link_exercise(
    State(state): State<AppState>,
    Path((instrument_id, exercise_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let instrument_id = parse_uuid(&instrument_id)?;
    let exercise_id = parse_uuid(&exercise_id)?;
    instruments::link(&state, &instrument_id, &exercise_id).await?;
    Ok(Json(serde_json::json!({ "message": "Instrument linked to collection exercise" })))
}

/// PUT /unlink-exercise/:instrument_id/:exercise_id
pub async fn unlink_exercise(
    State(state): State<AppState>,
    Path((instrument_id, exercise_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let instrument_id = parse_uuid(&instrument_id)?;
    let exercise_id = parse_uuid(&exercise_id)?;
    instruments::unlink(&state, &instrument_id, &exercise_id).await?;
    Ok(Json(serde_json::json!({ "message": "Instrument unlinked from collection exercise" })))
}

/// PATCH /:instrument_id
pub async fn patch_instrument(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
    form: Result<Multipart, MultipartRejection>,
) -> ApiResult<&'static str> {
    let instrument_id = parse_uuid(&instrument_id)?;
    let file = multipart::require_file(form).await?;
    instruments::patch_seft(&state, &instrument_id, file).await?;
    Ok(UPLOAD_SUCCESSFUL)
}

/// GET /download/:instrument_id
pub async fn download(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
) -> ApiResult<Response> {
    let instrument_id = parse_uuid(&instrument_id)?;
    let (file_name, data) = instruments::download(&state, &instrument_id).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", file_name),
            ),
        ],
        data,
    )
        .into_response())
}

/// GET /download_csv/:exercise_id
pub async fn download_csv(
    State(state): State<AppState>,
    Path(exercise_id): Path<String>,
) -> ApiResult<Response> {
    let exercise_id = parse_uuid(&exercise_id)?;
    let csv = instruments::exercise_csv(&state, &exercise_id).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=instruments_for_{}.csv", exercise_id),
            ),
        ],
        csv,
    )
        .into_response())
}

/// GET /collectioninstrument?searchString=..&limit=..
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<InstrumentView>>> {
    let limit = parse_limit(query.limit.as_deref())?;
    let views = instruments::search(&state, query.search_string.as_deref(), limit).await?;
    Ok(Json(views))
}

/// GET /collectioninstrument/count?searchString=..
pub async fn count(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<String> {
    let count = instruments::count(&state, query.search_string.as_deref()).await?;
    Ok(count.to_string())
}

/// GET /collectioninstrument/id/:instrument_id
pub async fn by_id(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
) -> ApiResult<Json<InstrumentView>> {
    let instrument_id = parse_uuid(&instrument_id)?;
    Ok(Json(instruments::by_id(&state, &instrument_id).await?))
}

/// GET /instrument_size/:instrument_id
pub async fn instrument_size(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
) -> ApiResult<String> {
    let instrument_id = parse_uuid(&instrument_id)?;
    Ok(instruments::size(&state, &instrument_id).await?.to_string())
}

pub fn collection_instrument_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_eq))
        .route("/upload/:exercise_id", post(upload_seft))
        .route("/upload/:exercise_id/:ru_ref", post(upload_seft_for_ru))
        .route("/link-exercise/:instrument_id/:exercise_id", post(link_exercise))
        .route("/unlink-exercise/:instrument_id/:exercise_id", put(unlink_exercise))
        .route("/download/:instrument_id", get(download))
        .route("/download_csv/:exercise_id", get(download_csv))
        .route("/collectioninstrument", get(search))
        .route("/collectioninstrument/count", get(count))
        .route("/collectioninstrument/id/:instrument_id", get(by_id))
        .route("/instrument_size/:instrument_id", get(instrument_size))
        .route("/:instrument_id", patch(patch_instrument))
}
