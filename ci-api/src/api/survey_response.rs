//! Survey response endpoint

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};

use super::multipart;
use crate::error::ApiError;
use crate::services::responses::{self, UPLOAD_FAILED, UPLOAD_SUCCESSFUL};
use crate::AppState;

/// POST /survey_responses/:case_id
///
/// Hand-off failures are reported as a bare "Upload failed"; everything else
/// carries its own message.
pub async fn upload_survey_response(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    form: Result<Multipart, MultipartRejection>,
) -> Response {
    let file = match multipart::read_file(form).await {
        Ok(file) => file,
        Err(e) => return e.into_plain_response(),
    };

    match responses::submit(&state, &case_id, file).await {
        Ok(_) => UPLOAD_SUCCESSFUL.into_response(),
        Err(e @ (ApiError::Publish(_) | ApiError::CloudEgress(_) | ApiError::Crypto(_))) => {
            let status = e.status();
            tracing::error!(case_id = %case_id, error = %e, "Survey response hand-off failed");
            (status, UPLOAD_FAILED).into_response()
        }
        Err(e) => e.into_plain_response(),
    }
}

pub fn survey_response_routes() -> Router<AppState> {
    Router::new().route("/survey_responses/:case_id", post(upload_survey_response))
}
