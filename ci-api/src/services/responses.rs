//! Survey response pipeline
//!
//! validate file -> resolve case, exercise, survey and party -> name the
//! response -> hand off through the configured egress

use chrono::{DateTime, Utc};
use ci_common::{files, time, uuid_utils};
use tracing::info;
use uuid::Uuid;

use super::UploadedFile;
use crate::config::Config;
use crate::egress::SurveyResponse;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const UPLOAD_SUCCESSFUL: &str = "Upload successful";
pub const UPLOAD_FAILED: &str = "Upload failed";
pub const FILE_EXTENSION_ERROR: &str = "The spreadsheet must be in .xls or .xlsx format";
pub const FILE_NAME_LENGTH_ERROR: &str = "The file name of your spreadsheet must be less than 50 characters long";
pub const MISSING_FILE: &str = "Missing case id or file";

/// Outcome of a successful submission
#[derive(Debug, Clone)]
pub struct Receipt {
    pub filename: String,
    pub tx_id: Uuid,
}

/// Check the uploaded file against the configured rules
pub fn validate_file(file: &UploadedFile, config: &Config) -> ApiResult<()> {
    let (base, extension) = files::split_extension(&file.file_name);
    if !files::is_valid_extension(extension, &config.upload_file_extensions) {
        return Err(ApiError::Validation(FILE_EXTENSION_ERROR.to_string()));
    }
    if !files::is_valid_name_length(base, config.max_upload_file_name_length) {
        return Err(ApiError::Validation(FILE_NAME_LENGTH_ERROR.to_string()));
    }
    if file.data.is_empty() {
        return Err(ApiError::FileTooSmall);
    }
    Ok(())
}

/// Period part of an exercise reference such as `221_201712`
pub fn format_exercise_ref(exercise_ref: &str) -> &str {
    match exercise_ref.rfind('_') {
        Some(idx) => &exercise_ref[idx + 1..],
        None => exercise_ref,
    }
}

/// `{ru}{checkletter}_{period}_{survey_ref}_{YYYYMMDDHHMMSS}`
pub fn response_file_name(
    ru_ref: &str,
    check_letter: &str,
    exercise_ref: &str,
    survey_ref: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}{}_{}_{}_{}",
        ru_ref,
        check_letter,
        exercise_ref,
        survey_ref,
        time::file_stamp(at)
    )
}

fn missing(what: &str, case_id: &str) -> ApiError {
    ApiError::NotFound(format!("{} not found for case {}", what, case_id))
}

/// Validate, name and hand off one survey response
pub async fn submit(state: &AppState, case_id: &str, file: Option<UploadedFile>) -> ApiResult<Receipt> {
    let file = match file {
        Some(file) if !case_id.trim().is_empty() && !file.file_name.is_empty() => file,
        _ => return Err(ApiError::Validation(MISSING_FILE.to_string())),
    };
    uuid_utils::parse(case_id)?;
    validate_file(&file, &state.config)?;

    let clients = &state.clients;
    let case_group = clients.case_group(case_id).await?;
    let ru_ref = case_group
        .sample_unit_ref
        .ok_or_else(|| missing("Sample unit ref", case_id))?;
    let exercise_id = case_group
        .collection_exercise_id
        .ok_or_else(|| missing("Collection exercise", case_id))?;
    let party_id = case_group.party_id.ok_or_else(|| missing("Party", case_id))?;

    let exercise = clients.collection_exercise(&exercise_id).await?;
    let exercise_ref = exercise
        .exercise_ref
        .ok_or_else(|| missing("Exercise ref", case_id))?;
    let survey_id = exercise.survey_id.ok_or_else(|| missing("Survey", case_id))?;
    let survey_ref = clients.survey_ref(&survey_id).await?;

    let party = clients.business_party(&party_id, &exercise_id).await?;
    let check_letter = party
        .checkletter
        .ok_or_else(|| missing("Check letter", case_id))?;

    let exercise_ref = format_exercise_ref(&exercise_ref).to_string();
    let filename = response_file_name(&ru_ref, &check_letter, &exercise_ref, &survey_ref, Utc::now());
    let response = SurveyResponse {
        filename,
        tx_id: uuid_utils::generate(),
        case_id: case_id.to_string(),
        survey_ref,
        exercise_ref,
        ru_ref,
        file: file.data,
    };

    info!(
        case_id,
        filename = %response.filename,
        survey_id = %response.survey_ref,
        tx_id = %response.tx_id,
        "Handing off survey response"
    );
    state.response_egress.hand_off(&response).await?;

    Ok(Receipt {
        filename: response.filename,
        tx_id: response.tx_id,
    })
}
