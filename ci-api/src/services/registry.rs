//! Registry instrument operations and payload validation

use ci_common::db::RegistryInstrument;
use ci_common::{time, uuid_utils};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::db::registry;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const SAVED: &str = "Successfully saved registry instrument";
pub const DELETED: &str = "Successfully deleted registry instrument";
pub const NOT_FOUND: &str = "Not Found";
pub const INVALID_JSON: &str = "Invalid JSON payload";

const EXPECTED_KEYS: [&str; 8] = [
    "ci_version",
    "classifier_type",
    "classifier_value",
    "exercise_id",
    "guid",
    "instrument_id",
    "published_at",
    "survey_id",
];

static CLASSIFIER_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}$").expect("classifier value regex is valid"));

fn invalid(message: &str) -> ApiError {
    ApiError::Validation(message.to_string())
}

fn expected_keys() -> String {
    let quoted: Vec<String> = EXPECTED_KEYS.iter().map(|k| format!("'{}'", k)).collect();
    format!("{{{}}}", quoted.join(", "))
}

fn uuid_field(payload: &Value, key: &str) -> ApiResult<Uuid> {
    let raw = match &payload[key] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(uuid_utils::parse(&raw)?)
}

/// Validate an upsert payload against the exercise in the path
///
/// Checks run in a fixed order and the first failure is reported.
pub fn validate_payload(exercise_id: &str, payload: &Value) -> ApiResult<RegistryInstrument> {
    let object = payload
        .as_object()
        .ok_or_else(|| invalid(INVALID_JSON))?;

    let keys_match = object.len() == EXPECTED_KEYS.len()
        && EXPECTED_KEYS.iter().all(|k| object.contains_key(*k));
    if !keys_match {
        return Err(ApiError::Validation(format!(
            "Invalid payload keys. Expected: {}",
            expected_keys()
        )));
    }

    if payload["exercise_id"].as_str() != Some(exercise_id) {
        return Err(invalid("exercise_id in payload does not match path parameter"));
    }

    let survey_id = uuid_field(payload, "survey_id")?;
    let exercise = uuid_field(payload, "exercise_id")?;
    let instrument_id = uuid_field(payload, "instrument_id")?;
    let guid = uuid_field(payload, "guid")?;

    let classifier_type = payload["classifier_type"].as_str().unwrap_or_default();
    if classifier_type != registry::FORM_TYPE {
        return Err(invalid("Invalid classifier type"));
    }

    let classifier_value = match &payload["classifier_value"] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if !CLASSIFIER_VALUE.is_match(&classifier_value) {
        return Err(invalid("Invalid classifier value"));
    }

    let ci_version = match &payload["ci_version"] {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| invalid("Invalid ci_version"))?;

    let published_at = payload["published_at"]
        .as_str()
        .and_then(time::parse_iso8601)
        .ok_or_else(|| invalid("Invalid published_at"))?;

    Ok(RegistryInstrument {
        survey_id,
        exercise_id: exercise,
        instrument_id,
        classifier_type: classifier_type.to_string(),
        classifier_value,
        ci_version,
        guid,
        published_at,
    })
}

pub async fn list(state: &AppState, exercise_id: &Uuid) -> ApiResult<Vec<RegistryInstrument>> {
    let mut session = state.store.read_session().await?;
    let rows = registry::list_by_exercise(session.conn(), exercise_id).await?;
    session.commit().await?;
    Ok(rows)
}

pub async fn get(state: &AppState, exercise_id: &Uuid, form_type: &str) -> ApiResult<RegistryInstrument> {
    let mut session = state.store.read_session().await?;
    let row = registry::find_by_form_type(session.conn(), exercise_id, form_type).await?;
    session.commit().await?;
    row.ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_string()))
}

/// Create or update; true when the row was created
pub async fn save(state: &AppState, instrument: &RegistryInstrument) -> ApiResult<bool> {
    let mut session = state.store.session().await?;
    let is_new = registry::upsert(session.conn(), instrument).await?;
    session.commit().await?;
    info!(
        exercise_id = %instrument.exercise_id,
        form_type = %instrument.classifier_value,
        ci_version = instrument.ci_version,
        is_new,
        "Saved registry instrument"
    );
    Ok(is_new)
}

pub async fn delete(state: &AppState, exercise_id: &Uuid, form_type: &str) -> ApiResult<()> {
    let mut session = state.store.session().await?;
    if !registry::delete_by_form_type(session.conn(), exercise_id, form_type).await? {
        return Err(ApiError::NotFound(NOT_FOUND.to_string()));
    }
    session.commit().await?;
    info!(exercise_id = %exercise_id, form_type, "Deleted registry instrument");
    Ok(())
}

pub async fn count(state: &AppState, exercise_id: &Uuid) -> ApiResult<i64> {
    let mut session = state.store.read_session().await?;
    let count = registry::count_by_exercise(session.conn(), exercise_id).await?;
    session.commit().await?;
    Ok(count)
}
