//! Registry instrument queries

use ci_common::db::RegistryInstrument;
use ci_common::uuid_utils;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::ApiResult;

const COLUMNS: &str = "survey_id, exercise_id, instrument_id, classifier_type, classifier_value, ci_version, guid, published_at";

/// Classifier type every registry row is keyed on
pub const FORM_TYPE: &str = ci_common::classifiers::FORM_TYPE;

fn from_row(row: &SqliteRow) -> ApiResult<RegistryInstrument> {
    let survey_id: String = row.try_get("survey_id")?;
    let exercise_id: String = row.try_get("exercise_id")?;
    let instrument_id: String = row.try_get("instrument_id")?;
    let guid: String = row.try_get("guid")?;

    Ok(RegistryInstrument {
        survey_id: uuid_utils::from_db(&survey_id)?,
        exercise_id: uuid_utils::from_db(&exercise_id)?,
        instrument_id: uuid_utils::from_db(&instrument_id)?,
        classifier_type: row.try_get("classifier_type")?,
        classifier_value: row.try_get("classifier_value")?,
        ci_version: row.try_get("ci_version")?,
        guid: uuid_utils::from_db(&guid)?,
        published_at: row.try_get("published_at")?,
    })
}

pub async fn list_by_exercise(conn: &mut SqliteConnection, exercise_id: &Uuid) -> ApiResult<Vec<RegistryInstrument>> {
    let sql = format!(
        "SELECT {} FROM registry_instrument WHERE exercise_id = ? ORDER BY classifier_value",
        COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(uuid_utils::to_db(exercise_id))
        .fetch_all(conn)
        .await?;
    rows.iter().map(from_row).collect()
}

pub async fn find_by_form_type(
    conn: &mut SqliteConnection,
    exercise_id: &Uuid,
    form_type: &str,
) -> ApiResult<Option<RegistryInstrument>> {
    let sql = format!(
        "SELECT {} FROM registry_instrument WHERE exercise_id = ? AND classifier_type = ? AND classifier_value = ?",
        COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(uuid_utils::to_db(exercise_id))
        .bind(FORM_TYPE)
        .bind(form_type)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Create the row or overwrite its version fields; true when created
pub async fn upsert(conn: &mut SqliteConnection, instrument: &RegistryInstrument) -> ApiResult<bool> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM registry_instrument WHERE exercise_id = ? AND classifier_type = ? AND classifier_value = ?",
    )
    .bind(uuid_utils::to_db(&instrument.exercise_id))
    .bind(&instrument.classifier_type)
    .bind(&instrument.classifier_value)
    .fetch_optional(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO registry_instrument
            (survey_id, exercise_id, instrument_id, classifier_type, classifier_value, ci_version, guid, published_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (exercise_id, classifier_type, classifier_value) DO UPDATE SET
            ci_version = excluded.ci_version,
            guid = excluded.guid,
            published_at = excluded.published_at
        "#,
    )
    .bind(uuid_utils::to_db(&instrument.survey_id))
    .bind(uuid_utils::to_db(&instrument.exercise_id))
    .bind(uuid_utils::to_db(&instrument.instrument_id))
    .bind(&instrument.classifier_type)
    .bind(&instrument.classifier_value)
    .bind(instrument.ci_version)
    .bind(uuid_utils::to_db(&instrument.guid))
    .bind(instrument.published_at)
    .execute(conn)
    .await?;

    Ok(existing.is_none())
}

/// Remove a row; false when there was nothing to remove
pub async fn delete_by_form_type(conn: &mut SqliteConnection, exercise_id: &Uuid, form_type: &str) -> ApiResult<bool> {
    let result = sqlx::query(
        "DELETE FROM registry_instrument WHERE exercise_id = ? AND classifier_type = ? AND classifier_value = ?",
    )
    .bind(uuid_utils::to_db(exercise_id))
    .bind(FORM_TYPE)
    .bind(form_type)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Count from the per-exercise summary view, zero when it has no row
pub async fn count_by_exercise(conn: &mut SqliteConnection, exercise_id: &Uuid) -> ApiResult<i64> {
    let count: Option<i64> = sqlx::query_scalar(
        "SELECT registry_instrument_count FROM registry_instrument_count WHERE exercise_id = ?",
    )
    .bind(uuid_utils::to_db(exercise_id))
    .fetch_optional(conn)
    .await?;
    Ok(count.unwrap_or(0))
}
