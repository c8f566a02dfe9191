//! Instrument catalog queries
//!
//! Surveys, exercises and businesses are created lazily the first time an
//! instrument references them. All functions run on the caller's session
//! connection so they take part in its transaction.

use chrono::NaiveDateTime;
use ci_common::db::{Instrument, InstrumentType, SeftBlob};
use ci_common::{time, uuid_utils, Classifiers};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{is_unique_violation, ApiError, ApiResult};

/// Columns selected whenever an [`Instrument`] is read
pub(crate) const INSTRUMENT_COLUMNS: &str =
    "i.id, i.instrument_id, i.type, i.classifiers, i.created_at, s.survey_id AS survey_uuid";

pub(crate) fn instrument_from_row(row: &SqliteRow) -> ApiResult<Instrument> {
    let instrument_id: String = row.try_get("instrument_id")?;
    let kind: String = row.try_get("type")?;
    let classifiers: String = row.try_get("classifiers")?;
    let survey_id: String = row.try_get("survey_uuid")?;

    Ok(Instrument {
        id: row.try_get("id")?,
        instrument_id: uuid_utils::from_db(&instrument_id)?,
        instrument_type: kind.parse()?,
        classifiers: Classifiers::from_db(&classifiers)?,
        created_at: row.try_get("created_at")?,
        survey_id: uuid_utils::from_db(&survey_id)?,
    })
}

/// Surrogate key of a survey, creating the row if needed
pub async fn ensure_survey(conn: &mut SqliteConnection, survey_id: &Uuid) -> ApiResult<i64> {
    let key = uuid_utils::to_db(survey_id);
    sqlx::query("INSERT OR IGNORE INTO survey (survey_id) VALUES (?)")
        .bind(&key)
        .execute(&mut *conn)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM survey WHERE survey_id = ?")
        .bind(&key)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

/// Surrogate key of an exercise, creating the row if needed
pub async fn ensure_exercise(conn: &mut SqliteConnection, exercise_id: &Uuid) -> ApiResult<i64> {
    let key = uuid_utils::to_db(exercise_id);
    sqlx::query("INSERT OR IGNORE INTO exercise (exercise_id) VALUES (?)")
        .bind(&key)
        .execute(&mut *conn)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM exercise WHERE exercise_id = ?")
        .bind(&key)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

pub async fn find_exercise(conn: &mut SqliteConnection, exercise_id: &Uuid) -> ApiResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM exercise WHERE exercise_id = ?")
        .bind(uuid_utils::to_db(exercise_id))
        .fetch_optional(conn)
        .await?;
    Ok(id)
}

/// Surrogate key of a business, creating the row if needed
pub async fn ensure_business(conn: &mut SqliteConnection, ru_ref: &str) -> ApiResult<i64> {
    sqlx::query("INSERT OR IGNORE INTO business (ru_ref) VALUES (?)")
        .bind(ru_ref)
        .execute(&mut *conn)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM business WHERE ru_ref = ?")
        .bind(ru_ref)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

/// Instrument about to be inserted
#[derive(Debug)]
pub struct NewInstrument<'a> {
    pub instrument_id: Uuid,
    pub instrument_type: InstrumentType,
    pub classifiers: &'a Classifiers,
    pub survey: i64,
}

/// Insert an instrument row, returning its surrogate key
///
/// The unique index on EQ classifier sets is the final word when two uploads
/// race past the pre-insert check; that failure surfaces as the same error.
pub async fn insert_instrument(conn: &mut SqliteConnection, new: &NewInstrument<'_>) -> ApiResult<i64> {
    let result = sqlx::query(
        "INSERT INTO instrument (instrument_id, type, classifiers, created_at, survey_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid_utils::to_db(&new.instrument_id))
    .bind(new.instrument_type.as_str())
    .bind(new.classifiers.to_db())
    .bind(time::now())
    .bind(new.survey)
    .execute(conn)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) && new.instrument_type == InstrumentType::Eq => {
            Err(ApiError::DuplicateClassifierSet)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn insert_seft_blob(conn: &mut SqliteConnection, blob: &SeftBlob) -> ApiResult<()> {
    sqlx::query("INSERT INTO seft_instrument (instrument_id, file_name, length, data) VALUES (?, ?, ?, ?)")
        .bind(uuid_utils::to_db(&blob.instrument_id))
        .bind(&blob.file_name)
        .bind(blob.length)
        .bind(&blob.data)
        .execute(conn)
        .await?;
    Ok(())
}

/// Replace the stored spreadsheet, returning false when there is none
pub async fn update_seft_blob(conn: &mut SqliteConnection, blob: &SeftBlob) -> ApiResult<bool> {
    let result = sqlx::query("UPDATE seft_instrument SET file_name = ?, length = ?, data = ? WHERE instrument_id = ?")
        .bind(&blob.file_name)
        .bind(blob.length)
        .bind(&blob.data)
        .bind(uuid_utils::to_db(&blob.instrument_id))
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_seft_blob(conn: &mut SqliteConnection, instrument_id: &Uuid) -> ApiResult<Option<SeftBlob>> {
    let row = sqlx::query("SELECT file_name, length, data FROM seft_instrument WHERE instrument_id = ?")
        .bind(uuid_utils::to_db(instrument_id))
        .fetch_optional(conn)
        .await?;

    row.map(|row| -> ApiResult<SeftBlob> {
        Ok(SeftBlob {
            instrument_id: *instrument_id,
            file_name: row.try_get("file_name")?,
            length: row.try_get("length")?,
            data: row.try_get("data")?,
        })
    })
    .transpose()
}

/// Stored plaintext length of a SEFT instrument
pub async fn find_seft_length(conn: &mut SqliteConnection, instrument_id: &Uuid) -> ApiResult<Option<i64>> {
    let length = sqlx::query_scalar("SELECT length FROM seft_instrument WHERE instrument_id = ?")
        .bind(uuid_utils::to_db(instrument_id))
        .fetch_optional(conn)
        .await?;
    Ok(length)
}

pub async fn find_instrument(conn: &mut SqliteConnection, instrument_id: &Uuid) -> ApiResult<Option<Instrument>> {
    let sql = format!(
        "SELECT {} FROM instrument i JOIN survey s ON s.id = i.survey_id WHERE i.instrument_id = ?",
        INSTRUMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(uuid_utils::to_db(instrument_id))
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(instrument_from_row).transpose()
}

/// Associate an instrument with an exercise; linking twice is a no-op
pub async fn link_exercise(conn: &mut SqliteConnection, instrument: i64, exercise: i64) -> ApiResult<()> {
    sqlx::query("INSERT OR IGNORE INTO instrument_exercise (instrument_id, exercise_id) VALUES (?, ?)")
        .bind(instrument)
        .bind(exercise)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn link_business(conn: &mut SqliteConnection, instrument: i64, business: i64) -> ApiResult<()> {
    sqlx::query("INSERT OR IGNORE INTO instrument_business (instrument_id, business_id) VALUES (?, ?)")
        .bind(instrument)
        .bind(business)
        .execute(conn)
        .await?;
    Ok(())
}

/// Remove the exercise association and every business association
pub async fn unlink_exercise(conn: &mut SqliteConnection, instrument: i64, exercise: i64) -> ApiResult<()> {
    sqlx::query("DELETE FROM instrument_exercise WHERE instrument_id = ? AND exercise_id = ?")
        .bind(instrument)
        .bind(exercise)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM instrument_business WHERE instrument_id = ?")
        .bind(instrument)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Ids of every instrument currently linked to an exercise
pub async fn linked_instrument_ids(conn: &mut SqliteConnection, exercise: i64) -> ApiResult<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT i.instrument_id FROM instrument i JOIN instrument_exercise ie ON ie.instrument_id = i.id WHERE ie.exercise_id = ? ORDER BY i.id",
    )
    .bind(exercise)
    .fetch_all(conn)
    .await?;
    ids.iter()
        .map(|id| uuid_utils::from_db(id).map_err(ApiError::from))
        .collect()
}

/// Rendered view of an instrument and its associations
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentView {
    pub instrument_id: Uuid,
    #[serde(rename = "filename")]
    pub file_name: Option<String>,
    pub length: Option<i64>,
    pub created_at: String,
    pub survey_id: Uuid,
    pub ru_refs: Vec<String>,
    pub exercise_ids: Vec<Uuid>,
    pub classifiers: Classifiers,
    #[serde(rename = "type")]
    pub instrument_type: InstrumentType,
}

/// Build the JSON view from the current entity graph
pub async fn instrument_view(conn: &mut SqliteConnection, instrument: &Instrument) -> ApiResult<InstrumentView> {
    let blob: Option<(String, i64)> =
        sqlx::query_as("SELECT file_name, length FROM seft_instrument WHERE instrument_id = ?")
            .bind(uuid_utils::to_db(&instrument.instrument_id))
            .fetch_optional(&mut *conn)
            .await?;

    let ru_refs: Vec<String> = sqlx::query_scalar(
        "SELECT b.ru_ref FROM business b JOIN instrument_business ib ON ib.business_id = b.id WHERE ib.instrument_id = ? ORDER BY b.ru_ref",
    )
    .bind(instrument.id)
    .fetch_all(&mut *conn)
    .await?;

    let exercise_ids: Vec<String> = sqlx::query_scalar(
        "SELECT e.exercise_id FROM exercise e JOIN instrument_exercise ie ON ie.exercise_id = e.id WHERE ie.instrument_id = ? ORDER BY e.id",
    )
    .bind(instrument.id)
    .fetch_all(&mut *conn)
    .await?;
    let exercise_ids = exercise_ids
        .iter()
        .map(|id| uuid_utils::from_db(id))
        .collect::<ci_common::Result<Vec<_>>>()?;

    let (file_name, length) = match blob {
        Some((name, length)) => (Some(name), Some(length)),
        None => (instrument.classifiers.form_type().map(str::to_string), None),
    };

    Ok(InstrumentView {
        instrument_id: instrument.instrument_id,
        file_name,
        length,
        created_at: time::to_iso8601(&instrument.created_at),
        survey_id: instrument.survey_id,
        ru_refs,
        exercise_ids,
        classifiers: instrument.classifiers.clone(),
        instrument_type: instrument.instrument_type,
    })
}

/// One line of the per-exercise CSV export
#[derive(Debug, Clone)]
pub struct CsvLine {
    pub file_name: Option<String>,
    pub length: Option<i64>,
    pub created_at: NaiveDateTime,
}

pub async fn csv_lines_for_exercise(conn: &mut SqliteConnection, exercise: i64) -> ApiResult<Vec<CsvLine>> {
    let rows = sqlx::query(
        r#"
        SELECT i.classifiers, i.created_at, si.file_name, si.length
        FROM instrument i
        JOIN instrument_exercise ie ON ie.instrument_id = i.id
        LEFT JOIN seft_instrument si ON si.instrument_id = i.instrument_id
        WHERE ie.exercise_id = ?
        ORDER BY i.id
        "#,
    )
    .bind(exercise)
    .fetch_all(conn)
    .await?;

    rows.iter()
        .map(|row| -> ApiResult<CsvLine> {
            let file_name: Option<String> = row.try_get("file_name")?;
            let file_name = match file_name {
                Some(name) => Some(name),
                None => {
                    let classifiers: String = row.try_get("classifiers")?;
                    Classifiers::from_db(&classifiers)?.form_type().map(str::to_string)
                }
            };
            Ok(CsvLine {
                file_name,
                length: row.try_get("length")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
