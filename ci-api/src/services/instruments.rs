//! Instrument pipeline
//!
//! Every write runs in one session: uniqueness checks, inserts and the link
//! notification all happen before the commit, so any failure leaves the
//! catalog untouched. Broker events are published only after the commit.

use ci_common::db::{InstrumentType, SeftBlob};
use ci_common::{files, Classifiers};
use tracing::{error, info};
use uuid::Uuid;

use super::UploadedFile;
use crate::db::catalog::{self, CsvLine, InstrumentView, NewInstrument};
use crate::db::{rules, search, Session};
use crate::error::{ApiError, ApiResult};
use crate::publisher::InstrumentEvent;
use crate::AppState;

pub const UPLOAD_SUCCESSFUL: &str = "The upload was successful";
pub const INSTRUMENT_NOT_FOUND: &str = "Collection instrument not found";
pub const EXERCISE_NOT_FOUND: &str = "Collection exercise not found";

fn parse_classifiers(raw: Option<&str>) -> ApiResult<Classifiers> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Ok(Classifiers::from_json_str(raw)?),
        None => Ok(Classifiers::new()),
    }
}

fn require_content(file: &UploadedFile) -> ApiResult<()> {
    if file.file_name.trim().is_empty() {
        return Err(ApiError::Validation("Missing filename".to_string()));
    }
    if file.data.is_empty() {
        return Err(ApiError::Validation("File is empty".to_string()));
    }
    Ok(())
}

async fn require_instrument(session: &mut Session, instrument_id: &Uuid) -> ApiResult<ci_common::db::Instrument> {
    catalog::find_instrument(session.conn(), instrument_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(INSTRUMENT_NOT_FOUND.to_string()))
}

/// Store a SEFT instrument for an exercise, optionally bound to a reporting unit
pub async fn upload_seft(
    state: &AppState,
    exercise_id: &Uuid,
    ru_ref: Option<&str>,
    file: UploadedFile,
    classifiers: Option<&str>,
) -> ApiResult<Uuid> {
    require_content(&file)?;
    let classifiers = parse_classifiers(classifiers)?;
    let ru_ref = ru_ref.map(str::trim).filter(|r| !r.is_empty());

    // Resolve the survey before taking a connection out of the pool
    let survey_id = state.clients.exercise_survey_id(exercise_id).await?;

    let length = file.data.len() as i64;
    let data = state.cipher.encrypt(&file.data)?;
    let instrument_id = ci_common::uuid_utils::generate();

    let mut session = state.store.session().await?;
    let conn = session.conn();

    let survey = catalog::ensure_survey(conn, &survey_id).await?;
    let exercise = catalog::ensure_exercise(conn, exercise_id).await?;
    let business = match ru_ref {
        Some(ru_ref) => {
            let business = catalog::ensure_business(conn, ru_ref).await?;
            rules::check_seft_for_ru(conn, exercise, business, ru_ref).await?;
            Some(business)
        }
        None => None,
    };
    rules::check_form_type_mode(conn, survey, &classifiers, InstrumentType::Seft).await?;

    let pk = catalog::insert_instrument(
        conn,
        &NewInstrument {
            instrument_id,
            instrument_type: InstrumentType::Seft,
            classifiers: &classifiers,
            survey,
        },
    )
    .await?;
    catalog::insert_seft_blob(
        conn,
        &SeftBlob {
            instrument_id,
            file_name: files::truncate_file_name(&file.file_name),
            length,
            data,
        },
    )
    .await?;
    catalog::link_exercise(conn, pk, exercise).await?;
    if let Some(business) = business {
        catalog::link_business(conn, pk, business).await?;
    }

    session.commit().await?;
    info!(
        instrument_id = %instrument_id,
        exercise_id = %exercise_id,
        ru_ref = ?ru_ref,
        length,
        "Uploaded SEFT instrument"
    );
    Ok(instrument_id)
}

/// Store an EQ instrument for a survey
pub async fn upload_eq(state: &AppState, survey_id: &Uuid, classifiers: Option<&str>) -> ApiResult<Uuid> {
    let classifiers = parse_classifiers(classifiers)?;
    let instrument_id = ci_common::uuid_utils::generate();

    let mut session = state.store.session().await?;
    let conn = session.conn();

    let survey = catalog::ensure_survey(conn, survey_id).await?;
    rules::check_classifier_set(conn, survey, &classifiers).await?;
    rules::check_form_type_mode(conn, survey, &classifiers, InstrumentType::Eq).await?;
    catalog::insert_instrument(
        conn,
        &NewInstrument {
            instrument_id,
            instrument_type: InstrumentType::Eq,
            classifiers: &classifiers,
            survey,
        },
    )
    .await?;

    session.commit().await?;
    info!(instrument_id = %instrument_id, survey_id = %survey_id, "Uploaded EQ instrument");
    Ok(instrument_id)
}

/// Add an instrument to an exercise and tell the collection exercise service
pub async fn link(state: &AppState, instrument_id: &Uuid, exercise_id: &Uuid) -> ApiResult<()> {
    let mut session = state.store.session().await?;
    let instrument = require_instrument(&mut session, instrument_id).await?;
    let conn = session.conn();

    let exercise = catalog::ensure_exercise(conn, exercise_id).await?;
    rules::check_link_keeps_ru_unique(conn, instrument.id, exercise).await?;
    catalog::link_exercise(conn, instrument.id, exercise).await?;
    let linked = catalog::linked_instrument_ids(conn, exercise).await?;

    state.clients.collection_instrument_link(exercise_id, &linked).await?;
    session.commit().await?;

    info!(instrument_id = %instrument_id, exercise_id = %exercise_id, "Linked instrument to exercise");
    Ok(())
}

/// Remove an instrument from an exercise along with its reporting units
pub async fn unlink(state: &AppState, instrument_id: &Uuid, exercise_id: &Uuid) -> ApiResult<()> {
    let mut session = state.store.session().await?;
    let instrument = require_instrument(&mut session, instrument_id).await?;
    let conn = session.conn();

    let exercise = catalog::find_exercise(conn, exercise_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(EXERCISE_NOT_FOUND.to_string()))?;
    catalog::unlink_exercise(conn, instrument.id, exercise).await?;
    let linked = catalog::linked_instrument_ids(conn, exercise).await?;

    state.clients.collection_instrument_link(exercise_id, &linked).await?;
    session.commit().await?;
    info!(instrument_id = %instrument_id, exercise_id = %exercise_id, "Unlinked instrument from exercise");

    let event = InstrumentEvent::remove(*exercise_id, *instrument_id);
    let body = serde_json::to_vec(&event)
        .map_err(|e| ApiError::Internal(format!("Event is not serializable: {}", e)))?;
    if let Err(e) = state.instrument_events.publish(&body, None).await {
        error!(
            instrument_id = %instrument_id,
            exercise_id = %exercise_id,
            error = %e,
            "Unlink committed but the remove event was not published"
        );
        return Err(e);
    }
    Ok(())
}

/// Replace the spreadsheet of a SEFT instrument
pub async fn patch_seft(state: &AppState, instrument_id: &Uuid, file: UploadedFile) -> ApiResult<()> {
    require_content(&file)?;

    let mut session = state.store.session().await?;
    let instrument = require_instrument(&mut session, instrument_id).await?;
    if instrument.instrument_type != InstrumentType::Seft {
        return Err(ApiError::WrongInstrumentType(instrument_id.to_string()));
    }

    let blob = SeftBlob {
        instrument_id: *instrument_id,
        file_name: files::truncate_file_name(&file.file_name),
        length: file.data.len() as i64,
        data: state.cipher.encrypt(&file.data)?,
    };
    if !catalog::update_seft_blob(session.conn(), &blob).await? {
        return Err(ApiError::NotFound(INSTRUMENT_NOT_FOUND.to_string()));
    }

    session.commit().await?;
    info!(instrument_id = %instrument_id, length = blob.length, "Replaced SEFT instrument file");
    Ok(())
}

/// Decrypted spreadsheet and its stored file name
pub async fn download(state: &AppState, instrument_id: &Uuid) -> ApiResult<(String, Vec<u8>)> {
    let mut session = state.store.read_session().await?;
    let blob = catalog::find_seft_blob(session.conn(), instrument_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(INSTRUMENT_NOT_FOUND.to_string()))?;
    session.commit().await?;

    let data = state.cipher.decrypt(&blob.data)?;
    Ok((blob.file_name, data))
}

/// CSV listing of the instruments attached to an exercise
pub async fn exercise_csv(state: &AppState, exercise_id: &Uuid) -> ApiResult<String> {
    let mut session = state.store.read_session().await?;
    let exercise = catalog::find_exercise(session.conn(), exercise_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(EXERCISE_NOT_FOUND.to_string()))?;
    let lines = catalog::csv_lines_for_exercise(session.conn(), exercise).await?;
    session.commit().await?;
    Ok(render_csv(&lines))
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub(crate) fn render_csv(lines: &[CsvLine]) -> String {
    let mut out = String::from("\"Count\",\"File Name\",\"Length\",\"Time Stamp\"\n");
    for (index, line) in lines.iter().enumerate() {
        let length = line.length.map(|l| l.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(&(index + 1).to_string()),
            csv_field(line.file_name.as_deref().unwrap_or("")),
            csv_field(&length),
            csv_field(&ci_common::time::to_iso8601(&line.created_at)),
        ));
    }
    out
}

/// Instrument views matching a search string, newest first
pub async fn search(state: &AppState, search_string: Option<&str>, limit: Option<i64>) -> ApiResult<Vec<InstrumentView>> {
    let filter = search::SearchFilter::parse(search_string)?;

    let mut session = state.store.read_session().await?;
    let instruments = search::search(session.conn(), &filter, limit).await?;
    let mut views = Vec::with_capacity(instruments.len());
    for instrument in &instruments {
        views.push(catalog::instrument_view(session.conn(), instrument).await?);
    }
    session.commit().await?;
    Ok(views)
}

pub async fn count(state: &AppState, search_string: Option<&str>) -> ApiResult<i64> {
    let filter = search::SearchFilter::parse(search_string)?;
    let mut session = state.store.read_session().await?;
    let count = search::count(session.conn(), &filter).await?;
    session.commit().await?;
    Ok(count)
}

pub async fn by_id(state: &AppState, instrument_id: &Uuid) -> ApiResult<InstrumentView> {
    let mut session = state.store.read_session().await?;
    let instrument = require_instrument(&mut session, instrument_id).await?;
    let view = catalog::instrument_view(session.conn(), &instrument).await?;
    session.commit().await?;
    Ok(view)
}

/// Plaintext length of a SEFT instrument
pub async fn size(state: &AppState, instrument_id: &Uuid) -> ApiResult<i64> {
    let mut session = state.store.read_session().await?;
    let length = catalog::find_seft_length(session.conn(), instrument_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(INSTRUMENT_NOT_FOUND.to_string()))?;
    session.commit().await?;
    Ok(length)
}
