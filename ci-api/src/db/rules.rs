//! Uniqueness rules checked inside the upload and link transactions
//!
//! - one SEFT instrument per reporting unit per collection exercise
//! - no two EQ instruments in a survey with identical classifiers
//! - a form type belongs to one collection mode within a survey
//!
//! The checks run inside a write session, which holds the database write lock
//! from its first statement. A racing second request waits for the first to
//! commit, then sees its rows and gets the same domain error a sequential
//! request would.

use ci_common::db::InstrumentType;
use ci_common::{classifiers::FORM_TYPE, Classifiers};
use sqlx::SqliteConnection;

use crate::error::{ApiError, ApiResult};

/// Fail if a SEFT instrument already binds this exercise and business
pub async fn check_seft_for_ru(
    conn: &mut SqliteConnection,
    exercise: i64,
    business: i64,
    ru_ref: &str,
) -> ApiResult<()> {
    let existing: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT i.id
        FROM instrument i
        JOIN instrument_exercise ie ON ie.instrument_id = i.id
        JOIN instrument_business ib ON ib.instrument_id = i.id
        WHERE i.type = 'SEFT' AND ie.exercise_id = ? AND ib.business_id = ?
        LIMIT 1
        "#,
    )
    .bind(exercise)
    .bind(business)
    .fetch_optional(conn)
    .await?;

    match existing {
        Some(_) => Err(ApiError::DuplicateSeftForRu(ru_ref.to_string())),
        None => Ok(()),
    }
}

/// Fail if linking `instrument` to `exercise` would give one of its
/// reporting units a second SEFT instrument in that exercise
pub async fn check_link_keeps_ru_unique(
    conn: &mut SqliteConnection,
    instrument: i64,
    exercise: i64,
) -> ApiResult<()> {
    let clash: Option<String> = sqlx::query_scalar(
        r#"
        SELECT b.ru_ref
        FROM instrument_business mine
        JOIN business b ON b.id = mine.business_id
        JOIN instrument_business theirs
            ON theirs.business_id = mine.business_id AND theirs.instrument_id <> mine.instrument_id
        JOIN instrument other ON other.id = theirs.instrument_id AND other.type = 'SEFT'
        JOIN instrument_exercise ie ON ie.instrument_id = other.id AND ie.exercise_id = ?
        JOIN instrument cur ON cur.id = mine.instrument_id AND cur.type = 'SEFT'
        WHERE mine.instrument_id = ?
        LIMIT 1
        "#,
    )
    .bind(exercise)
    .bind(instrument)
    .fetch_optional(conn)
    .await?;

    match clash {
        Some(ru_ref) => Err(ApiError::DuplicateSeftForRu(ru_ref)),
        None => Ok(()),
    }
}

/// Fail if an EQ instrument in the survey has exactly these classifiers
///
/// Empty classifier maps are not constrained.
pub async fn check_classifier_set(
    conn: &mut SqliteConnection,
    survey: i64,
    classifiers: &Classifiers,
) -> ApiResult<()> {
    if classifiers.is_empty() {
        return Ok(());
    }

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM instrument WHERE survey_id = ? AND type = 'EQ' AND classifiers = ? LIMIT 1",
    )
    .bind(survey)
    .bind(classifiers.to_db())
    .fetch_optional(conn)
    .await?;

    match existing {
        Some(_) => Err(ApiError::DuplicateClassifierSet),
        None => Ok(()),
    }
}

/// Fail if an instrument of the other type in the survey has the same
/// `form_type`
pub async fn check_form_type_mode(
    conn: &mut SqliteConnection,
    survey: i64,
    classifiers: &Classifiers,
    instrument_type: InstrumentType,
) -> ApiResult<()> {
    let Some(form_type) = classifiers.form_type() else {
        return Ok(());
    };

    let existing: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT i.id
        FROM instrument i
        WHERE i.survey_id = ? AND i.type <> ?
          AND EXISTS (SELECT 1 FROM json_each(i.classifiers) je WHERE je.key = ? AND je.value = ?)
        LIMIT 1
        "#,
    )
    .bind(survey)
    .bind(instrument_type.as_str())
    .bind(FORM_TYPE)
    .bind(form_type)
    .fetch_optional(conn)
    .await?;

    match existing {
        Some(_) => Err(ApiError::FormTypeModeConflict(form_type.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{self, NewInstrument};
    use ci_common::db::init_memory_database;
    use uuid::Uuid;

    struct Fixture {
        conn: sqlx::pool::PoolConnection<sqlx::Sqlite>,
        survey: i64,
    }

    async fn fixture() -> Fixture {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let survey = catalog::ensure_survey(&mut conn, &Uuid::new_v4()).await.unwrap();
        Fixture { conn, survey }
    }

    async fn add(f: &mut Fixture, kind: InstrumentType, classifiers: &str) -> i64 {
        let classifiers = Classifiers::from_json_str(classifiers).unwrap();
        catalog::insert_instrument(
            &mut f.conn,
            &NewInstrument {
                instrument_id: Uuid::new_v4(),
                instrument_type: kind,
                classifiers: &classifiers,
                survey: f.survey,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_seft_for_ru() {
        let mut f = fixture().await;
        let exercise = catalog::ensure_exercise(&mut f.conn, &Uuid::new_v4()).await.unwrap();
        let other_exercise = catalog::ensure_exercise(&mut f.conn, &Uuid::new_v4()).await.unwrap();
        let business = catalog::ensure_business(&mut f.conn, "12345678901").await.unwrap();

        check_seft_for_ru(&mut f.conn, exercise, business, "12345678901").await.unwrap();

        let pk = add(&mut f, InstrumentType::Seft, "{}").await;
        catalog::link_exercise(&mut f.conn, pk, exercise).await.unwrap();
        catalog::link_business(&mut f.conn, pk, business).await.unwrap();

        let err = check_seft_for_ru(&mut f.conn, exercise, business, "12345678901")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Reporting unit 12345678901 already has an instrument uploaded for this collection exercise"
        );
        check_seft_for_ru(&mut f.conn, other_exercise, business, "12345678901")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_link_keeps_ru_unique() {
        let mut f = fixture().await;
        let first_exercise = catalog::ensure_exercise(&mut f.conn, &Uuid::new_v4()).await.unwrap();
        let second_exercise = catalog::ensure_exercise(&mut f.conn, &Uuid::new_v4()).await.unwrap();
        let business = catalog::ensure_business(&mut f.conn, "12345678901").await.unwrap();

        let a = add(&mut f, InstrumentType::Seft, "{}").await;
        catalog::link_exercise(&mut f.conn, a, first_exercise).await.unwrap();
        catalog::link_business(&mut f.conn, a, business).await.unwrap();

        let b = add(&mut f, InstrumentType::Seft, "{}").await;
        catalog::link_exercise(&mut f.conn, b, second_exercise).await.unwrap();
        catalog::link_business(&mut f.conn, b, business).await.unwrap();

        assert!(matches!(
            check_link_keeps_ru_unique(&mut f.conn, b, first_exercise).await,
            Err(ApiError::DuplicateSeftForRu(_))
        ));
        // Re-linking an instrument to its own exercise is fine
        check_link_keeps_ru_unique(&mut f.conn, a, first_exercise).await.unwrap();
    }

    #[tokio::test]
    async fn test_classifier_set() {
        let mut f = fixture().await;
        add(&mut f, InstrumentType::Eq, r#"{"form_type": "0255", "eq_id": "rsi"}"#).await;

        let same = Classifiers::from_json_str(r#"{"EQ_ID": "rsi", "form_type": "0255"}"#).unwrap();
        assert!(matches!(
            check_classifier_set(&mut f.conn, f.survey, &same).await,
            Err(ApiError::DuplicateClassifierSet)
        ));

        let different = Classifiers::from_json_str(r#"{"form_type": "0266", "eq_id": "rsi"}"#).unwrap();
        check_classifier_set(&mut f.conn, f.survey, &different).await.unwrap();
        check_classifier_set(&mut f.conn, f.survey, &Classifiers::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_form_type_mode() {
        let mut f = fixture().await;
        add(&mut f, InstrumentType::Seft, r#"{"form_type": "0001"}"#).await;

        let classifiers = Classifiers::from_json_str(r#"{"form_type": "0001", "eq_id": "x"}"#).unwrap();
        assert!(matches!(
            check_form_type_mode(&mut f.conn, f.survey, &classifiers, InstrumentType::Eq).await,
            Err(ApiError::FormTypeModeConflict(ref ft)) if ft == "0001"
        ));
        // Same mode is not a conflict
        check_form_type_mode(&mut f.conn, f.survey, &classifiers, InstrumentType::Seft)
            .await
            .unwrap();
        // No form type, nothing to check
        check_form_type_mode(&mut f.conn, f.survey, &Classifiers::new(), InstrumentType::Eq)
            .await
            .unwrap();
    }
}
