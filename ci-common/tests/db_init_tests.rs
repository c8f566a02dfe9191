//! Database initialization tests
//!
//! Schema creation must be idempotent and must carry the constraints the
//! catalog relies on for its final enforcement.

use ci_common::db::init::{init_database, init_memory_database, PoolSettings};
use sqlx::SqlitePool;

fn db_uri(dir: &tempfile::TempDir, name: &str) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join(name).display())
}

async fn insert_survey(pool: &SqlitePool, survey_id: &str) -> i64 {
    sqlx::query("INSERT INTO survey (survey_id) VALUES (?)")
        .bind(survey_id)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn insert_instrument(
    pool: &SqlitePool,
    instrument_id: &str,
    kind: &str,
    classifiers: &str,
    survey: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO instrument (instrument_id, type, classifiers, created_at, survey_id) VALUES (?, ?, ?, '2024-01-01 00:00:00', ?)",
    )
    .bind(instrument_id)
    .bind(kind)
    .bind(classifiers)
    .bind(survey)
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ci.db");
    assert!(!path.exists());

    let pool = init_database(&db_uri(&dir, "ci.db"), PoolSettings::default()).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let uri = db_uri(&dir, "ci.db");

    let first = init_database(&uri, PoolSettings::default()).await.unwrap();
    insert_survey(&first, "3ff59b737f15406f9e4d7f00b41e85ce").await;
    first.close().await;

    let second = init_database(&uri, PoolSettings::default()).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM survey")
        .fetch_one(&second)
        .await
        .unwrap();
    assert_eq!(count, 1, "Existing rows must survive a second bootstrap");
}

#[tokio::test]
async fn test_all_tables_and_view_exist() {
    let pool = init_memory_database().await.unwrap();

    for name in [
        "survey",
        "exercise",
        "business",
        "instrument",
        "seft_instrument",
        "instrument_exercise",
        "instrument_business",
        "registry_instrument",
        "registry_instrument_count",
    ] {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = ?")
            .bind(name)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(found, 1, "{} missing from schema", name);
    }
}

#[tokio::test]
async fn test_identical_eq_classifiers_rejected_by_index() {
    let pool = init_memory_database().await.unwrap();
    let survey = insert_survey(&pool, "s1").await;
    let other_survey = insert_survey(&pool, "s2").await;
    let classifiers = r#"{"eq_id":"rsi","form_type":"0255"}"#;

    insert_instrument(&pool, "a", "EQ", classifiers, survey).await.unwrap();
    let err = insert_instrument(&pool, "b", "EQ", classifiers, survey).await.unwrap_err();
    assert!(err.as_database_error().map(|e| e.is_unique_violation()).unwrap_or(false));

    // Other surveys, SEFT rows and empty maps are not constrained
    insert_instrument(&pool, "c", "EQ", classifiers, other_survey).await.unwrap();
    insert_instrument(&pool, "d", "SEFT", classifiers, survey).await.unwrap();
    insert_instrument(&pool, "e", "EQ", "{}", survey).await.unwrap();
    insert_instrument(&pool, "f", "EQ", "{}", survey).await.unwrap();
}

#[tokio::test]
async fn test_instrument_type_is_constrained() {
    let pool = init_memory_database().await.unwrap();
    let survey = insert_survey(&pool, "s1").await;
    assert!(insert_instrument(&pool, "a", "PDF", "{}", survey).await.is_err());
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let pool = init_memory_database().await.unwrap();
    assert!(insert_instrument(&pool, "a", "EQ", "{}", 999).await.is_err());
}

#[tokio::test]
async fn test_registry_count_view_groups_by_exercise() {
    let pool = init_memory_database().await.unwrap();

    for (exercise, value) in [("e1", "0001"), ("e1", "0002"), ("e2", "0001")] {
        sqlx::query(
            "INSERT INTO registry_instrument VALUES (?, 'form_type', ?, 's', 'i', 1, 'g', '2024-01-01 00:00:00')",
        )
        .bind(exercise)
        .bind(value)
        .execute(&pool)
        .await
        .unwrap();
    }

    let count: i64 = sqlx::query_scalar(
        "SELECT registry_instrument_count FROM registry_instrument_count WHERE exercise_id = 'e1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 2);

    let duplicate = sqlx::query(
        "INSERT INTO registry_instrument VALUES ('e1', 'form_type', '0001', 's', 'i', 2, 'g', '2024-01-01 00:00:00')",
    )
    .execute(&pool)
    .await;
    assert!(duplicate.is_err());
}
