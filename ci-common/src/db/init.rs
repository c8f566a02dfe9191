//! Database initialization
//!
//! Opens the pool and creates the schema if needed. Every statement is
//! idempotent so startup can run it against an existing database.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Pool sizing taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Connections kept open
    pub size: u32,
    /// Extra connections allowed under load
    pub max_overflow: u32,
    /// How long a writer waits for the write lock before failing
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 5,
            max_overflow: 10,
            busy_timeout: Duration::from_secs(30),
        }
    }
}

/// Open the database and create tables if needed
pub async fn init_database(database_uri: &str, settings: PoolSettings) -> Result<SqlitePool> {
    // Foreign keys and busy timeout are per connection, so they go on the
    // connect options rather than a one-off PRAGMA against the pool.
    let options = SqliteConnectOptions::from_str(database_uri)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(settings.busy_timeout);

    let max_connections = (settings.size + settings.max_overflow).max(1);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(settings.size.min(max_connections))
        .connect_with(options)
        .await?;

    info!(
        max_connections,
        min_connections = settings.size,
        busy_timeout_secs = settings.busy_timeout.as_secs(),
        "Opened database"
    );

    create_schema(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory database holding the full schema
///
/// A single connection is used because every new in-memory connection would
/// otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create every table, index and view
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_survey_table(pool).await?;
    create_exercise_table(pool).await?;
    create_business_table(pool).await?;
    create_instrument_table(pool).await?;
    create_seft_instrument_table(pool).await?;
    create_instrument_exercise_table(pool).await?;
    create_instrument_business_table(pool).await?;
    create_registry_instrument_table(pool).await?;
    create_registry_instrument_count_view(pool).await?;
    Ok(())
}

async fn create_survey_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS survey (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            survey_id TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_exercise_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exercise (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exercise_id TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_business_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS business (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ru_ref TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_instrument_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instrument (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrument_id TEXT NOT NULL UNIQUE,
            type TEXT NOT NULL CHECK (type IN ('SEFT', 'EQ')),
            classifiers TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            survey_id INTEGER NOT NULL REFERENCES survey(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_instrument_created_at ON instrument(created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_instrument_survey ON instrument(survey_id)")
        .execute(pool)
        .await?;

    // Final word on identical EQ classifier sets within a survey. Classifier
    // text is canonical so equal maps always produce equal text.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_instrument_eq_classifiers
            ON instrument(survey_id, classifiers)
            WHERE type = 'EQ' AND classifiers <> '{}'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_seft_instrument_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seft_instrument (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrument_id TEXT NOT NULL UNIQUE REFERENCES instrument(instrument_id),
            file_name TEXT NOT NULL CHECK (length(file_name) <= 32),
            length INTEGER NOT NULL CHECK (length >= 0),
            data BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_instrument_exercise_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instrument_exercise (
            instrument_id INTEGER NOT NULL REFERENCES instrument(id),
            exercise_id INTEGER NOT NULL REFERENCES exercise(id),
            PRIMARY KEY (instrument_id, exercise_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_instrument_exercise_exercise ON instrument_exercise(exercise_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_instrument_business_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instrument_business (
            instrument_id INTEGER NOT NULL REFERENCES instrument(id),
            business_id INTEGER NOT NULL REFERENCES business(id),
            PRIMARY KEY (instrument_id, business_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_instrument_business_business ON instrument_business(business_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_registry_instrument_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registry_instrument (
            exercise_id TEXT NOT NULL,
            classifier_type TEXT NOT NULL,
            classifier_value TEXT NOT NULL,
            survey_id TEXT NOT NULL,
            instrument_id TEXT NOT NULL,
            ci_version INTEGER NOT NULL,
            guid TEXT NOT NULL,
            published_at TEXT NOT NULL,
            PRIMARY KEY (exercise_id, classifier_type, classifier_value)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_registry_instrument_count_view(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS registry_instrument_count AS
            SELECT exercise_id, COUNT(*) AS registry_instrument_count
            FROM registry_instrument
            GROUP BY exercise_id
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
