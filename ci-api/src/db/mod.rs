//! Persistence for the collection instrument service
//!
//! Handlers work through a [`Session`]: a transaction checked out of the pool
//! for the lifetime of one request. A session is committed explicitly; on
//! every other exit path (error, early return, cancelled request) dropping it
//! rolls the transaction back and returns the connection to the pool.
//!
//! Write sessions take the SQLite write lock when they begin. Writers queue
//! on the busy timeout and each one reads the state its predecessor
//! committed, so a uniqueness check never runs against a stale snapshot.
//! Read sessions begin deferred and never block writers under WAL.

pub mod catalog;
pub mod registry;
pub mod rules;
pub mod search;

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use crate::error::ApiResult;

/// Transactional store over the connection pool
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction that holds the write lock from its first statement
    pub async fn session(&self) -> ApiResult<Session> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        debug!("Acquired write session");
        Ok(Session { tx })
    }

    /// Open a transaction for queries only
    pub async fn read_session(&self) -> ApiResult<Session> {
        let tx = self.pool.begin().await?;
        debug!("Acquired read session");
        Ok(Session { tx })
    }
}

/// One request's unit of work
pub struct Session {
    tx: Transaction<'static, Sqlite>,
}

impl Session {
    /// Connection to run queries on inside the transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit and release the connection
    pub async fn commit(self) -> ApiResult<()> {
        self.tx.commit().await?;
        debug!("Committed database session");
        Ok(())
    }

    /// Roll back and release the connection
    pub async fn rollback(self) -> ApiResult<()> {
        self.tx.rollback().await?;
        debug!("Rolled back database session");
        Ok(())
    }
}
