mod configs;
mod ledger;


use relay_core::{CoreError, DatabaseError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub use configs::normalize_subreddit_name;

const MAX_CONNECTIONS: u32 = 5;

/// SQLite-backed store for source configs and the delivery ledger.
///
/// Construct with [`Database::new`], then call [`Database::connect`] and
/// [`Database::run_migrations`] before use, or do all three with
/// [`Database::open`].
pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    pub async fn open(connection_string: String) -> Result<Self, CoreError> {
        let mut db = Self::new(connection_string);
        db.connect().await?;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(self.pool()?)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }

    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool.as_ref().ok_or_else(|| {
            CoreError::Database(DatabaseError::ConnectionFailed {
                reason: "database is not connected".to_string(),
            })
        })
    }
}

/// Lifts a driver error into the store's error type, singling out lock
/// contention so callers can retry it.
pub(crate) fn query_error(error: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_error) = &error {
        let message = db_error.message();
        if message.contains("database is locked") || message.contains("database is busy") {
            return CoreError::Database(DatabaseError::DatabaseLocked);
        }
    }
    CoreError::Database(DatabaseError::Sql(error))
}
