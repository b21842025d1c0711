//! SQLite persistence for accounts, sessions, the destination catalog and
//! trip plans.
//!
//! A single connection sits behind a mutex; every query runs on the
//! blocking thread pool through [`Store::call`].

mod destinations;
mod schema;
mod sessions;
mod trips;
mod users;

use std::sync::{Arc, Mutex};

use rusqlite::{
    Connection, ErrorCode,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};

use crate::{
    TravelError,
    models::{BudgetTier, ParticipantRole, patch::split_tags},
};

pub use schema::{SCHEMA_VERSION, initialise_schema};
pub use sessions::Session;
pub use trips::TripPlanListing;

pub type Result<T> = std::result::Result<T, TravelError>;

/// Cloneable handle to the application database
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the database at `path`; `:memory:` gives a
    /// private in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let connection = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut connection: Connection) -> Result<Self> {
        initialise_schema(&mut connection)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(connection)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| TravelError::storage("database connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| TravelError::general(format!("database task failed: {e}")))?
    }

    /// Liveness check used by the health endpoint
    pub async fn ping(&self) -> Result<()> {
        self.call(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

/// Maps UNIQUE violations to a conflict with the given message
fn conflict_on_unique(err: rusqlite::Error, message: &str) -> TravelError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            TravelError::conflict(message)
        }
        _ => err.into(),
    }
}

/// Comma-joined for storage; a tag holding a comma is stored as several tags
fn join_tags(tags: &[String]) -> Option<String> {
    let tags: Vec<String> = tags.iter().flat_map(|t| split_tags(t)).collect();
    (!tags.is_empty()).then(|| tags.join(","))
}

impl ToSql for BudgetTier {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BudgetTier {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: TravelError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for ParticipantRole {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ParticipantRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: TravelError| FromSqlError::Other(Box::new(e)))
    }
}
