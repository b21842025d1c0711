use rusqlite::{Connection, OptionalExtension, Transaction};

use crate::TravelError;

pub const SCHEMA_VERSION: i64 = 1;

/// Create every table and index the service needs. Safe to call on an
/// existing database; a database written by a different schema version
/// is rejected.
pub fn initialise_schema(connection: &mut Connection) -> Result<(), TravelError> {
    connection
        .pragma_update(None, "foreign_keys", true)
        .map_err(|e| TravelError::storage(format!("failed to enable foreign keys: {e}")))?;

    let transaction = connection
        .transaction()
        .map_err(|e| migration_error("begin schema transaction", &e))?;

    create_account_tables(&transaction)?;
    create_catalog_tables(&transaction)?;
    create_trip_tables(&transaction)?;
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|e| migration_error("commit schema transaction", &e))
}

fn create_account_tables(transaction: &Transaction<'_>) -> Result<(), TravelError> {
    run_migration_step(
        transaction,
        "create users",
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            preferred_language TEXT NOT NULL DEFAULT 'en',
            home_city TEXT,
            home_country TEXT,
            home_latitude REAL,
            home_longitude REAL,
            currency_code TEXT NOT NULL DEFAULT 'USD',
            created_at TEXT NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create sessions",
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
    )?;
    run_migration_step(
        transaction,
        "index sessions",
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
    )
}

fn create_catalog_tables(transaction: &Transaction<'_>) -> Result<(), TravelError> {
    run_migration_step(
        transaction,
        "create destinations",
        "CREATE TABLE IF NOT EXISTS destinations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL CHECK (length(trim(title)) > 0),
            description TEXT,
            category TEXT,
            budget_tier TEXT,
            latitude REAL,
            longitude REAL,
            website TEXT,
            country TEXT,
            city TEXT,
            average_cost_per_day REAL,
            best_time_to_visit TEXT,
            rating REAL,
            review_count INTEGER NOT NULL DEFAULT 0,
            popularity_score REAL NOT NULL DEFAULT 0,
            tags TEXT,
            estimated_duration_hours REAL,
            created_at TEXT NOT NULL
        )",
    )
}

fn create_trip_tables(transaction: &Transaction<'_>) -> Result<(), TravelError> {
    run_migration_step(
        transaction,
        "create trip_plans",
        "CREATE TABLE IF NOT EXISTS trip_plans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            destination TEXT NOT NULL,
            destination_id INTEGER,
            creator_id INTEGER NOT NULL,
            start_date TEXT,
            end_date TEXT,
            budget TEXT NOT NULL,
            travelers INTEGER NOT NULL DEFAULT 1,
            estimated_total REAL,
            currency TEXT NOT NULL,
            itinerary TEXT,
            max_participants INTEGER NOT NULL DEFAULT 10,
            is_collaborative INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (creator_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (destination_id) REFERENCES destinations(id) ON DELETE SET NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create trip_participants",
        "CREATE TABLE IF NOT EXISTS trip_participants (
            trip_plan_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            role TEXT NOT NULL DEFAULT 'participant',
            joined_at TEXT NOT NULL,
            PRIMARY KEY (trip_plan_id, user_id),
            FOREIGN KEY (trip_plan_id) REFERENCES trip_plans(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create trip_activities",
        "CREATE TABLE IF NOT EXISTS trip_activities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trip_plan_id INTEGER NOT NULL,
            destination_id INTEGER,
            title TEXT NOT NULL,
            description TEXT,
            activity_date TEXT,
            start_time TEXT,
            end_time TEXT,
            cost REAL,
            category TEXT,
            latitude REAL,
            longitude REAL,
            created_by INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (trip_plan_id) REFERENCES trip_plans(id) ON DELETE CASCADE,
            FOREIGN KEY (destination_id) REFERENCES destinations(id) ON DELETE SET NULL,
            FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE CASCADE
        )",
    )?;
    run_migration_step(
        transaction,
        "index trip_participants",
        "CREATE INDEX IF NOT EXISTS idx_trip_participants_user
            ON trip_participants(user_id, trip_plan_id)",
    )?;
    run_migration_step(
        transaction,
        "index trip_activities",
        "CREATE INDEX IF NOT EXISTS idx_trip_activities_plan
            ON trip_activities(trip_plan_id, activity_date)",
    )
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), TravelError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing_version: Option<i64> = transaction
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| migration_error("read schema version", &e))?;

    match existing_version {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(TravelError::storage(format!(
            "expected schema version {SCHEMA_VERSION} but found {found}"
        ))),
        None => {
            transaction
                .execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [SCHEMA_VERSION],
                )
                .map_err(|e| migration_error("record schema version", &e))?;
            Ok(())
        }
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), TravelError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|e| migration_error(step, &e))
}

fn migration_error(step: &str, source: &rusqlite::Error) -> TravelError {
    TravelError::storage(format!("failed to execute migration step '{step}': {source}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialise_schema(&mut conn).unwrap();
        initialise_schema(&mut conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialise_schema(&mut conn).unwrap();
        conn.execute("UPDATE schema_version SET version = 99", [])
            .unwrap();
        assert!(initialise_schema(&mut conn).is_err());
    }
}
