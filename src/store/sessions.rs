use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use uuid::Uuid;

use super::{Result, Store, users::user_from_row};
use crate::models::User;

/// A login session identified by an opaque bearer token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

impl Store {
    pub async fn create_session(&self, user_id: i64, ttl: Duration) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + ttl,
        };
        let row = session.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![row.token, row.user_id, row.expires_at, now],
            )?;
            Ok(())
        })
        .await?;
        Ok(session)
    }

    /// The account behind a live session; expired tokens resolve to `None`
    pub async fn session_user(&self, token: &str) -> Result<Option<User>> {
        let token = token.to_string();
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT u.id, u.name, u.email, u.password_hash, u.preferred_language,
                        u.home_city, u.home_country, u.home_latitude, u.home_longitude,
                        u.currency_code, u.created_at
                     FROM sessions s JOIN users u ON u.id = s.user_id
                     WHERE s.token = ?1 AND s.expires_at > ?2",
                    params![token, Utc::now()],
                    user_from_row,
                )
                .optional()?)
        })
        .await
    }

    /// Returns whether a session was removed
    pub async fn delete_session(&self, token: &str) -> Result<bool> {
        let token = token.to_string();
        self.call(move |conn| Ok(conn.execute("DELETE FROM sessions WHERE token = ?1", [token])? > 0))
            .await
    }

    pub async fn purge_expired_sessions(&self) -> Result<usize> {
        let removed = self
            .call(|conn| {
                Ok(conn.execute(
                    "DELETE FROM sessions WHERE expires_at <= ?1",
                    [Utc::now()],
                )?)
            })
            .await?;
        if removed > 0 {
            tracing::info!(removed, "purged expired sessions");
        }
        Ok(removed)
    }
}
