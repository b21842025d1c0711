use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Result, Store, conflict_on_unique};
use crate::{
    TravelError,
    models::{HomeLocation, NewUser, User, user::normalize_email},
};

const USER_COLUMNS: &str = "id, name, email, password_hash, preferred_language, home_city, \
     home_country, home_latitude, home_longitude, currency_code, created_at";

pub(super) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        preferred_language: row.get(4)?,
        home_city: row.get(5)?,
        home_country: row.get(6)?,
        home_latitude: row.get(7)?,
        home_longitude: row.get(8)?,
        currency_code: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub(super) fn find_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            user_from_row,
        )
        .optional()?)
}

pub(super) fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [normalize_email(email)],
            user_from_row,
        )
        .optional()?)
}

impl Store {
    /// Insert a new account; an existing e-mail is a conflict
    #[tracing::instrument(level = "debug", skip(self, new), fields(email = %new.email))]
    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO users (name, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    new.name.trim(),
                    normalize_email(&new.email),
                    new.password_hash,
                    Utc::now()
                ],
            )
            .map_err(|e| conflict_on_unique(e, "User already exists"))?;
            let id = conn.last_insert_rowid();
            find_user(conn, id)?
                .ok_or_else(|| TravelError::storage("inserted user row vanished"))
        })
        .await
    }

    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.call(move |conn| find_user(conn, id)).await
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_string();
        self.call(move |conn| find_user_by_email(conn, &email))
            .await
    }

    /// Store home city/country/coordinates; omitted fields are cleared
    /// except the currency, which keeps its previous value.
    #[tracing::instrument(level = "debug", skip(self, location))]
    pub async fn update_home_location(&self, user_id: i64, location: HomeLocation) -> Result<User> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET home_city = ?1, home_country = ?2, home_latitude = ?3,
                    home_longitude = ?4, currency_code = COALESCE(?5, currency_code)
                 WHERE id = ?6",
                params![
                    location.home_city,
                    location.home_country,
                    location.home_latitude,
                    location.home_longitude,
                    location.currency_code,
                    user_id
                ],
            )?;
            if changed == 0 {
                return Err(TravelError::not_found("User not found"));
            }
            find_user(conn, user_id)?.ok_or_else(|| TravelError::not_found("User not found"))
        })
        .await
    }
}
