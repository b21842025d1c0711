//! Accounts and saved home locations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::Coordinates;
use super::patch::lenient_f64;
use crate::TravelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub preferred_language: String,
    pub home_city: Option<String>,
    pub home_country: Option<String>,
    pub home_latitude: Option<f64>,
    pub home_longitude: Option<f64>,
    pub currency_code: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn home_coordinates(&self) -> Option<Coordinates> {
        match (self.home_latitude, self.home_longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            authenticated: true,
            id: Some(self.id),
            name: Some(self.name.clone()),
            email: Some(self.email.clone()),
            home_city: self.home_city.clone(),
            home_country: self.home_country.clone(),
            home_latitude: self.home_latitude,
            home_longitude: self.home_longitude,
            currency_code: Some(self.currency_code.clone()),
            preferred_language: Some(self.preferred_language.clone()),
        }
    }
}

/// Shape of `GET /api/me`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub authenticated: bool,
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub home_city: Option<String>,
    pub home_country: Option<String>,
    pub home_latitude: Option<f64>,
    pub home_longitude: Option<f64>,
    pub currency_code: Option<String>,
    pub preferred_language: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Row to insert at signup; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Body of `PUT /api/user/location`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeLocation {
    pub home_city: Option<String>,
    pub home_country: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub home_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub home_longitude: Option<f64>,
    pub currency_code: Option<String>,
}

impl HomeLocation {
    /// Validate and normalise; currency codes are upper-cased
    pub fn normalized(mut self) -> Result<Self, TravelError> {
        match (self.home_latitude, self.home_longitude) {
            (Some(lat), Some(lon)) => {
                Coordinates::new(lat, lon)?;
            }
            (None, None) => {}
            _ => {
                return Err(TravelError::validation(
                    "Latitude and longitude must be provided together",
                ));
            }
        }

        if let Some(code) = self.currency_code.take() {
            let code = code.trim().to_uppercase();
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(TravelError::validation(
                    "Currency code must be a 3-letter ISO 4217 code",
                ));
            }
            self.currency_code = Some(code);
        }

        for field in [&mut self.home_city, &mut self.home_country] {
            *field = field
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        Ok(self)
    }
}

/// Lower-cased, trimmed e-mail used as the unique login key
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
