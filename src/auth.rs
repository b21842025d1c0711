//! Password accounts and bearer sessions

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    TravelError,
    models::{NewUser, User, user::normalize_email},
    store::Store,
};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid regex"));

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirmpassword: String,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), TravelError> {
        let email = normalize_email(&self.email);
        if self.name.trim().is_empty()
            || email.is_empty()
            || self.password.chars().count() < MIN_PASSWORD_LENGTH
        {
            return Err(TravelError::validation(format!(
                "Invalid signup data: name, email, and password (>={MIN_PASSWORD_LENGTH}) required."
            )));
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(TravelError::validation("Invalid email address"));
        }
        if self.password != self.confirmpassword {
            return Err(TravelError::validation("Passwords do not match"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Returned by signup and login
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, TravelError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TravelError::general(format!("password hashing failed: {e}")))
}

/// Verify a password against a stored PHC string.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Account registration, login and session lookup
#[derive(Debug, Clone)]
pub struct AuthService {
    store: Store,
    session_ttl: Duration,
}

impl AuthService {
    #[must_use]
    pub fn new(store: Store, session_ttl_hours: u64) -> Self {
        let hours = i64::try_from(session_ttl_hours).unwrap_or(i64::MAX / 3600);
        Self {
            store,
            session_ttl: Duration::hours(hours),
        }
    }

    /// Create the account and log it in
    #[tracing::instrument(skip(self, request), fields(email = %normalize_email(&request.email)))]
    pub async fn signup(&self, request: SignupRequest) -> Result<AuthSession, TravelError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        if self.store.user_by_email(&email).await?.is_some() {
            return Err(TravelError::conflict("Email already registered"));
        }

        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| TravelError::general(format!("hashing task failed: {e}")))??;

        let user = self
            .store
            .create_user(NewUser {
                name: request.name.trim().to_string(),
                email,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                TravelError::Conflict { .. } => TravelError::conflict("Email already registered"),
                other => other,
            })?;
        tracing::info!(user_id = user.id, "account created");
        self.start_session(user).await
    }

    /// Unknown e-mail and wrong password are indistinguishable
    #[tracing::instrument(skip(self, request))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthSession, TravelError> {
        let invalid = || TravelError::unauthorized("Invalid email or password");
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(invalid());
        }
        let user = self
            .store
            .user_by_email(&request.email)
            .await?
            .ok_or_else(invalid)?;

        let hash = user.password_hash.clone();
        let password = request.password;
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| TravelError::general(format!("verification task failed: {e}")))?;
        if !valid {
            tracing::debug!(user_id = user.id, "password mismatch");
            return Err(invalid());
        }
        self.start_session(user).await
    }

    pub async fn logout(&self, token: &str) -> Result<bool, TravelError> {
        self.store.delete_session(token).await
    }

    /// Resolve a bearer token; unknown or expired tokens yield `None`
    pub async fn user_for_token(&self, token: &str) -> Result<Option<User>, TravelError> {
        if token.is_empty() {
            return Ok(None);
        }
        self.store.session_user(token).await
    }

    async fn start_session(&self, user: User) -> Result<AuthSession, TravelError> {
        let session = self.store.create_session(user.id, self.session_ttl).await?;
        Ok(AuthSession {
            token: session.token,
            expires_at: session.expires_at,
            user,
        })
    }
}
