//! Error types and handling for `TourWithMe`

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main error type for the `TourWithMe` service
#[derive(Error, Debug)]
pub enum TravelError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Malformed client input
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Missing or expired session, bad credentials
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Authenticated but not allowed
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Entity or geocoding match not found
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Request body over the configured limit
    #[error("Payload too large: {message}")]
    PayloadTooLarge { message: String },

    /// Unique constraint or membership conflicts
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// No transport mode applies to the requested distance
    #[error("No transport option available for {distance_km:.1} km")]
    NoTransportAvailable { distance_km: f64 },

    /// Upstream service did not answer in time
    #[error("{service} timed out after {timeout_secs}s")]
    UpstreamTimeout { service: String, timeout_secs: u64 },

    /// Upstream answered with a body we could not understand
    #[error("{service} returned an invalid response: {message}")]
    UpstreamInvalidResponse { service: String, message: String },

    /// Upstream network failure or non-success status
    #[error("{service} request failed: {message}")]
    Upstream {
        service: String,
        status: Option<u16>,
        message: String,
    },

    /// Feature disabled because its API key is not configured
    #[error("{feature} is not configured")]
    Unavailable { feature: String },

    /// Database errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl TravelError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn payload_too_large<S: Into<String>>(message: S) -> Self {
        Self::PayloadTooLarge {
            message: message.into(),
        }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn upstream_timeout<S: Into<String>>(service: S, timeout_secs: u64) -> Self {
        Self::UpstreamTimeout {
            service: service.into(),
            timeout_secs,
        }
    }

    pub fn invalid_response<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::UpstreamInvalidResponse {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn upstream<S: Into<String>, M: Into<String>>(
        service: S,
        status: Option<u16>,
        message: M,
    ) -> Self {
        Self::Upstream {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(feature: S) -> Self {
        Self::Unavailable {
            feature: feature.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, sent to clients next to the message
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Validation { .. } => "validation-error",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not-found",
            Self::Conflict { .. } => "conflict",
            Self::PayloadTooLarge { .. } => "payload-too-large",
            Self::NoTransportAvailable { .. } => "no-transport-available",
            Self::UpstreamTimeout { .. } => "upstream-timeout",
            Self::UpstreamInvalidResponse { .. } => "upstream-invalid-response",
            Self::Upstream { .. } => "upstream-error",
            Self::Unavailable { .. } => "unavailable",
            Self::Storage { .. } => "storage",
            Self::Cache { .. } => "cache",
            Self::Io { .. } => "io",
            Self::General { .. } => "general",
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NoTransportAvailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream { .. } | Self::UpstreamInvalidResponse { .. } => StatusCode::BAD_GATEWAY,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Config { .. }
            | Self::Storage { .. }
            | Self::Cache { .. }
            | Self::Io { .. }
            | Self::General { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the client may reasonably retry the same request
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. } | Self::Upstream { .. } | Self::UpstreamInvalidResponse { .. }
        )
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::NotFound { message }
            | Self::Conflict { message } => message.clone(),
            Self::PayloadTooLarge { .. } => "The request body is too large.".to_string(),
            Self::NoTransportAvailable { distance_km } => {
                format!("No transport option is available for a {distance_km:.1} km trip.")
            }
            Self::UpstreamTimeout { service, .. } => {
                format!("{service} took too long to respond. Please try again.")
            }
            Self::UpstreamInvalidResponse { service, .. } | Self::Upstream { service, .. } => {
                format!("{service} is having trouble right now. Please try again.")
            }
            Self::Unavailable { feature } => {
                format!("{feature} is not available on this server.")
            }
            Self::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            Self::Storage { .. } | Self::Cache { .. } | Self::Io { .. } | Self::General { .. } => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
        }
    }
}

impl From<rusqlite::Error> for TravelError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    retryable: bool,
}

impl IntoResponse for TravelError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.user_message(),
            kind: self.kind(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_error_creation() {
        let config_err = TravelError::config("missing API key");
        assert!(matches!(config_err, TravelError::Config { .. }));

        let upstream_err = TravelError::upstream("OpenRouteService", Some(500), "boom");
        assert!(matches!(upstream_err, TravelError::Upstream { status: Some(500), .. }));

        let validation_err = TravelError::validation("invalid coordinates");
        assert!(matches!(validation_err, TravelError::Validation { .. }));
    }

    #[rstest]
    #[case(TravelError::validation("x"), StatusCode::BAD_REQUEST, "validation-error")]
    #[case(TravelError::not_found("x"), StatusCode::NOT_FOUND, "not-found")]
    #[case(TravelError::payload_too_large("x"), StatusCode::PAYLOAD_TOO_LARGE, "payload-too-large")]
    #[case(TravelError::upstream_timeout("Maps", 15), StatusCode::GATEWAY_TIMEOUT, "upstream-timeout")]
    #[case(TravelError::invalid_response("Maps", "bad"), StatusCode::BAD_GATEWAY, "upstream-invalid-response")]
    #[case(TravelError::NoTransportAvailable { distance_km: 9000.0 }, StatusCode::UNPROCESSABLE_ENTITY, "no-transport-available")]
    #[case(TravelError::unavailable("Trip planning"), StatusCode::SERVICE_UNAVAILABLE, "unavailable")]
    #[case(TravelError::storage("disk"), StatusCode::INTERNAL_SERVER_ERROR, "storage")]
    fn test_status_and_kind(
        #[case] err: TravelError,
        #[case] status: StatusCode,
        #[case] kind: &str,
    ) {
        assert_eq!(err.status_code(), status);
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn test_user_messages() {
        let timeout = TravelError::upstream_timeout("OpenRouteService", 15);
        assert!(timeout.user_message().contains("try again"));
        assert!(timeout.is_retryable());

        let validation_err = TravelError::validation("test input");
        assert_eq!(validation_err.user_message(), "test input");
        assert!(!validation_err.is_retryable());

        let storage = TravelError::storage("UNIQUE constraint failed: users.email");
        assert!(!storage.user_message().contains("UNIQUE"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let travel_err: TravelError = io_err.into();
        assert!(matches!(travel_err, TravelError::Io { .. }));
    }
}
