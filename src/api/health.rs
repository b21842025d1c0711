use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use crate::web::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
struct Features {
    maps: bool,
    trip_planner: bool,
    email: bool,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    database: bool,
    features: Features,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let database = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            false
        }
    };
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = Health {
        status: if database { "ok" } else { "degraded" },
        version: crate::VERSION,
        database,
        features: Features {
            maps: state.mapping.is_available(),
            trip_planner: state.planner.is_available(),
            email: state.trips.notifications_enabled(),
        },
    };
    (status, Json(body))
}
