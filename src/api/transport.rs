use axum::{Json, Router, extract::State, routing::get};
use serde::Deserialize;

use super::{
    extract::{ApiQuery, CurrentUser},
    location::{origin_or_home, pair},
};
use crate::{
    TravelError,
    costs::known_city,
    models::{Coordinates, patch::lenient_f64},
    transport::TransportOptions,
    web::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/transport-options", get(transport_options))
}

#[derive(Debug, Deserialize)]
struct TransportQuery {
    #[serde(default, deserialize_with = "lenient_f64")]
    start_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    start_lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    end_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    end_lon: Option<f64>,
    /// Place name used when no end coordinates are given
    destination: Option<String>,
}

/// Geocode a place name, falling back to the built-in city table
async fn resolve(state: &AppState, place: &str) -> Result<Coordinates, TravelError> {
    match state.mapping.geocode(place).await {
        Ok(found) => Ok(found.coordinates()),
        Err(e) => {
            tracing::debug!(place, error = %e, "geocoding failed, trying city table");
            known_city(place).ok_or_else(|| TravelError::not_found(format!("Unknown destination '{place}'")))
        }
    }
}

async fn transport_options(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<TransportQuery>,
) -> Result<Json<TransportOptions>, TravelError> {
    let start = origin_or_home(query.start_lat, query.start_lon, "start", &user)?;
    let end = match pair(query.end_lat, query.end_lon, "end")? {
        Some(point) => point,
        None => {
            let place = query
                .destination
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .ok_or_else(|| {
                    TravelError::validation("End coordinates or a destination name are required")
                })?;
            resolve(&state, place).await?
        }
    };

    let options = state.config.transport.score_between(&start, &end)?;
    tracing::debug!(
        distance_km = options.distance_km,
        recommended = ?options.recommended_mode,
        "scored transport options"
    );
    Ok(Json(options))
}
