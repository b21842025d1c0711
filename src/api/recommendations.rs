use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use super::extract::{ApiQuery, CurrentUser, Id};
use crate::{
    TravelError,
    models::{Destination, patch::lenient_f64},
    recommendations::{
        self, DEFAULT_LIMIT, DEFAULT_SIMILAR_LIMIT, MAX_LIMIT, RecommendationQuery,
        ScoredDestination,
    },
    web::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/recommendations", get(recommend))
        .route("/recommendations/trending", get(trending))
        .route("/recommendations/similar/{id}", get(similar))
        .route("/recommendations/budget", get(by_budget))
}

#[derive(Debug, Serialize)]
struct LocationInfo {
    latitude: f64,
    longitude: f64,
    city: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Serialize)]
struct Recommendations {
    recommendations: Vec<ScoredDestination>,
    using_saved_location: bool,
    location_info: Option<LocationInfo>,
    currency: String,
    trip_duration_days: u32,
}

async fn recommend(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<RecommendationQuery>,
) -> Result<Json<Recommendations>, TravelError> {
    let explicit = query.origin()?;
    let saved = if explicit.is_none() && query.use_saved_location() {
        user.home_coordinates()
    } else {
        None
    };
    let origin = explicit.or(saved);

    let catalog = state.store.list_destinations().await?;
    let recommendations =
        state
            .recommender
            .recommend(catalog, &query, origin, &user.currency_code)?;

    Ok(Json(Recommendations {
        recommendations,
        using_saved_location: saved.is_some(),
        location_info: origin.map(|point| LocationInfo {
            latitude: point.latitude,
            longitude: point.longitude,
            city: user.home_city.clone(),
            country: user.home_country.clone(),
        }),
        currency: user.currency_code,
        trip_duration_days: query.trip_days(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

async fn trending(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<Vec<Destination>>, TravelError> {
    let catalog = state.store.list_destinations().await?;
    Ok(Json(recommendations::trending(catalog, query.or(DEFAULT_LIMIT))))
}

async fn similar(
    State(state): State<AppState>,
    _user: CurrentUser,
    Id(id): Id,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<Vec<Destination>>, TravelError> {
    let source = state
        .store
        .destination(id)
        .await?
        .ok_or_else(|| TravelError::not_found("Destination not found"))?;
    let catalog = state.store.list_destinations().await?;
    Ok(Json(recommendations::similar(
        &source,
        catalog,
        query.or(DEFAULT_SIMILAR_LIMIT),
    )))
}

#[derive(Debug, Deserialize)]
struct BudgetQuery {
    #[serde(default, deserialize_with = "lenient_f64")]
    min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    max: Option<f64>,
    limit: Option<usize>,
}

async fn by_budget(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiQuery(query): ApiQuery<BudgetQuery>,
) -> Result<Json<Vec<Destination>>, TravelError> {
    let (Some(min), Some(max)) = (query.min, query.max) else {
        return Err(TravelError::validation("Both min and max budget are required"));
    };
    let limit = LimitQuery { limit: query.limit }.or(DEFAULT_LIMIT);
    let catalog = state.store.list_destinations().await?;
    Ok(Json(recommendations::by_budget(catalog, min, max, limit)?))
}
