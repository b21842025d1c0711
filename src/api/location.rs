use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::extract::{ApiJson, ApiQuery, CurrentUser};
use crate::{
    TravelError,
    models::{Coordinates, User, patch::lenient_f64},
    nearby::{self, LocationInput, NearbyRequest, UserLocation},
    routing::{
        IsochroneRequest, Isochrones, Matrix, MatrixRequest, Place, Profile, RangeType, Route,
        RouteRequest, service::summary_text,
    },
    web::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/geocode", get(geocode))
        .route("/reverse-geocode", get(reverse_geocode))
        .route("/location/autocomplete", get(autocomplete))
        .route("/location/validate", post(validate_location))
        .route("/location/nearest-places", post(nearest_places))
        .route("/directions", post(directions))
        .route("/isochrones", post(isochrones))
        .route("/matrix", post(matrix))
        .route("/restaurant-directions", post(restaurant_directions))
}

/// Both halves of a coordinate pair or neither
pub(super) fn pair(
    latitude: Option<f64>,
    longitude: Option<f64>,
    what: &str,
) -> Result<Option<Coordinates>, TravelError> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Coordinates::new(lat, lon)
            .map(Some)
            .map_err(|_| {
                TravelError::validation(format!(
                    "Invalid {what} coordinates. Latitude must be between -90 and 90, longitude between -180 and 180."
                ))
            }),
        (None, None) => Ok(None),
        _ => Err(TravelError::validation(format!(
            "Both {what} latitude and longitude are required"
        ))),
    }
}

fn required(
    latitude: Option<f64>,
    longitude: Option<f64>,
    what: &str,
) -> Result<Coordinates, TravelError> {
    pair(latitude, longitude, what)?
        .ok_or_else(|| TravelError::validation(format!("{what} coordinates are required")))
}

/// Explicit point, else the user's saved home
pub(super) fn origin_or_home(
    latitude: Option<f64>,
    longitude: Option<f64>,
    what: &str,
    user: &User,
) -> Result<Coordinates, TravelError> {
    pair(latitude, longitude, what)?
        .or_else(|| user.home_coordinates())
        .ok_or_else(|| {
            TravelError::validation(
                "User location not available. Please set your home location in settings.",
            )
        })
}

#[derive(Debug, Deserialize)]
struct GeocodeQuery {
    address: Option<String>,
    location: Option<String>,
}

async fn geocode(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiQuery(query): ApiQuery<GeocodeQuery>,
) -> Result<Json<Place>, TravelError> {
    let text = query.address.or(query.location).unwrap_or_default();
    Ok(Json(state.mapping.geocode(&text).await?))
}

#[derive(Debug, Deserialize)]
struct PointQuery {
    #[serde(default, deserialize_with = "lenient_f64")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    lon: Option<f64>,
}

async fn reverse_geocode(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiQuery(query): ApiQuery<PointQuery>,
) -> Result<Json<Place>, TravelError> {
    let point = pair(query.lat, query.lon, "query")?
        .ok_or_else(|| TravelError::validation("Both lat and lon parameters are required"))?;
    Ok(Json(state.mapping.reverse_geocode(point).await?))
}

#[derive(Debug, Deserialize)]
struct AutocompleteQuery {
    #[serde(default)]
    query: String,
}

async fn autocomplete(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiQuery(query): ApiQuery<AutocompleteQuery>,
) -> Result<Json<Value>, TravelError> {
    let suggestions = state.mapping.autocomplete(&query.query).await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize)]
struct DirectionsBody {
    #[serde(default, deserialize_with = "lenient_f64")]
    start_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    start_lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    end_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    end_lon: Option<f64>,
    #[serde(default)]
    profile: Profile,
    #[serde(default)]
    alternatives: u8,
    #[serde(default = "default_language")]
    language: String,
}

async fn directions(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiJson(body): ApiJson<DirectionsBody>,
) -> Result<Json<Route>, TravelError> {
    let request = RouteRequest {
        start: required(body.start_lat, body.start_lon, "start")?,
        end: required(body.end_lat, body.end_lon, "end")?,
        profile: body.profile,
        alternatives: body.alternatives,
        language: body.language,
    };
    Ok(Json(state.mapping.directions(&request).await?))
}

fn default_ranges() -> Vec<f64> {
    vec![300.0, 600.0, 900.0]
}

#[derive(Debug, Deserialize)]
struct IsochronesBody {
    #[serde(default, deserialize_with = "lenient_f64")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    lon: Option<f64>,
    #[serde(default)]
    profile: Profile,
    #[serde(default)]
    range_type: RangeType,
    #[serde(default = "default_ranges")]
    ranges: Vec<f64>,
}

async fn isochrones(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiJson(body): ApiJson<IsochronesBody>,
) -> Result<Json<Isochrones>, TravelError> {
    let request = IsochroneRequest {
        center: pair(body.lat, body.lon, "center")?
            .ok_or_else(|| TravelError::validation("lat and lon are required"))?,
        profile: body.profile,
        range_type: body.range_type,
        ranges: body.ranges,
    };
    Ok(Json(state.mapping.isochrones(&request).await?))
}

#[derive(Debug, Deserialize)]
struct MatrixBody {
    /// `[lat, lon]` pairs
    #[serde(default)]
    locations: Vec<[f64; 2]>,
    #[serde(default)]
    profile: Profile,
    sources: Option<Vec<usize>>,
    destinations: Option<Vec<usize>>,
}

async fn matrix(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiJson(body): ApiJson<MatrixBody>,
) -> Result<Json<Matrix>, TravelError> {
    let locations = body
        .locations
        .iter()
        .map(|&[lat, lon]| Coordinates::new(lat, lon))
        .collect::<Result<Vec<_>, _>>()?;
    let request = MatrixRequest {
        locations,
        profile: body.profile,
        sources: body.sources,
        destinations: body.destinations,
    };
    Ok(Json(state.mapping.matrix(&request).await?))
}

#[derive(Debug, Serialize)]
struct ValidatedLocation {
    status: &'static str,
    source: nearby::LocationSource,
    location: UserLocation,
}

async fn validate_location(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(input): ApiJson<LocationInput>,
) -> Result<Json<ValidatedLocation>, TravelError> {
    let location = nearby::resolve_location(&state.mapping, &user, &input).await?;
    Ok(Json(ValidatedLocation {
        status: "success",
        source: location.source,
        location,
    }))
}

async fn nearest_places(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<NearbyRequest>,
) -> Result<Json<Value>, TravelError> {
    let catalog = state.store.list_destinations().await?;
    let found = nearby::nearest_places(&state.mapping, &user, &catalog, &request).await?;
    Ok(Json(json!({
        "status": "success",
        "location_source": found.user_location.source,
        "user_location": found.user_location,
        "places": found.places,
        "total_found": found.total_found,
    })))
}

#[derive(Debug, Deserialize)]
struct RestaurantDirectionsBody {
    #[serde(default, deserialize_with = "lenient_f64")]
    user_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    user_lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    restaurant_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    restaurant_lon: Option<f64>,
    restaurant_address: Option<String>,
    #[serde(default)]
    profile: Profile,
}

#[derive(Debug, Serialize)]
struct RestaurantDirections {
    #[serde(flatten)]
    route: Route,
    summary_text: String,
    origin: Coordinates,
    restaurant: Coordinates,
}

async fn restaurant_directions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<RestaurantDirectionsBody>,
) -> Result<Json<RestaurantDirections>, TravelError> {
    let origin = origin_or_home(body.user_lat, body.user_lon, "user", &user)?;

    let restaurant = match pair(body.restaurant_lat, body.restaurant_lon, "restaurant")? {
        Some(point) => point,
        None => {
            let address = body
                .restaurant_address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    TravelError::validation(
                        "Restaurant location (coordinates or address) is required",
                    )
                })?;
            match state.mapping.geocode(address).await {
                Ok(place) => place.coordinates(),
                Err(TravelError::NotFound { .. }) => {
                    return Err(TravelError::not_found("Could not geocode restaurant address"));
                }
                Err(e) => return Err(e),
            }
        }
    };

    let request = RouteRequest {
        start: origin,
        end: restaurant,
        profile: body.profile,
        alternatives: 1,
        language: default_language(),
    };
    let route = state.mapping.directions(&request).await?;
    Ok(Json(RestaurantDirections {
        summary_text: summary_text(&route),
        route,
        origin,
        restaurant,
    }))
}
