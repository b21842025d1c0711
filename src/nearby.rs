//! Where the user is, and which catalog destinations are closest
//!
//! A location comes from the device first, the saved home second and a typed
//! city last. Nearest places are ranked by road distance from a one-row
//! travel matrix.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    TravelError,
    models::{Coordinates, Destination, User, patch::lenient_f64},
    routing::{MappingService, Matrix, MatrixRequest, Profile, service::MAX_MATRIX_LOCATIONS},
};

pub const DEFAULT_MAX_DISTANCE_KM: f64 = 50.0;
pub const DEFAULT_LIMIT: usize = 10;

/// Device coordinates and a typed fallback, as sent by the browser
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationInput {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gps_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gps_lon: Option<f64>,
    #[serde(default)]
    pub manual_city: Option<String>,
    #[serde(default)]
    pub manual_country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Gps,
    SavedProfile,
    ManualInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub source: LocationSource,
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl UserLocation {
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// GPS, then the saved home, then the typed city
#[instrument(skip(mapping, user, input), fields(user_id = user.id))]
pub async fn resolve_location(
    mapping: &MappingService,
    user: &User,
    input: &LocationInput,
) -> Result<UserLocation, TravelError> {
    if let (Some(lat), Some(lon)) = (input.gps_lat, input.gps_lon) {
        match Coordinates::new(lat, lon) {
            Ok(point) => {
                return Ok(UserLocation {
                    source: LocationSource::Gps,
                    latitude: point.latitude,
                    longitude: point.longitude,
                    city: None,
                    country: None,
                });
            }
            Err(e) => tracing::debug!(error = %e, "ignoring out-of-range GPS fix"),
        }
    }

    if let Some(home) = user.home_coordinates() {
        return Ok(UserLocation {
            source: LocationSource::SavedProfile,
            latitude: home.latitude,
            longitude: home.longitude,
            city: user.home_city.clone(),
            country: user.home_country.clone(),
        });
    }

    let Some(city) = non_empty(input.manual_city.as_deref()) else {
        return Err(TravelError::validation(
            "Location required. Enable GPS or enter manually.",
        ));
    };
    let country = non_empty(input.manual_country.as_deref());
    let query = match country {
        Some(country) => format!("{city}, {country}"),
        None => city.to_string(),
    };
    let place = match mapping.geocode(&query).await {
        Ok(place) => place,
        Err(TravelError::NotFound { .. }) => {
            return Err(TravelError::validation(format!(
                "Could not geocode location: {query}"
            )));
        }
        Err(e) => return Err(e),
    };
    Ok(UserLocation {
        source: LocationSource::ManualInput,
        latitude: place.latitude,
        longitude: place.longitude,
        city: place.locality.clone().or_else(|| Some(city.to_string())),
        country: place.country.clone().or_else(|| country.map(str::to_string)),
    })
}

fn default_max_distance() -> f64 {
    DEFAULT_MAX_DISTANCE_KM
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Body of `POST /api/location/nearest-places`
#[derive(Debug, Clone, Deserialize)]
pub struct NearbyRequest {
    #[serde(flatten)]
    pub location: LocationInput,
    #[serde(default = "default_max_distance")]
    pub max_distance_km: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPlace {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
    pub duration_minutes: Option<f64>,
    pub rating: Option<f64>,
    pub average_cost_per_day: Option<f64>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyPlaces {
    pub user_location: UserLocation,
    pub places: Vec<NearbyPlace>,
    pub total_found: usize,
}

/// Catalog entries with coordinates, optionally of one category, that fit in one matrix call
#[must_use]
pub fn candidates<'a>(catalog: &'a [Destination], category: Option<&str>) -> Vec<&'a Destination> {
    let category = non_empty(category);
    catalog
        .iter()
        .filter(|d| d.coordinates().is_some())
        .filter(|d| {
            category.is_none_or(|wanted| {
                d.category
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(wanted))
            })
        })
        .take(MAX_MATRIX_LOCATIONS - 1)
        .collect()
}

/// Places within `max_distance_km`, closest first; column 0 of the matrix is the user
#[must_use]
pub fn rank(
    candidates: &[&Destination],
    matrix: &Matrix,
    max_distance_km: f64,
    limit: usize,
) -> Vec<NearbyPlace> {
    let mut places: Vec<NearbyPlace> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, destination)| {
            let (distance, duration) = matrix.from_first_source(i + 1);
            let distance = distance.filter(|d| *d <= max_distance_km)?;
            let point = destination.coordinates()?;
            Some(NearbyPlace {
                id: destination.id,
                title: destination.title.clone(),
                description: destination.description.clone(),
                category: destination.category.clone(),
                latitude: point.latitude,
                longitude: point.longitude,
                distance_km: (distance * 100.0).round() / 100.0,
                duration_minutes: duration.map(f64::round),
                rating: destination.rating,
                average_cost_per_day: destination.average_cost_per_day,
                tags: destination.tags.clone(),
            })
        })
        .collect();
    places.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km).then(a.id.cmp(&b.id)));
    places.truncate(limit);
    places
}

/// Resolve the user, then rank the catalog by driving distance
pub async fn nearest_places(
    mapping: &MappingService,
    user: &User,
    catalog: &[Destination],
    request: &NearbyRequest,
) -> Result<NearbyPlaces, TravelError> {
    if !request.max_distance_km.is_finite() || request.max_distance_km <= 0.0 {
        return Err(TravelError::validation("max_distance_km must be positive"));
    }
    let user_location = resolve_location(mapping, user, &request.location).await?;
    let candidates = candidates(catalog, request.category.as_deref());
    if candidates.is_empty() {
        return Ok(NearbyPlaces {
            user_location,
            places: Vec::new(),
            total_found: 0,
        });
    }

    let mut locations = vec![user_location.coordinates()];
    locations.extend(candidates.iter().filter_map(|d| d.coordinates()));
    let matrix = mapping
        .matrix(&MatrixRequest {
            locations,
            profile: Profile::DrivingCar,
            sources: Some(vec![0]),
            destinations: None,
        })
        .await?;

    let places = rank(&candidates, &matrix, request.max_distance_km, request.limit);
    tracing::info!(
        candidates = candidates.len(),
        found = places.len(),
        "nearest places ranked"
    );
    Ok(NearbyPlaces {
        user_location,
        total_found: places.len(),
        places,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{cache::PersistentCache, routing::StubMappingProvider};
    use chrono::Utc;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Harness {
        mapping: MappingService,
        _dir: TempDir,
    }

    #[fixture]
    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(dir.path()).unwrap();
        let mapping = MappingService::new(Some(Arc::new(StubMappingProvider::new())), cache, 24);
        Harness { mapping, _dir: dir }
    }

    fn user(home: Option<(f64, f64)>) -> User {
        User {
            id: 7,
            name: "Asha".into(),
            email: "asha@example.com".into(),
            password_hash: String::new(),
            preferred_language: "en".into(),
            home_city: home.map(|_| "Mumbai".into()),
            home_country: home.map(|_| "India".into()),
            home_latitude: home.map(|h| h.0),
            home_longitude: home.map(|h| h.1),
            currency_code: "INR".into(),
            created_at: Utc::now(),
        }
    }

    fn destination(id: i64, title: &str, category: &str, lat: f64, lon: f64) -> Destination {
        Destination {
            id,
            title: title.into(),
            description: None,
            category: Some(category.into()),
            budget_tier: None,
            latitude: Some(lat),
            longitude: Some(lon),
            website: None,
            country: None,
            city: None,
            average_cost_per_day: None,
            best_time_to_visit: None,
            rating: Some(4.0),
            review_count: 0,
            popularity_score: 0.0,
            tags: vec![],
            estimated_duration_hours: None,
            created_at: Utc::now(),
        }
    }

    fn input(gps: Option<(f64, f64)>, manual: Option<&str>) -> LocationInput {
        LocationInput {
            gps_lat: gps.map(|g| g.0),
            gps_lon: gps.map(|g| g.1),
            manual_city: manual.map(str::to_string),
            manual_country: None,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_gps_wins_over_saved_home(harness: Harness) {
        let located = resolve_location(
            &harness.mapping,
            &user(Some((19.076, 72.8777))),
            &input(Some((18.52, 73.85)), Some("Goa")),
        )
        .await
        .unwrap();
        assert_eq!(located.source, LocationSource::Gps);
        assert_eq!(located.latitude, 18.52);
    }

    #[rstest]
    #[tokio::test]
    async fn test_invalid_gps_falls_back_to_home(harness: Harness) {
        let located = resolve_location(
            &harness.mapping,
            &user(Some((19.076, 72.8777))),
            &input(Some((123.0, 73.85)), None),
        )
        .await
        .unwrap();
        assert_eq!(located.source, LocationSource::SavedProfile);
        assert_eq!(located.city.as_deref(), Some("Mumbai"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_manual_city_is_geocoded(harness: Harness) {
        let located = resolve_location(&harness.mapping, &user(None), &input(None, Some(" Goa ")))
            .await
            .unwrap();
        assert_eq!(located.source, LocationSource::ManualInput);
        assert_eq!(located.city.as_deref(), Some("Goa"));
    }

    #[rstest]
    #[case(None)]
    #[case(Some("   "))]
    #[case(Some("Atlantis"))]
    #[tokio::test]
    async fn test_unresolvable_location(harness: Harness, #[case] manual: Option<&str>) {
        let result = resolve_location(&harness.mapping, &user(None), &input(None, manual)).await;
        assert!(matches!(result, Err(TravelError::Validation { .. })), "{result:?}");
    }

    #[test]
    fn test_candidates_filter_category_and_coordinates() {
        let mut unplaced = destination(3, "Nowhere", "beach", 0.0, 0.0);
        unplaced.latitude = None;
        let catalog = vec![
            destination(1, "Juhu", "beach", 19.09, 72.82),
            destination(2, "Fort", "heritage", 18.93, 72.83),
            unplaced,
        ];
        let picked: Vec<i64> = candidates(&catalog, Some("Beach")).iter().map(|d| d.id).collect();
        assert_eq!(picked, vec![1]);
        assert_eq!(candidates(&catalog, None).len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_nearest_places_sorted_and_limited(harness: Harness) {
        let catalog = vec![
            destination(1, "Lonavala", "hills", 18.7546, 73.4062),
            destination(2, "Juhu", "beach", 19.0988, 72.8267),
            destination(3, "Goa", "beach", 15.2993, 74.124),
            destination(4, "Marine Drive", "city", 18.944, 72.823),
        ];
        let request = NearbyRequest {
            location: input(Some((19.076, 72.8777)), None),
            max_distance_km: 100.0,
            limit: 2,
            category: None,
        };
        let nearby = nearest_places(&harness.mapping, &user(None), &catalog, &request)
            .await
            .unwrap();

        let titles: Vec<&str> = nearby.places.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Juhu", "Marine Drive"]);
        assert_eq!(nearby.total_found, 2);
        assert_eq!(nearby.user_location.source, LocationSource::Gps);
        assert!(nearby.places[0].duration_minutes.is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn test_nearest_places_empty_catalog(harness: Harness) {
        let request: NearbyRequest =
            serde_json::from_str(r#"{"gps_lat": "19.076", "gps_lon": 72.8777}"#).unwrap();
        assert_eq!(request.limit, DEFAULT_LIMIT);
        let nearby = nearest_places(&harness.mapping, &user(None), &[], &request)
            .await
            .unwrap();
        assert!(nearby.places.is_empty());
    }
}
