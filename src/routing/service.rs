use std::{fmt::Write as _, sync::Arc, time::Duration};

use rand::RngExt;
use tracing::instrument;

use super::{
    IsochroneRequest, Isochrones, MappingProvider, Matrix, MatrixRequest, Place, Route,
    RouteRequest,
};
use crate::{TravelError, cache::PersistentCache, models::Coordinates};

pub const MIN_QUERY_LENGTH: usize = 2;
pub const AUTOCOMPLETE_SIZE: usize = 10;
pub const MAX_ALTERNATIVES: u8 = 3;
pub const MAX_ISOCHRONE_RANGES: usize = 10;
/// Upstream limit on matrix locations
pub const MAX_MATRIX_LOCATIONS: usize = 50;
/// Steps listed by [`summary_text`] before eliding the rest
const SUMMARY_STEPS: usize = 10;

/// Validation and caching in front of a [`MappingProvider`]
#[derive(Clone)]
pub struct MappingService {
    provider: Option<Arc<dyn MappingProvider>>,
    cache: PersistentCache,
    geocode_ttl: Duration,
}

impl std::fmt::Debug for MappingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingService")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("geocode_ttl", &self.geocode_ttl)
            .finish_non_exhaustive()
    }
}

impl MappingService {
    #[must_use]
    pub fn new(
        provider: Option<Arc<dyn MappingProvider>>,
        cache: PersistentCache,
        geocode_ttl_hours: u64,
    ) -> Self {
        Self {
            provider,
            cache,
            geocode_ttl: Duration::from_secs(geocode_ttl_hours * 3600),
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&dyn MappingProvider, TravelError> {
        self.provider
            .as_deref()
            .ok_or_else(|| TravelError::unavailable("Maps"))
    }

    /// Ranked suggestions; short queries never reach the provider
    #[instrument(skip(self))]
    pub async fn autocomplete(&self, query: &str) -> Result<Vec<Place>, TravelError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LENGTH {
            return Ok(Vec::new());
        }
        self.provider()?.search(query, AUTOCOMPLETE_SIZE).await
    }

    /// Best match for free text
    #[instrument(skip(self))]
    pub async fn geocode(&self, query: &str) -> Result<Place, TravelError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(TravelError::validation("Address is required"));
        }
        let provider = self.provider()?;

        let key = format!("geocode:{}", normalize_query(query));
        if let Some(place) = self.cache.lookup::<Place>(&key).await {
            tracing::debug!(%key, "geocode cache hit");
            return Ok(place);
        }

        let place = provider
            .search(query, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TravelError::not_found(format!("No location found for '{query}'")))?;

        let jitter: f64 = rand::rng().random_range(0.9..1.1);
        self.cache
            .store(&key, place.clone(), self.geocode_ttl.mul_f64(jitter))
            .await;
        Ok(place)
    }

    #[instrument(skip(self), fields(point = %point.format_coordinates()))]
    pub async fn reverse_geocode(&self, point: Coordinates) -> Result<Place, TravelError> {
        point.validate()?;
        self.provider()?
            .reverse(point)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TravelError::not_found("No address found for these coordinates"))
    }

    /// Identical endpoints short-circuit to a zero-length route
    #[instrument(skip(self, request), fields(profile = %request.profile))]
    pub async fn directions(&self, request: &RouteRequest) -> Result<Route, TravelError> {
        request.start.validate()?;
        request.end.validate()?;
        if request.alternatives > MAX_ALTERNATIVES {
            return Err(TravelError::validation(format!(
                "At most {MAX_ALTERNATIVES} alternative routes can be requested"
            )));
        }
        let provider = self.provider()?;
        if request.start == request.end {
            return Ok(Route::stationary(request.start, request.profile));
        }
        provider.route(request).await
    }

    #[instrument(skip(self, request), fields(profile = %request.profile))]
    pub async fn isochrones(&self, request: &IsochroneRequest) -> Result<Isochrones, TravelError> {
        request.center.validate()?;
        if request.ranges.is_empty() || request.ranges.len() > MAX_ISOCHRONE_RANGES {
            return Err(TravelError::validation(format!(
                "Between 1 and {MAX_ISOCHRONE_RANGES} range values are required"
            )));
        }
        if request.ranges.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(TravelError::validation("Range values must be positive"));
        }
        self.provider()?.isochrones(request).await
    }

    #[instrument(skip(self, request), fields(profile = %request.profile, locations = request.locations.len()))]
    pub async fn matrix(&self, request: &MatrixRequest) -> Result<Matrix, TravelError> {
        let count = request.locations.len();
        if !(2..=MAX_MATRIX_LOCATIONS).contains(&count) {
            return Err(TravelError::validation(format!(
                "Between 2 and {MAX_MATRIX_LOCATIONS} locations are required"
            )));
        }
        for location in &request.locations {
            location.validate()?;
        }
        let selected = [&request.sources, &request.destinations];
        for indices in selected.into_iter().flatten() {
            if indices.is_empty() || indices.iter().any(|&i| i >= count) {
                return Err(TravelError::validation(format!(
                    "Source and destination indices must be between 0 and {}",
                    count - 1
                )));
            }
        }
        self.provider()?.matrix(request).await
    }
}

fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Plain-text description of a route
#[must_use]
pub fn summary_text(route: &Route) -> String {
    let mut text = String::new();
    let hours = (route.duration_minutes / 60.0).floor();
    let minutes = (route.duration_minutes % 60.0).round();
    let _ = writeln!(text, "Route Summary:");
    let _ = writeln!(text, "• Distance: {:.2} km", route.distance_km);
    let _ = writeln!(text, "• Duration: {hours:.0} hours ({minutes:.0} minutes)");
    let _ = writeln!(text, "• Transport Mode: {}", route.profile.title());

    if !route.steps.is_empty() {
        let _ = writeln!(
            text,
            "\nTurn-by-Turn Directions ({} steps):",
            route.steps.len()
        );
        for (i, step) in route.steps.iter().take(SUMMARY_STEPS).enumerate() {
            let _ = writeln!(
                text,
                "{}. {} ({:.2} km)",
                i + 1,
                step.instruction,
                step.distance_km
            );
        }
        if route.steps.len() > SUMMARY_STEPS {
            let _ = writeln!(
                text,
                "... and {} more steps",
                route.steps.len() - SUMMARY_STEPS
            );
        }
    }

    if !route.alternatives.is_empty() {
        let _ = writeln!(
            text,
            "\nAlternative Routes Available: {}",
            route.alternatives.len()
        );
        for (i, alt) in route.alternatives.iter().enumerate() {
            let _ = writeln!(
                text,
                "  Alt {}: {:.2} km, {:.0} min",
                i + 1,
                alt.distance_km,
                alt.duration_minutes
            );
        }
    }
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Profile, RangeType, RouteAlternative, RouteStep, StubMappingProvider};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Harness {
        service: MappingService,
        stub: StubMappingProvider,
        _dir: TempDir,
    }

    #[fixture]
    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(dir.path()).unwrap();
        let stub = StubMappingProvider::new();
        let service = MappingService::new(Some(Arc::new(stub.clone())), cache, 24);
        Harness {
            service,
            stub,
            _dir: dir,
        }
    }

    fn point(lat: f64, lon: f64) -> Coordinates {
        Coordinates::new(lat, lon).unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn test_short_autocomplete_skips_provider(harness: Harness) {
        assert!(harness.service.autocomplete(" g ").await.unwrap().is_empty());
        assert_eq!(harness.stub.calls(), 0);
        assert_eq!(harness.service.autocomplete("Goa").await.unwrap().len(), 1);
        assert_eq!(harness.stub.calls(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_geocode_is_cached(harness: Harness) {
        let first = harness.service.geocode("Jaipur").await.unwrap();
        let second = harness.service.geocode("  jaipur ").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(harness.stub.calls(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_geocode_without_match(harness: Harness) {
        let result = harness.service.geocode("Atlantis").await;
        assert!(matches!(result, Err(TravelError::NotFound { .. })));
    }

    #[rstest]
    #[case(19.076, 72.8777)]
    #[case(-33.8688, 151.2093)]
    #[case(64.1466, -21.9426)]
    #[tokio::test]
    async fn test_reverse_then_geocode_round_trip(
        harness: Harness,
        #[case] lat: f64,
        #[case] lon: f64,
    ) {
        let original = point(lat, lon);
        let place = harness.service.reverse_geocode(original).await.unwrap();
        let found = harness.service.geocode(&place.label).await.unwrap();
        assert!(found.coordinates().approx_eq(&original, 0.01));
    }

    #[rstest]
    #[tokio::test]
    async fn test_identical_points_route_without_upstream(harness: Harness) {
        let here = point(19.076, 72.8777);
        let request = RouteRequest {
            start: here,
            end: here,
            profile: Profile::FootWalking,
            alternatives: 0,
            language: "en".into(),
        };
        let route = harness.service.directions(&request).await.unwrap();
        assert_eq!(route.distance_km, 0.0);
        assert_eq!(route.duration_minutes, 0.0);
        assert_eq!(route.coordinates, vec![here.to_lon_lat()]);
        assert_eq!(harness.stub.calls(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_directions_validation(harness: Harness) {
        let mut request = RouteRequest {
            start: Coordinates {
                latitude: 95.0,
                longitude: 0.0,
            },
            end: point(0.0, 0.0),
            profile: Profile::DrivingCar,
            alternatives: 0,
            language: "en".into(),
        };
        assert!(matches!(
            harness.service.directions(&request).await,
            Err(TravelError::Validation { .. })
        ));
        request.start = point(1.0, 1.0);
        request.alternatives = 4;
        assert!(matches!(
            harness.service.directions(&request).await,
            Err(TravelError::Validation { .. })
        ));
    }

    #[rstest]
    #[case(vec![], false)]
    #[case(vec![300.0, 600.0], true)]
    #[case(vec![300.0, -1.0], false)]
    #[case(vec![60.0; 11], false)]
    #[tokio::test]
    async fn test_isochrone_ranges(harness: Harness, #[case] ranges: Vec<f64>, #[case] ok: bool) {
        let request = IsochroneRequest {
            center: point(19.076, 72.8777),
            profile: Profile::CyclingRegular,
            range_type: RangeType::Time,
            ranges,
        };
        assert_eq!(harness.service.isochrones(&request).await.is_ok(), ok);
    }

    fn matrix_request(count: usize, sources: Option<Vec<usize>>) -> MatrixRequest {
        MatrixRequest {
            locations: (0..count).map(|i| point(19.0 + i as f64 * 0.1, 72.8)).collect(),
            profile: Profile::DrivingCar,
            sources,
            destinations: None,
        }
    }

    #[rstest]
    #[case(matrix_request(1, None), false)]
    #[case(matrix_request(51, None), false)]
    #[case(matrix_request(3, Some(vec![3])), false)]
    #[case(matrix_request(3, Some(vec![])), false)]
    #[case(matrix_request(3, Some(vec![0])), true)]
    #[tokio::test]
    async fn test_matrix_validation(harness: Harness, #[case] request: MatrixRequest, #[case] ok: bool) {
        let result = harness.service.matrix(&request).await;
        assert_eq!(result.is_ok(), ok, "{result:?}");
        assert_eq!(harness.stub.calls(), usize::from(ok));
    }

    #[rstest]
    #[tokio::test]
    async fn test_missing_provider_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let service = MappingService::new(None, PersistentCache::open(dir.path()).unwrap(), 24);
        assert!(!service.is_available());
        assert!(matches!(
            service.geocode("Goa").await,
            Err(TravelError::Unavailable { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_upstream_errors_pass_through() {
        let dir = TempDir::new().unwrap();
        let stub = StubMappingProvider::new()
            .with_error(|| TravelError::upstream("stub", Some(500), "boom"));
        let service = MappingService::new(
            Some(Arc::new(stub)),
            PersistentCache::open(dir.path()).unwrap(),
            24,
        );
        assert!(matches!(
            service.autocomplete("Goa").await,
            Err(TravelError::Upstream { .. })
        ));
    }

    #[test]
    fn test_summary_text() {
        let here = point(19.076, 72.8777);
        let mut route = Route::stationary(here, Profile::DrivingCar);
        route.distance_km = 12.5;
        route.duration_minutes = 95.0;
        route.steps = (0..12)
            .map(|i| RouteStep {
                instruction: format!("Step {i}"),
                distance_km: 1.0,
                duration_seconds: 60.0,
                step_type: 0,
                name: String::new(),
                way_points: vec![],
            })
            .collect();
        route.alternatives = vec![RouteAlternative {
            distance_km: 14.0,
            duration_minutes: 101.0,
            coordinates: vec![],
        }];

        let text = summary_text(&route);
        assert!(text.contains("• Distance: 12.50 km"));
        assert!(text.contains("Duration: 1 hours (35 minutes)"));
        assert!(text.contains("Transport Mode: Driving Car"));
        assert!(text.contains("Turn-by-Turn Directions (12 steps):"));
        assert!(text.contains("10. Step 9"));
        assert!(!text.contains("Step 10 "));
        assert!(text.contains("... and 2 more steps"));
        assert!(text.contains("Alt 1: 14.00 km, 101 min"));
    }
}
