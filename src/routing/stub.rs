//! Deterministic in-process mapping provider
//!
//! Resolves the built-in city table and literal `"lat, lon"` text, draws
//! straight-line routes and square isochrones. Used by tests and when running
//! without a mapping API key in development.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use super::{
    IsochronePolygon, IsochroneRequest, Isochrones, MappingProvider, Matrix, MatrixRequest, Place,
    Profile, Route, RouteRequest, RouteStep,
};
use crate::{TravelError, costs::known_city, models::Coordinates};

/// Places within this many degrees of a named place reverse to its name
const SNAP_DEGREES: f64 = 0.005;

type Failure = Arc<dyn Fn() -> TravelError + Send + Sync>;

#[derive(Clone, Default)]
pub struct StubMappingProvider {
    places: Arc<Mutex<HashMap<String, Coordinates>>>,
    failure: Option<Failure>,
    calls: Arc<AtomicUsize>,
}

impl std::fmt::Debug for StubMappingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubMappingProvider")
            .field("calls", &self.calls())
            .field("failing", &self.failure.is_some())
            .finish_non_exhaustive()
    }
}

impl StubMappingProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extra named place
    #[must_use]
    pub fn with_place(self, label: &str, point: Coordinates) -> Self {
        if let Ok(mut places) = self.places.lock() {
            places.insert(label.trim().to_lowercase(), point);
        }
        self
    }

    /// Every call fails with the error built by `failure`
    #[must_use]
    pub fn with_error(mut self, failure: impl Fn() -> TravelError + Send + Sync + 'static) -> Self {
        self.failure = Some(Arc::new(failure));
        self
    }

    /// Number of provider calls made so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), TravelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }

    fn resolve(&self, text: &str) -> Option<(String, Coordinates)> {
        let key = text.trim().to_lowercase();
        if let Some(point) = parse_point(&key) {
            return Some((point.format_coordinates(), point));
        }
        if let Some(point) = self.places.lock().ok()?.get(&key) {
            return Some((text.trim().to_string(), *point));
        }
        known_city(&key).map(|point| (text.trim().to_string(), point))
    }

    fn name_near(&self, point: Coordinates) -> Option<String> {
        let places = self.places.lock().ok()?;
        places
            .iter()
            .find(|(_, p)| p.approx_eq(&point, SNAP_DEGREES))
            .map(|(label, _)| label.clone())
    }
}

/// `"19.0760, 72.8777"` style text
fn parse_point(text: &str) -> Option<Coordinates> {
    let (lat, lon) = text.split_once(',')?;
    Coordinates::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?).ok()
}

fn place(label: String, point: Coordinates) -> Place {
    Place {
        name: label.split(',').next().unwrap_or_default().trim().to_string(),
        label,
        latitude: point.latitude,
        longitude: point.longitude,
        country: None,
        region: None,
        locality: None,
        street: None,
        postal_code: None,
        confidence: 1.0,
    }
}

/// Average speed used for stub routes
fn speed_kmh(profile: Profile) -> f64 {
    match profile {
        Profile::DrivingCar => 50.0,
        Profile::DrivingHgv => 40.0,
        Profile::CyclingRegular | Profile::CyclingRoad | Profile::CyclingMountain => 15.0,
        Profile::CyclingElectric => 20.0,
        Profile::FootWalking | Profile::FootHiking | Profile::Wheelchair => 5.0,
    }
}

#[async_trait]
impl MappingProvider for StubMappingProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn search(&self, text: &str, size: usize) -> Result<Vec<Place>, TravelError> {
        self.enter()?;
        Ok(self
            .resolve(text)
            .map(|(label, point)| place(label, point))
            .into_iter()
            .take(size)
            .collect())
    }

    async fn reverse(&self, point: Coordinates) -> Result<Vec<Place>, TravelError> {
        self.enter()?;
        let label = self
            .name_near(point)
            .unwrap_or_else(|| point.format_coordinates());
        Ok(vec![place(label, point)])
    }

    async fn route(&self, request: &RouteRequest) -> Result<Route, TravelError> {
        self.enter()?;
        let distance_km = request.start.distance_km(&request.end);
        let duration_seconds = distance_km / speed_kmh(request.profile) * 3600.0;
        let mut route = Route::stationary(request.start, request.profile);
        route.distance_km = distance_km;
        route.duration_seconds = duration_seconds;
        route.duration_minutes = (duration_seconds / 6.0).round() / 10.0;
        route.duration_hours = (duration_seconds / 36.0).round() / 100.0;
        route.coordinates.push(request.end.to_lon_lat());
        route.steps = vec![
            RouteStep {
                instruction: "Head towards your destination".to_string(),
                distance_km,
                duration_seconds,
                step_type: 11,
                name: String::new(),
                way_points: vec![0, 1],
            },
            RouteStep {
                instruction: "Arrive at your destination".to_string(),
                distance_km: 0.0,
                duration_seconds: 0.0,
                step_type: 10,
                name: String::new(),
                way_points: vec![1, 1],
            },
        ];
        Ok(route)
    }

    async fn isochrones(&self, request: &IsochroneRequest) -> Result<Isochrones, TravelError> {
        self.enter()?;
        let [lon, lat] = request.center.to_lon_lat();
        let polygons = request
            .ranges
            .iter()
            .map(|&value| {
                let half = value / 100_000.0;
                IsochronePolygon {
                    value,
                    center: [lon, lat],
                    coordinates: vec![vec![
                        [lon - half, lat - half],
                        [lon + half, lat - half],
                        [lon + half, lat + half],
                        [lon - half, lat + half],
                        [lon - half, lat - half],
                    ]],
                    area_km2: (2.0 * half * 111.0).powi(2),
                }
            })
            .collect();
        Ok(Isochrones {
            center: request.center,
            profile: request.profile,
            range_type: request.range_type,
            polygons,
        })
    }

    async fn matrix(&self, request: &MatrixRequest) -> Result<Matrix, TravelError> {
        self.enter()?;
        let sources = request.source_indices();
        let destinations = request.destination_indices();
        let speed = speed_kmh(request.profile);
        let mut distances_km = Vec::with_capacity(sources.len());
        let mut durations_minutes = Vec::with_capacity(sources.len());
        for &from in &sources {
            let row: Vec<Option<f64>> = destinations
                .iter()
                .map(|&to| {
                    let (a, b) = (request.locations.get(from)?, request.locations.get(to)?);
                    Some(a.distance_km(b))
                })
                .collect();
            durations_minutes.push(row.iter().map(|d| d.map(|km| km / speed * 60.0)).collect());
            distances_km.push(row);
        }
        Ok(Matrix {
            profile: request.profile,
            locations: request.locations.clone(),
            sources,
            destinations,
            distances_km,
            durations_minutes,
        })
    }
}
