//! Geocoding, directions and isochrones
//!
//! [`MappingProvider`] is the seam to the upstream mapping API;
//! [`MappingService`] adds validation, caching and the request shapes the
//! HTTP layer needs.

pub mod openroute;
pub mod service;
pub mod stub;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{TravelError, models::Coordinates};

pub use openroute::OpenRouteClient;
pub use service::MappingService;
pub use stub::StubMappingProvider;

/// Travel profiles understood by the routing engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    #[default]
    DrivingCar,
    DrivingHgv,
    CyclingRegular,
    CyclingRoad,
    CyclingMountain,
    CyclingElectric,
    FootWalking,
    FootHiking,
    Wheelchair,
}

impl Profile {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DrivingCar => "driving-car",
            Self::DrivingHgv => "driving-hgv",
            Self::CyclingRegular => "cycling-regular",
            Self::CyclingRoad => "cycling-road",
            Self::CyclingMountain => "cycling-mountain",
            Self::CyclingElectric => "cycling-electric",
            Self::FootWalking => "foot-walking",
            Self::FootHiking => "foot-hiking",
            Self::Wheelchair => "wheelchair",
        }
    }

    /// "driving-car" -> "Driving Car"
    #[must_use]
    pub fn title(self) -> String {
        self.as_str()
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A geocoding candidate or reverse-geocoding match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub label: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub region: Option<String>,
    pub locality: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub confidence: f64,
}

impl Place {
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub start: Coordinates,
    pub end: Coordinates,
    pub profile: Profile,
    /// Alternative routes to ask for, at most 3
    pub alternatives: u8,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance_km: f64,
    pub duration_seconds: f64,
    #[serde(rename = "type")]
    pub step_type: u32,
    pub name: String,
    pub way_points: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAlternative {
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub coordinates: Vec<[f64; 2]>,
}

/// A computed route; coordinates are `[lon, lat]` pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub distance_km: f64,
    pub duration_seconds: f64,
    pub duration_minutes: f64,
    pub duration_hours: f64,
    pub profile: Profile,
    pub coordinates: Vec<[f64; 2]>,
    pub steps: Vec<RouteStep>,
    pub bbox: Option<Vec<f64>>,
    pub ascent: f64,
    pub descent: f64,
    pub alternatives: Vec<RouteAlternative>,
}

impl Route {
    /// Route of length zero at a single point
    #[must_use]
    pub fn stationary(point: Coordinates, profile: Profile) -> Self {
        Self {
            distance_km: 0.0,
            duration_seconds: 0.0,
            duration_minutes: 0.0,
            duration_hours: 0.0,
            profile,
            coordinates: vec![point.to_lon_lat()],
            steps: Vec::new(),
            bbox: None,
            ascent: 0.0,
            descent: 0.0,
            alternatives: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeType {
    /// Seconds
    #[default]
    Time,
    /// Metres
    Distance,
}

impl RangeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Distance => "distance",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneRequest {
    pub center: Coordinates,
    pub profile: Profile,
    pub range_type: RangeType,
    pub ranges: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochronePolygon {
    /// The range value this polygon was computed for
    pub value: f64,
    pub center: [f64; 2],
    /// Outer ring first, `[lon, lat]` pairs
    pub coordinates: Vec<Vec<[f64; 2]>>,
    /// Area in square kilometres
    pub area_km2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isochrones {
    pub center: Coordinates,
    pub profile: Profile,
    pub range_type: RangeType,
    pub polygons: Vec<IsochronePolygon>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRequest {
    pub locations: Vec<Coordinates>,
    pub profile: Profile,
    /// Row indices into `locations`, all when `None`
    pub sources: Option<Vec<usize>>,
    /// Column indices into `locations`, all when `None`
    pub destinations: Option<Vec<usize>>,
}

impl MatrixRequest {
    fn indices(selected: Option<&Vec<usize>>, len: usize) -> Vec<usize> {
        selected.cloned().unwrap_or_else(|| (0..len).collect())
    }

    #[must_use]
    pub fn source_indices(&self) -> Vec<usize> {
        Self::indices(self.sources.as_ref(), self.locations.len())
    }

    #[must_use]
    pub fn destination_indices(&self) -> Vec<usize> {
        Self::indices(self.destinations.as_ref(), self.locations.len())
    }
}

/// Travel distances and durations, one row per source; unreachable pairs are `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub profile: Profile,
    pub locations: Vec<Coordinates>,
    pub sources: Vec<usize>,
    pub destinations: Vec<usize>,
    pub distances_km: Vec<Vec<Option<f64>>>,
    pub durations_minutes: Vec<Vec<Option<f64>>>,
}

impl Matrix {
    /// Distance and duration from the first source to column `index`
    #[must_use]
    pub fn from_first_source(&self, index: usize) -> (Option<f64>, Option<f64>) {
        let cell = |rows: &[Vec<Option<f64>>]| rows.first().and_then(|row| row.get(index).copied().flatten());
        (cell(&self.distances_km), cell(&self.durations_minutes))
    }
}

/// Upstream mapping API
#[async_trait]
pub trait MappingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ranked candidates for free text
    async fn search(&self, text: &str, size: usize) -> Result<Vec<Place>, TravelError>;

    /// Nearest addresses to a point, best first
    async fn reverse(&self, point: Coordinates) -> Result<Vec<Place>, TravelError>;

    async fn route(&self, request: &RouteRequest) -> Result<Route, TravelError>;

    async fn isochrones(&self, request: &IsochroneRequest) -> Result<Isochrones, TravelError>;

    async fn matrix(&self, request: &MatrixRequest) -> Result<Matrix, TravelError>;
}
