//! OpenRouteService client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{
    IsochronePolygon, IsochroneRequest, Isochrones, MappingProvider, Matrix, MatrixRequest, Place,
    Profile, Route, RouteAlternative, RouteRequest, RouteStep,
};
use crate::{
    TravelError,
    config::MappingConfig,
    http::{build_client, read_json, send_error, trim_base_url},
    models::Coordinates,
};

const SERVICE: &str = "OpenRouteService";

pub struct OpenRouteClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenRouteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouteClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenRouteClient {
    /// `None` when no API key is configured
    pub fn from_config(config: &MappingConfig) -> Result<Option<Self>, TravelError> {
        let Some(api_key) = config.api_key.as_ref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let timeout = Duration::from_secs(config.timeout_seconds);
        Ok(Some(Self {
            client: build_client(timeout, config.max_retries)?,
            base_url: trim_base_url(&config.base_url),
            api_key: api_key.trim().to_string(),
            timeout,
        }))
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<T, TravelError> {
        tracing::debug!(%url, "calling the API");
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.api_key)
            .header(ACCEPT, "application/json, application/geo+json")
            .send()
            .await
            .map_err(|e| send_error(SERVICE, self.timeout, e))?;
        read_json(SERVICE, self.timeout, response).await
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        body: &B,
    ) -> Result<T, TravelError> {
        tracing::debug!(%url, "calling the API");
        let body = serde_json::to_vec(body)
            .map_err(|e| TravelError::general(format!("failed to encode request: {e}")))?;
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, &self.api_key)
            .header(ACCEPT, "application/json, application/geo+json")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, self.timeout, e))?;
        read_json(SERVICE, self.timeout, response).await
    }
}

#[async_trait]
impl MappingProvider for OpenRouteClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    #[instrument(skip(self))]
    async fn search(&self, text: &str, size: usize) -> Result<Vec<Place>, TravelError> {
        let url = format!(
            "{}/geocode/search?text={}&size={size}",
            self.base_url,
            urlencoding::encode(text)
        );
        let response: GeocodeResponse = self.get(url).await?;
        Ok(response.into_places())
    }

    #[instrument(skip(self))]
    async fn reverse(&self, point: Coordinates) -> Result<Vec<Place>, TravelError> {
        let url = format!(
            "{}/geocode/reverse?point.lon={}&point.lat={}&size=1",
            self.base_url, point.longitude, point.latitude
        );
        let response: GeocodeResponse = self.get(url).await?;
        Ok(response.into_places())
    }

    #[instrument(skip(self), fields(profile = %request.profile))]
    async fn route(&self, request: &RouteRequest) -> Result<Route, TravelError> {
        let url = format!(
            "{}/v2/directions/{}/geojson",
            self.base_url,
            request.profile.as_str()
        );
        let body = DirectionsBody {
            coordinates: [request.start.to_lon_lat(), request.end.to_lon_lat()],
            instructions: true,
            language: &request.language,
            units: "m",
            alternative_routes: (request.alternatives > 0).then_some(AlternativeRoutes {
                target_count: request.alternatives,
            }),
        };
        let response: DirectionsResponse = self.post(url, &body).await?;
        let route = response.into_route(request.profile)?;
        tracing::info!(
            distance_km = route.distance_km,
            duration_minutes = route.duration_minutes,
            "route computed"
        );
        Ok(route)
    }

    #[instrument(skip(self), fields(profile = %request.profile))]
    async fn isochrones(&self, request: &IsochroneRequest) -> Result<Isochrones, TravelError> {
        let url = format!(
            "{}/v2/isochrones/{}",
            self.base_url,
            request.profile.as_str()
        );
        let body = IsochronesBody {
            locations: [request.center.to_lon_lat()],
            range: &request.ranges,
            range_type: request.range_type.as_str(),
            attributes: ["area"],
            area_units: "km",
        };
        let response: IsochronesResponse = self.post(url, &body).await?;
        Ok(Isochrones {
            center: request.center,
            profile: request.profile,
            range_type: request.range_type,
            polygons: response.into_polygons(request.center),
        })
    }

    #[instrument(skip(self, request), fields(profile = %request.profile, locations = request.locations.len()))]
    async fn matrix(&self, request: &MatrixRequest) -> Result<Matrix, TravelError> {
        let url = format!("{}/v2/matrix/{}", self.base_url, request.profile.as_str());
        let body = MatrixBody {
            locations: request.locations.iter().map(Coordinates::to_lon_lat).collect(),
            metrics: ["distance", "duration"],
            units: "km",
            sources: request.sources.as_deref(),
            destinations: request.destinations.as_deref(),
        };
        let response: MatrixResponse = self.post(url, &body).await?;
        tracing::info!(locations = request.locations.len(), "matrix computed");
        Ok(response.into_matrix(request))
    }
}

#[derive(Serialize)]
struct DirectionsBody<'a> {
    coordinates: [[f64; 2]; 2],
    instructions: bool,
    language: &'a str,
    units: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    alternative_routes: Option<AlternativeRoutes>,
}

#[derive(Serialize)]
struct AlternativeRoutes {
    target_count: u8,
}

#[derive(Serialize)]
struct IsochronesBody<'a> {
    locations: [[f64; 2]; 1],
    range: &'a [f64],
    range_type: &'static str,
    attributes: [&'static str; 1],
    area_units: &'static str,
}

#[derive(Serialize)]
struct MatrixBody<'a> {
    locations: Vec<[f64; 2]>,
    metrics: [&'static str; 2],
    units: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<&'a [usize]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destinations: Option<&'a [usize]>,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    /// Kilometres
    #[serde(default)]
    distances: Vec<Vec<Option<f64>>>,
    /// Seconds
    #[serde(default)]
    durations: Vec<Vec<Option<f64>>>,
}

impl MatrixResponse {
    fn into_matrix(self, request: &MatrixRequest) -> Matrix {
        let minutes = self
            .durations
            .into_iter()
            .map(|row| row.into_iter().map(|d| d.map(|s| round1(s / 60.0))).collect())
            .collect();
        Matrix {
            profile: request.profile,
            locations: request.locations.clone(),
            sources: request.source_indices(),
            destinations: request.destination_indices(),
            distances_km: self.distances,
            durations_minutes: minutes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    features: Vec<GeocodeFeature>,
}

#[derive(Debug, Deserialize)]
struct GeocodeFeature {
    geometry: PointGeometry,
    #[serde(default)]
    properties: GeocodeProperties,
}

#[derive(Debug, Deserialize)]
struct PointGeometry {
    coordinates: [f64; 2],
}

#[derive(Debug, Default, Deserialize)]
struct GeocodeProperties {
    label: Option<String>,
    name: Option<String>,
    country: Option<String>,
    region: Option<String>,
    locality: Option<String>,
    street: Option<String>,
    postalcode: Option<String>,
    confidence: Option<f64>,
}

impl GeocodeResponse {
    fn into_places(self) -> Vec<Place> {
        self.features
            .into_iter()
            .map(|feature| {
                let [longitude, latitude] = feature.geometry.coordinates;
                let p = feature.properties;
                let name = p.name.unwrap_or_default();
                Place {
                    label: p.label.unwrap_or_else(|| name.clone()),
                    name,
                    latitude,
                    longitude,
                    country: p.country,
                    region: p.region,
                    locality: p.locality,
                    street: p.street,
                    postal_code: p.postalcode,
                    confidence: p.confidence.unwrap_or(0.0),
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<RouteFeature>,
}

#[derive(Debug, Deserialize)]
struct RouteFeature {
    bbox: Option<Vec<f64>>,
    properties: RouteProperties,
    geometry: LineGeometry,
}

#[derive(Debug, Deserialize)]
struct LineGeometry {
    coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct RouteProperties {
    #[serde(default)]
    segments: Vec<Segment>,
    summary: Summary,
    ascent: Option<f64>,
    descent: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct Segment {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default, rename = "type")]
    step_type: u32,
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    way_points: Vec<usize>,
}

/// GeoJSON positions may carry elevation as a third value
fn lon_lat(position: &[f64]) -> Option<[f64; 2]> {
    match position {
        [lon, lat, ..] => Some([*lon, *lat]),
        _ => None,
    }
}

fn line(geometry: &LineGeometry) -> Result<Vec<[f64; 2]>, TravelError> {
    geometry
        .coordinates
        .iter()
        .map(|p| lon_lat(p))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| TravelError::invalid_response(SERVICE, "route position without lon/lat"))
}

impl DirectionsResponse {
    fn into_route(self, profile: Profile) -> Result<Route, TravelError> {
        let mut features = self.features.into_iter();
        let main = features
            .next()
            .ok_or_else(|| TravelError::not_found("No route found between these points"))?;

        let summary = &main.properties.summary;
        let steps = main
            .properties
            .segments
            .iter()
            .flat_map(|segment| &segment.steps)
            .map(|step| RouteStep {
                instruction: step.instruction.clone(),
                distance_km: step.distance / 1000.0,
                duration_seconds: step.duration,
                step_type: step.step_type,
                name: step.name.clone(),
                way_points: step.way_points.clone(),
            })
            .collect();

        let alternatives = features
            .map(|alt| {
                Ok(RouteAlternative {
                    distance_km: alt.properties.summary.distance / 1000.0,
                    duration_minutes: round1(alt.properties.summary.duration / 60.0),
                    coordinates: line(&alt.geometry)?,
                })
            })
            .collect::<Result<Vec<_>, TravelError>>()?;

        Ok(Route {
            distance_km: summary.distance / 1000.0,
            duration_seconds: summary.duration,
            duration_minutes: round1(summary.duration / 60.0),
            duration_hours: (summary.duration / 3600.0 * 100.0).round() / 100.0,
            profile,
            coordinates: line(&main.geometry)?,
            steps,
            bbox: main.bbox,
            ascent: main.properties.ascent.unwrap_or(0.0),
            descent: main.properties.descent.unwrap_or(0.0),
            alternatives,
        })
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Deserialize)]
struct IsochronesResponse {
    #[serde(default)]
    features: Vec<IsochroneFeature>,
}

#[derive(Debug, Deserialize)]
struct IsochroneFeature {
    properties: IsochroneProperties,
    geometry: PolygonGeometry,
}

#[derive(Debug, Deserialize)]
struct IsochroneProperties {
    #[serde(default)]
    value: f64,
    center: Option<Vec<f64>>,
    area: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PolygonGeometry {
    #[serde(default)]
    coordinates: Vec<Vec<Vec<f64>>>,
}

impl IsochronesResponse {
    fn into_polygons(self, center: Coordinates) -> Vec<IsochronePolygon> {
        self.features
            .into_iter()
            .map(|feature| IsochronePolygon {
                value: feature.properties.value,
                center: feature
                    .properties
                    .center
                    .as_deref()
                    .and_then(lon_lat)
                    .unwrap_or_else(|| center.to_lon_lat()),
                coordinates: feature
                    .geometry
                    .coordinates
                    .iter()
                    .map(|ring| ring.iter().filter_map(|p| lon_lat(p)).collect())
                    .collect(),
                area_km2: feature.properties.area.unwrap_or(0.0),
            })
            .collect()
    }
}
