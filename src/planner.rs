//! AI itinerary generation
//!
//! Resolves both ends of the trip, prices it with the [`CostEstimator`], asks
//! the primary model and then the fallback for an itinerary, and replaces any
//! model-invented prices with the calculated ones.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    TravelError,
    cache::PersistentCache,
    costs::{CostBreakdown, CostEstimator, CostRequest, TripCosts, known_city},
    llm::{
        Itinerary, ItineraryFormat, TextGenerator, parse_itinerary, parse_object,
        prompt::{EnhancementPrompt, ItineraryPrompt},
    },
    models::{BudgetTier, Coordinates, NewTripPlan, User, patch::tag_list},
    trips::TripPlanDetails,
    routing::MappingService,
    transport::TransportOptions,
};

pub const MAX_TRIP_DAYS: u32 = 30;
pub const MAX_TRAVELERS: u32 = 20;

fn default_days() -> u32 {
    3
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripPlanRequest {
    #[serde(default)]
    pub destination: String,
    #[serde(default = "default_days")]
    pub duration_days: u32,
    #[serde(default)]
    pub budget: BudgetTier,
    #[serde(default, deserialize_with = "tag_list")]
    pub interests: Vec<String>,
    #[serde(default = "one")]
    pub travelers: u32,
    pub start_date: Option<NaiveDate>,
    #[serde(alias = "user_home_city")]
    pub home_city: Option<String>,
    #[serde(alias = "user_home_country")]
    pub home_country: Option<String>,
    /// Known home point, skips geocoding the home city
    #[serde(skip)]
    pub home_point: Option<Coordinates>,
    /// Known destination point, e.g. from the catalog
    #[serde(skip)]
    pub destination_point: Option<Coordinates>,
}

impl TripPlanRequest {
    pub fn validate(&self) -> Result<(), TravelError> {
        if self.destination.trim().is_empty() {
            return Err(TravelError::validation("Destination is required"));
        }
        if !(1..=MAX_TRIP_DAYS).contains(&self.duration_days) {
            return Err(TravelError::validation(format!(
                "Duration must be between 1 and {MAX_TRIP_DAYS} days"
            )));
        }
        if !(1..=MAX_TRAVELERS).contains(&self.travelers) {
            return Err(TravelError::validation(format!(
                "Travelers must be between 1 and {MAX_TRAVELERS}"
            )));
        }
        Ok(())
    }

    /// Identical requests share a key regardless of case and interest order.
    /// Both resolved points and the start date are part of the key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut interests: Vec<String> = self
            .interests
            .iter()
            .map(|i| i.trim().to_lowercase())
            .collect();
        interests.sort();
        interests.dedup();
        let point = |p: Option<Coordinates>| {
            p.map(|p| {
                let (lat, lon) = p.rounded(3);
                format!("{lat:.3}:{lon:.3}")
            })
            .unwrap_or_default()
        };
        format!(
            "trip-plan:{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.destination.trim().to_lowercase(),
            self.duration_days,
            self.budget,
            interests.join(","),
            self.travelers,
            self.home_city
                .as_deref()
                .map(|c| c.trim().to_lowercase())
                .unwrap_or_default(),
            point(self.home_point),
            point(self.destination_point),
            self.start_date.map(|d| d.to_string()).unwrap_or_default(),
        )
    }
}

/// A generated itinerary with its calculated budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlanResult {
    pub destination: String,
    pub duration_days: u32,
    pub budget_category: BudgetTier,
    pub travelers: u32,
    pub format: ItineraryFormat,
    pub itinerary: Itinerary,
    pub estimated_costs: CostBreakdown,
    pub cost_details: TripCosts,
    pub cost_summary: String,
    pub travel_from_home: Option<TransportOptions>,
    pub distance_km: Option<f64>,
    pub destination_latitude: Option<f64>,
    pub destination_longitude: Option<f64>,
    pub generated_at: DateTime<Utc>,
    pub ai_generated: bool,
    pub provider: String,
    pub from_cache: bool,
    /// Set once the plan has been stored for the requesting user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_plan_id: Option<i64>,
}

impl TripPlanResult {
    /// Row for keeping this itinerary as a private trip plan
    pub fn to_new_plan(&self, start_date: Option<NaiveDate>) -> Result<NewTripPlan, TravelError> {
        let itinerary = serde_json::to_value(self)
            .map_err(|e| TravelError::general(format!("failed to encode itinerary: {e}")))?;
        let end_date = start_date.and_then(|start| {
            start.checked_add_days(chrono::Days::new(u64::from(self.duration_days.saturating_sub(1))))
        });
        Ok(NewTripPlan {
            title: format!("{}-day trip to {}", self.duration_days, self.destination),
            description: None,
            destination: self.destination.clone(),
            destination_id: None,
            start_date,
            end_date,
            budget: self.budget_category,
            travelers: self.travelers,
            estimated_total: Some(self.estimated_costs.total),
            currency: self.cost_details.currency.clone(),
            itinerary: Some(itinerary),
            max_participants: 1,
            is_collaborative: false,
        })
    }
}

/// Body of `POST /api/trip-plans/{id}/enhance`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnhanceRequest {
    /// Free-form preferences, usually keyed by collaborator
    #[serde(default)]
    pub preferences: serde_json::Value,
}

/// A saved plan reworked around the group's preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEnhancement {
    pub trip_plan_id: i64,
    pub format: ItineraryFormat,
    /// The model's JSON object, or its text when that could not be read
    pub enhanced_plan: serde_json::Value,
    pub collaborators_count: usize,
    pub provider: String,
    pub enhanced_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TripPlanner {
    mapping: MappingService,
    estimator: CostEstimator,
    primary: Option<Arc<dyn TextGenerator>>,
    fallback: Option<Arc<dyn TextGenerator>>,
    cache: PersistentCache,
    ttl: Duration,
}

impl std::fmt::Debug for TripPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripPlanner")
            .field("primary", &self.primary.as_ref().map(|g| g.name()))
            .field("fallback", &self.fallback.as_ref().map(|g| g.name()))
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TripPlanner {
    #[must_use]
    pub fn new(
        mapping: MappingService,
        estimator: CostEstimator,
        primary: Option<Arc<dyn TextGenerator>>,
        fallback: Option<Arc<dyn TextGenerator>>,
        cache: PersistentCache,
        ttl_minutes: u64,
    ) -> Self {
        Self {
            mapping,
            estimator,
            primary,
            fallback,
            cache,
            ttl: Duration::from_secs(ttl_minutes * 60),
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    #[instrument(skip(self, request), fields(destination = %request.destination, days = request.duration_days))]
    pub async fn generate(&self, request: &TripPlanRequest) -> Result<TripPlanResult, TravelError> {
        request.validate()?;
        if !self.is_available() {
            return Err(TravelError::unavailable("Trip planning"));
        }

        let key = request.cache_key();
        if let Some(mut cached) = self.cache.lookup::<TripPlanResult>(&key).await {
            tracing::info!("returning cached trip plan");
            cached.from_cache = true;
            return Ok(cached);
        }

        let destination = request.destination.trim();
        let (destination_point, home_point) = futures::join!(
            async {
                match request.destination_point {
                    Some(point) => Some(point),
                    None => self.locate(destination).await,
                }
            },
            async {
                match (request.home_point, request.home_city.as_deref()) {
                    (Some(point), _) => Some(point),
                    (None, Some(city)) if !city.trim().is_empty() => self.locate(city).await,
                    _ => None,
                }
            },
        );

        let costs = self.estimator.estimate(&CostRequest {
            destination,
            duration_days: request.duration_days,
            budget: request.budget,
            travelers: request.travelers,
            origin: home_point,
            destination_point,
        })?;
        tracing::info!(total = costs.cost_breakdown.total, currency = %costs.currency, "trip costs calculated");

        let prompt = ItineraryPrompt {
            destination,
            duration_days: request.duration_days,
            budget: request.budget,
            interests: &request.interests,
            travelers: request.travelers,
            start_date: request.start_date,
            home_city: request.home_city.as_deref(),
            home_country: request.home_country.as_deref(),
            costs: &costs,
        }
        .render();

        let (provider, text) = self.complete(&prompt).await?;
        let mut itinerary = parse_itinerary(&text);
        if let Itinerary::Structured(map) = &mut itinerary {
            // model prices are replaced by the calculated breakdown
            match serde_json::to_value(&costs.cost_breakdown) {
                Ok(value) => {
                    map.insert("estimated_costs".to_string(), value);
                }
                Err(e) => tracing::warn!(error = %e, "could not embed cost breakdown"),
            }
            map.remove("travel_from_home");
        }

        let result = TripPlanResult {
            destination: destination.to_string(),
            duration_days: request.duration_days,
            budget_category: request.budget,
            travelers: request.travelers,
            format: itinerary.format(),
            itinerary,
            estimated_costs: costs.cost_breakdown.clone(),
            cost_summary: costs.summary(),
            travel_from_home: costs.transportation_details.clone(),
            distance_km: costs.distance_km,
            destination_latitude: destination_point.map(|p| p.latitude),
            destination_longitude: destination_point.map(|p| p.longitude),
            cost_details: costs,
            generated_at: Utc::now(),
            ai_generated: true,
            provider: provider.to_string(),
            from_cache: false,
            saved_plan_id: None,
        };
        tracing::info!(provider, format = ?result.format, "trip plan generated");

        self.cache.store(&key, result.clone(), self.ttl).await;
        Ok(result)
    }

    /// Rework a saved plan around its other participants' preferences; never cached
    #[instrument(skip(self, details, user, request), fields(plan_id = details.plan.id, user_id = user.id))]
    pub async fn enhance(
        &self,
        details: &TripPlanDetails,
        user: &User,
        request: &EnhanceRequest,
    ) -> Result<PlanEnhancement, TravelError> {
        if !self.is_available() {
            return Err(TravelError::unavailable("Trip planning"));
        }
        let collaborators: Vec<String> = details
            .participants
            .iter()
            .filter(|p| p.user_id != user.id)
            .map(|p| p.email.clone())
            .collect();
        let prompt = EnhancementPrompt {
            plan: &details.plan,
            activities: &details.activities,
            collaborators: &collaborators,
            preferences: &request.preferences,
        }
        .render();

        let (provider, text) = self.complete(&prompt).await?;
        let (format, enhanced_plan) = match parse_object(&text) {
            Some(map) => (ItineraryFormat::Structured, serde_json::Value::Object(map)),
            None => {
                tracing::warn!(chars = text.len(), "enhancement is not JSON, keeping text");
                (ItineraryFormat::PlainText, serde_json::Value::String(text.trim().to_string()))
            }
        };
        tracing::info!(provider, ?format, collaborators = collaborators.len(), "trip plan enhanced");
        Ok(PlanEnhancement {
            trip_plan_id: details.plan.id,
            format,
            enhanced_plan,
            collaborators_count: collaborators.len(),
            provider: provider.to_string(),
            enhanced_at: Utc::now(),
        })
    }

    /// Adapter first, built-in city table second
    async fn locate(&self, place: &str) -> Option<Coordinates> {
        if self.mapping.is_available() {
            match self.mapping.geocode(place).await {
                Ok(found) => return Some(found.coordinates()),
                Err(e) => tracing::warn!(place, error = %e, "geocoding failed, using city table"),
            }
        }
        known_city(place)
    }

    /// Primary provider, then fallback; the last error wins
    async fn complete(&self, prompt: &str) -> Result<(&'static str, String), TravelError> {
        let mut last_error = None;
        for generator in [&self.primary, &self.fallback].into_iter().flatten() {
            match generator.generate(prompt).await {
                Ok(text) => return Ok((generator.name(), text)),
                Err(e) => {
                    tracing::warn!(provider = generator.name(), error = %e, "itinerary provider failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| TravelError::unavailable("Trip planning")))
    }
}
