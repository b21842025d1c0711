//! Trip cost estimation from cost-of-living data and transport rates

use serde::{Deserialize, Serialize};

use crate::{
    TravelError,
    models::{BudgetTier, Coordinates},
    transport::{RateTable, Recommendation, TransportOptions},
};

/// Relative cost of living, Mumbai = 100
const COST_OF_LIVING_INDEX: &[(&str, f64)] = &[
    // India
    ("mumbai", 100.0),
    ("delhi", 95.0),
    ("bangalore", 98.0),
    ("bengaluru", 98.0),
    ("chennai", 85.0),
    ("kolkata", 80.0),
    ("hyderabad", 90.0),
    ("pune", 92.0),
    ("ahmedabad", 80.0),
    ("jaipur", 75.0),
    ("goa", 110.0),
    ("kerala", 85.0),
    // Asia
    ("bangkok", 85.0),
    ("tokyo", 180.0),
    ("singapore", 165.0),
    ("hong kong", 170.0),
    ("seoul", 150.0),
    ("beijing", 120.0),
    ("shanghai", 130.0),
    ("kuala lumpur", 75.0),
    ("bali", 70.0),
    ("phuket", 80.0),
    ("hanoi", 65.0),
    ("ho chi minh", 70.0),
    ("dubai", 140.0),
    ("istanbul", 90.0),
    ("manila", 70.0),
    // Europe
    ("london", 190.0),
    ("paris", 180.0),
    ("rome", 160.0),
    ("barcelona", 155.0),
    ("amsterdam", 175.0),
    ("berlin", 165.0),
    ("vienna", 160.0),
    ("prague", 120.0),
    ("budapest", 100.0),
    ("madrid", 150.0),
    ("lisbon", 130.0),
    ("athens", 120.0),
    // Americas
    ("new york", 200.0),
    ("los angeles", 185.0),
    ("san francisco", 195.0),
    ("chicago", 170.0),
    ("miami", 165.0),
    ("toronto", 170.0),
    ("vancouver", 175.0),
    ("mexico city", 85.0),
    ("cancun", 95.0),
    ("rio de janeiro", 90.0),
    ("buenos aires", 80.0),
    ("lima", 75.0),
    // Oceania
    ("sydney", 180.0),
    ("melbourne", 175.0),
    ("auckland", 170.0),
    // Africa
    ("cape town", 95.0),
    ("cairo", 70.0),
    ("marrakech", 75.0),
    ("nairobi", 80.0),
];

/// Offline coordinates used when the geocoder is unavailable
const CITY_COORDINATES: &[(&str, f64, f64)] = &[
    ("mumbai", 19.0760, 72.8777),
    ("delhi", 28.7041, 77.1025),
    ("bangalore", 12.9716, 77.5946),
    ("bengaluru", 12.9716, 77.5946),
    ("chennai", 13.0827, 80.2707),
    ("kolkata", 22.5726, 88.3639),
    ("hyderabad", 17.3850, 78.4867),
    ("pune", 18.5204, 73.8567),
    ("ahmedabad", 23.0225, 72.5714),
    ("jaipur", 26.9124, 75.7873),
    ("goa", 15.2993, 74.1240),
    ("kerala", 10.8505, 76.2711),
    ("bangkok", 13.7563, 100.5018),
    ("tokyo", 35.6762, 139.6503),
    ("singapore", 1.3521, 103.8198),
    ("hong kong", 22.3193, 114.1694),
    ("seoul", 37.5665, 126.9780),
    ("beijing", 39.9042, 116.4074),
    ("shanghai", 31.2304, 121.4737),
    ("kuala lumpur", 3.1390, 101.6869),
    ("bali", -8.3405, 115.0920),
    ("dubai", 25.2048, 55.2708),
    ("london", 51.5074, -0.1278),
    ("paris", 48.8566, 2.3522),
    ("rome", 41.9028, 12.4964),
    ("barcelona", 41.3851, 2.1734),
    ("amsterdam", 52.3676, 4.9041),
    ("berlin", 52.5200, 13.4050),
    ("new york", 40.7128, -74.0060),
    ("los angeles", 34.0522, -118.2437),
    ("san francisco", 37.7749, -122.4194),
    ("miami", 25.7617, -80.1918),
    ("toronto", 43.6532, -79.3832),
];

// Mid-range daily spend in a city with index 100
const BASE_ACCOMMODATION: f64 = 2000.0;
const BASE_FOOD: f64 = 800.0;
const BASE_LOCAL_TRANSPORT: f64 = 400.0;
const BASE_ACTIVITIES: f64 = 500.0;
const MISC_SHARE: f64 = 0.10;

/// Exact match first, then substring in either direction
fn lookup<'a, T>(table: &'a [(&'static str, T)], place: &str) -> Option<&'a T> {
    let needle = place.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    table
        .iter()
        .find(|(city, _)| *city == needle)
        .or_else(|| {
            table
                .iter()
                .find(|(city, _)| needle.contains(city) || city.contains(needle.as_str()))
        })
        .map(|(_, value)| value)
}

/// Cost-of-living factor relative to the base city, 1.0 when unknown
#[must_use]
pub fn cost_index(destination: &str) -> f64 {
    lookup(COST_OF_LIVING_INDEX, destination).map_or(1.0, |index| index / 100.0)
}

/// Coordinates from the built-in city table
#[must_use]
pub fn known_city(place: &str) -> Option<Coordinates> {
    let needle = place.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    CITY_COORDINATES
        .iter()
        .find(|(city, _, _)| *city == needle)
        .or_else(|| {
            CITY_COORDINATES
                .iter()
                .find(|(city, _, _)| needle.contains(city) || city.contains(needle.as_str()))
        })
        .map(|&(_, latitude, longitude)| Coordinates {
            latitude,
            longitude,
        })
}

/// Per-day spend at a destination for one traveler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCosts {
    pub accommodation_per_night: f64,
    pub food_per_day: f64,
    pub local_transport_per_day: f64,
    pub activities_per_day: f64,
    pub total_per_day: f64,
}

impl DailyCosts {
    #[must_use]
    pub fn for_destination(destination: &str, budget: BudgetTier) -> Self {
        let factor = cost_index(destination) * budget.cost_multiplier();
        let accommodation_per_night = (BASE_ACCOMMODATION * factor).round();
        let food_per_day = (BASE_FOOD * factor).round();
        let local_transport_per_day = (BASE_LOCAL_TRANSPORT * factor).round();
        let activities_per_day = (BASE_ACTIVITIES * factor).round();
        Self {
            accommodation_per_night,
            food_per_day,
            local_transport_per_day,
            activities_per_day,
            total_per_day: accommodation_per_night
                + food_per_day
                + local_transport_per_day
                + activities_per_day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub accommodation: f64,
    pub food: f64,
    pub transportation_local: f64,
    pub transportation_to_destination: f64,
    pub activities: f64,
    pub miscellaneous: f64,
    pub total: f64,
}

/// Everything needed to estimate a trip
#[derive(Debug, Clone)]
pub struct CostRequest<'a> {
    pub destination: &'a str,
    pub duration_days: u32,
    pub budget: BudgetTier,
    pub travelers: u32,
    pub origin: Option<Coordinates>,
    pub destination_point: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripCosts {
    pub destination: String,
    pub duration_days: u32,
    pub budget_category: BudgetTier,
    pub travelers: u32,
    pub currency: String,
    pub cost_breakdown: CostBreakdown,
    pub per_person_cost: f64,
    pub daily_breakdown: DailyCosts,
    pub cost_index: f64,
    pub distance_km: Option<f64>,
    pub transportation_details: Option<TransportOptions>,
}

impl TripCosts {
    /// Short human summary, used in prompts and plain-text itineraries
    #[must_use]
    pub fn summary(&self) -> String {
        let c = &self.cost_breakdown;
        let mut text = format!(
            "Estimated costs for {} ({} days, {} traveler(s), {}):\n\
             - Accommodation: {} {:.0}\n\
             - Food: {} {:.0}\n\
             - Local transport: {} {:.0}\n\
             - Activities: {} {:.0}\n",
            self.destination,
            self.duration_days,
            self.travelers,
            self.budget_category,
            self.currency,
            c.accommodation,
            self.currency,
            c.food,
            self.currency,
            c.transportation_local,
            self.currency,
            c.activities,
        );
        if c.transportation_to_destination > 0.0
            && let Some(details) = &self.transportation_details
            && let Some(mode) = details.recommended_mode
        {
            text.push_str(&format!(
                "- Travel to destination: {} {:.0} (round trip by {}, {:.1} km)\n",
                self.currency,
                c.transportation_to_destination,
                mode.as_str(),
                details.distance_km
            ));
        }
        text.push_str(&format!(
            "- Miscellaneous: {} {:.0}\nTotal: {} {:.0} ({} {:.0} per person)",
            self.currency, c.miscellaneous, self.currency, c.total, self.currency, self.per_person_cost
        ));
        text
    }
}

/// Estimates trip budgets; transport is priced through the rate table
#[derive(Debug, Clone)]
pub struct CostEstimator {
    rates: RateTable,
}

impl CostEstimator {
    #[must_use]
    pub fn new(rates: RateTable) -> Self {
        Self { rates }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn estimate(&self, request: &CostRequest<'_>) -> Result<TripCosts, TravelError> {
        if request.duration_days == 0 {
            return Err(TravelError::validation("Trip must last at least one day"));
        }
        if request.travelers == 0 {
            return Err(TravelError::validation("At least one traveler is required"));
        }

        let daily = DailyCosts::for_destination(request.destination, request.budget);
        let days = f64::from(request.duration_days);
        let travelers = f64::from(request.travelers);
        let nights = f64::from(request.duration_days.saturating_sub(1).max(1));

        let accommodation = daily.accommodation_per_night * nights * travelers;
        let food = daily.food_per_day * days * travelers;
        let transportation_local = daily.local_transport_per_day * days * travelers;
        let activities = daily.activities_per_day * days * travelers;

        let transport = match (request.origin, request.destination_point) {
            (Some(from), Some(to)) => Some(self.rates.score_between(&from, &to)?),
            _ => None,
        };
        let transportation_to_destination = match transport.as_ref().map(|t| t.recommendation()) {
            Some(Recommendation::Mode(option)) => option.round_trip_cost * travelers,
            Some(Recommendation::NoOptions) => {
                tracing::warn!(destination = request.destination, "no transport mode applies");
                0.0
            }
            None => 0.0,
        };

        let miscellaneous =
            ((accommodation + food + transportation_local + activities) * MISC_SHARE).round();
        let total = accommodation
            + food
            + transportation_local
            + activities
            + transportation_to_destination
            + miscellaneous;

        Ok(TripCosts {
            destination: request.destination.to_string(),
            duration_days: request.duration_days,
            budget_category: request.budget,
            travelers: request.travelers,
            currency: self.rates.currency.clone(),
            cost_breakdown: CostBreakdown {
                accommodation: accommodation.round(),
                food: food.round(),
                transportation_local: transportation_local.round(),
                transportation_to_destination: transportation_to_destination.round(),
                activities: activities.round(),
                miscellaneous,
                total: total.round(),
            },
            per_person_cost: (total / travelers).round(),
            daily_breakdown: daily,
            cost_index: cost_index(request.destination),
            distance_km: transport.as_ref().map(|t| t.distance_km),
            transportation_details: transport,
        })
    }
}
