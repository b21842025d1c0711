//! The shared destination catalog

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::Coordinates;
use super::patch::{lenient_f64, patch_field, patch_tags, tag_list};
use crate::TravelError;

/// Spending level of a trip or destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetTier {
    Budget,
    #[default]
    #[serde(alias = "midrange", alias = "mid_range", alias = "mid", alias = "moderate")]
    MidRange,
    Luxury,
}

impl BudgetTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::MidRange => "mid-range",
            Self::Luxury => "luxury",
        }
    }

    /// Multiplier applied to mid-range base costs
    #[must_use]
    pub fn cost_multiplier(self) -> f64 {
        match self {
            Self::Budget => 0.6,
            Self::MidRange => 1.0,
            Self::Luxury => 2.5,
        }
    }

    #[must_use]
    pub fn food_multiplier(self) -> f64 {
        match self {
            Self::Budget => 0.7,
            Self::MidRange => 1.0,
            Self::Luxury => 2.0,
        }
    }
}

impl fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetTier {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "budget" | "low" => Ok(Self::Budget),
            "mid-range" | "midrange" | "mid_range" | "mid" | "moderate" | "medium" => {
                Ok(Self::MidRange)
            }
            "luxury" | "high" => Ok(Self::Luxury),
            other => Err(TravelError::validation(format!(
                "Unknown budget '{other}'. Use budget, mid-range or luxury."
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub budget_tier: Option<BudgetTier>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub website: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub average_cost_per_day: Option<f64>,
    pub best_time_to_visit: Option<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub popularity_score: f64,
    pub tags: Vec<String>,
    pub estimated_duration_hours: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Destination {
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// Case-insensitive tag membership
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        let needle = tag.trim().to_lowercase();
        !needle.is_empty() && self.tags.iter().any(|t| t.to_lowercase() == needle)
    }

    /// Popularity derived from rating and review volume; unrated counts as 3
    #[must_use]
    pub fn computed_popularity(&self) -> f64 {
        let rating = self.rating.unwrap_or(3.0);
        let review_weight = (f64::from(self.review_count) / 100.0).min(1.0);
        rating * 0.5 + review_weight * 0.3 + 0.2
    }
}

/// Body of `POST /api/destinations`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationInput {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub budget_tier: Option<BudgetTier>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    pub website: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub average_cost_per_day: Option<f64>,
    pub best_time_to_visit: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub estimated_duration_hours: Option<f64>,
}

impl DestinationInput {
    /// Trim text fields and turn empty strings into `None`
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        for field in [
            &mut self.description,
            &mut self.category,
            &mut self.website,
            &mut self.country,
            &mut self.city,
            &mut self.best_time_to_visit,
        ] {
            *field = field
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        self
    }

    pub fn validate(&self) -> Result<(), TravelError> {
        if self.title.trim().is_empty() {
            return Err(TravelError::validation("Title is required"));
        }
        validate_fields(
            &self.title,
            self.latitude,
            self.longitude,
            self.rating,
            self.average_cost_per_day,
            self.website.as_deref(),
        )
    }
}

/// Body of `PUT /api/destinations/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "patch_field")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub budget_tier: Option<Option<BudgetTier>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub longitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub website: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub country: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub average_cost_per_day: Option<Option<f64>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub best_time_to_visit: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub rating: Option<Option<f64>>,
    pub review_count: Option<u32>,
    #[serde(default, deserialize_with = "patch_tags")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub estimated_duration_hours: Option<Option<f64>>,
}

impl DestinationPatch {
    /// Apply the patch onto an existing row and validate the result
    pub fn apply(self, destination: &mut Destination) -> Result<(), TravelError> {
        if let Some(title) = self.title {
            destination.title = title.trim().to_string();
        }
        macro_rules! assign {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field {
                    destination.$field = value;
                })*
            };
        }
        assign!(
            description,
            category,
            budget_tier,
            latitude,
            longitude,
            website,
            country,
            city,
            average_cost_per_day,
            best_time_to_visit,
            rating,
            estimated_duration_hours
        );
        if let Some(count) = self.review_count {
            destination.review_count = count;
        }
        if let Some(tags) = self.tags {
            destination.tags = tags;
        }

        if destination.title.is_empty() {
            return Err(TravelError::validation("Title cannot be empty"));
        }
        validate_fields(
            &destination.title,
            destination.latitude,
            destination.longitude,
            destination.rating,
            destination.average_cost_per_day,
            destination.website.as_deref(),
        )
    }
}

fn validate_fields(
    title: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    rating: Option<f64>,
    cost: Option<f64>,
    website: Option<&str>,
) -> Result<(), TravelError> {
    if title.chars().count() > 200 {
        return Err(TravelError::validation("Title must be at most 200 characters"));
    }
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => {
            Coordinates::new(latitude, longitude)?;
        }
        (None, None) => {}
        _ => {
            return Err(TravelError::validation(
                "Latitude and longitude must be provided together",
            ));
        }
    }
    if let Some(rating) = rating
        && !(0.0..=5.0).contains(&rating)
    {
        return Err(TravelError::validation("Rating must be between 0 and 5"));
    }
    if let Some(cost) = cost
        && cost < 0.0
    {
        return Err(TravelError::validation("Average cost per day cannot be negative"));
    }
    if let Some(website) = website
        && !website.starts_with("http://")
        && !website.starts_with("https://")
    {
        return Err(TravelError::validation("Website must start with http:// or https://"));
    }
    Ok(())
}
