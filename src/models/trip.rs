//! Trip plans, their participants and planned activities

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::destination::BudgetTier;
use super::patch::{lenient_f64, patch_field};
use crate::TravelError;

pub const MAX_PARTICIPANTS_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Creator,
    Editor,
    Participant,
    Viewer,
}

impl ParticipantRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Editor => "editor",
            Self::Participant => "participant",
            Self::Viewer => "viewer",
        }
    }

    /// Creators and editors may change metadata and add activities
    #[must_use]
    pub fn can_edit(self) -> bool {
        matches!(self, Self::Creator | Self::Editor)
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creator" => Ok(Self::Creator),
            "editor" => Ok(Self::Editor),
            "participant" => Ok(Self::Participant),
            "viewer" => Ok(Self::Viewer),
            other => Err(TravelError::validation(format!("Unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlan {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub destination: String,
    pub destination_id: Option<i64>,
    pub creator_id: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: BudgetTier,
    pub travelers: u32,
    pub estimated_total: Option<f64>,
    pub currency: String,
    /// Generated itinerary document, fixed once stored
    pub itinerary: Option<serde_json::Value>,
    pub max_participants: u32,
    pub is_collaborative: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row to insert for a new plan
#[derive(Debug, Clone, Deserialize)]
pub struct NewTripPlan {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub destination: String,
    pub destination_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub budget: BudgetTier,
    #[serde(default = "one")]
    pub travelers: u32,
    #[serde(skip)]
    pub estimated_total: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(skip)]
    pub itinerary: Option<serde_json::Value>,
    #[serde(default = "default_max_participants")]
    pub max_participants: u32,
    #[serde(default = "yes")]
    pub is_collaborative: bool,
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_max_participants() -> u32 {
    10
}

impl NewTripPlan {
    pub fn validate(&self) -> Result<(), TravelError> {
        if self.title.trim().is_empty() {
            return Err(TravelError::validation("Title is required"));
        }
        if self.destination.trim().is_empty() && self.destination_id.is_none() {
            return Err(TravelError::validation("Destination is required"));
        }
        validate_dates(self.start_date, self.end_date)?;
        validate_max_participants(self.max_participants)?;
        if self.travelers == 0 || self.travelers > 20 {
            return Err(TravelError::validation("Travelers must be between 1 and 20"));
        }
        Ok(())
    }
}

/// Metadata edit; the itinerary itself cannot be changed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripPlanUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "patch_field")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub end_date: Option<Option<NaiveDate>>,
    pub max_participants: Option<u32>,
    pub is_collaborative: Option<bool>,
}

impl TripPlanUpdate {
    pub fn apply(self, plan: &mut TripPlan) -> Result<(), TravelError> {
        if let Some(title) = self.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(TravelError::validation("Title cannot be empty"));
            }
            plan.title = title;
        }
        if let Some(description) = self.description {
            plan.description = description;
        }
        if let Some(start) = self.start_date {
            plan.start_date = start;
        }
        if let Some(end) = self.end_date {
            plan.end_date = end;
        }
        if let Some(max) = self.max_participants {
            validate_max_participants(max)?;
            plan.max_participants = max;
        }
        if let Some(collaborative) = self.is_collaborative {
            plan.is_collaborative = collaborative;
        }
        validate_dates(plan.start_date, plan.end_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripParticipant {
    pub trip_plan_id: i64,
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripActivity {
    pub id: i64,
    pub trip_plan_id: i64,
    pub destination_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub activity_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub cost: Option<f64>,
    pub category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/trip-plans/{id}/activities`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityInput {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub destination_id: Option<i64>,
    pub activity_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cost: Option<f64>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
}

impl ActivityInput {
    pub fn validate(&self) -> Result<(), TravelError> {
        if self.title.trim().is_empty() {
            return Err(TravelError::validation("Activity title is required"));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time)
            && end < start
        {
            return Err(TravelError::validation("Activity ends before it starts"));
        }
        if let Some(cost) = self.cost
            && cost < 0.0
        {
            return Err(TravelError::validation("Activity cost cannot be negative"));
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                super::Coordinates::new(lat, lon)?;
                Ok(())
            }
            (None, None) => Ok(()),
            _ => Err(TravelError::validation(
                "Latitude and longitude must be provided together",
            )),
        }
    }
}

fn validate_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), TravelError> {
    if let (Some(start), Some(end)) = (start, end)
        && end < start
    {
        return Err(TravelError::validation("End date cannot be before start date"));
    }
    Ok(())
}

fn validate_max_participants(max: u32) -> Result<(), TravelError> {
    if max == 0 || max > MAX_PARTICIPANTS_LIMIT {
        return Err(TravelError::validation(format!(
            "Max participants must be between 1 and {MAX_PARTICIPANTS_LIMIT}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn plan() -> TripPlan {
        TripPlan {
            id: 1,
            title: "Goa getaway".into(),
            description: None,
            destination: "Goa".into(),
            destination_id: None,
            creator_id: 1,
            start_date: NaiveDate::from_ymd_opt(2026, 12, 20),
            end_date: NaiveDate::from_ymd_opt(2026, 12, 23),
            budget: BudgetTier::MidRange,
            travelers: 2,
            estimated_total: Some(42_000.0),
            currency: "INR".into(),
            itinerary: Some(serde_json::json!({"itinerary": []})),
            max_participants: 4,
            is_collaborative: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(ParticipantRole::Creator, true)]
    #[case(ParticipantRole::Editor, true)]
    #[case(ParticipantRole::Participant, false)]
    #[case(ParticipantRole::Viewer, false)]
    fn test_role_permissions(#[case] role: ParticipantRole, #[case] can_edit: bool) {
        assert_eq!(role.can_edit(), can_edit);
        assert_eq!(role.as_str().parse::<ParticipantRole>().unwrap(), role);
    }

    #[test]
    fn test_update_keeps_itinerary() {
        let mut plan = plan();
        let before = plan.itinerary.clone();
        let update: TripPlanUpdate =
            serde_json::from_str(r#"{"title": "New title", "description": "Beach days"}"#).unwrap();
        update.apply(&mut plan).unwrap();
        assert_eq!(plan.title, "New title");
        assert_eq!(plan.description.as_deref(), Some("Beach days"));
        assert_eq!(plan.itinerary, before);
    }

    #[test]
    fn test_update_rejects_inverted_dates() {
        let mut plan = plan();
        let update: TripPlanUpdate = serde_json::from_str(r#"{"end_date": "2026-12-01"}"#).unwrap();
        assert!(update.apply(&mut plan).is_err());
    }

    #[test]
    fn test_update_rejects_bad_capacity() {
        let mut plan = plan();
        let update = TripPlanUpdate {
            max_participants: Some(0),
            ..Default::default()
        };
        assert!(update.apply(&mut plan).is_err());
    }

    #[test]
    fn test_new_plan_defaults() {
        let new: NewTripPlan =
            serde_json::from_str(r#"{"title": "Weekend", "destination": "Pune"}"#).unwrap();
        assert_eq!(new.max_participants, 10);
        assert!(new.is_collaborative);
        assert_eq!(new.travelers, 1);
        assert!(new.validate().is_ok());
    }

    #[test]
    fn test_activity_validation() {
        let activity = ActivityInput {
            title: "Dinner".into(),
            start_time: NaiveTime::from_hms_opt(20, 0, 0),
            end_time: NaiveTime::from_hms_opt(19, 0, 0),
            ..Default::default()
        };
        assert!(activity.validate().is_err());
    }
}
