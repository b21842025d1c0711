use std::fmt::Write as _;

use chrono::NaiveDate;
use serde_json::{Value, json};

use crate::{
    costs::TripCosts,
    models::{BudgetTier, TripActivity, TripPlan},
};

/// What the itinerary prompt is built from
#[derive(Debug, Clone)]
pub struct ItineraryPrompt<'a> {
    pub destination: &'a str,
    pub duration_days: u32,
    pub budget: BudgetTier,
    pub interests: &'a [String],
    pub travelers: u32,
    pub start_date: Option<NaiveDate>,
    pub home_city: Option<&'a str>,
    pub home_country: Option<&'a str>,
    pub costs: &'a TripCosts,
}

impl ItineraryPrompt<'_> {
    fn interests_text(&self) -> String {
        if self.interests.is_empty() {
            "general sightseeing".to_string()
        } else {
            self.interests.join(", ")
        }
    }

    fn travel_context(&self) -> Option<String> {
        let details = self.costs.transportation_details.as_ref()?;
        let option = details.require_recommended().ok()?;
        let from = match (self.home_city, self.home_country) {
            (Some(city), Some(country)) => format!("{city}, {country}"),
            (Some(city), None) => city.to_string(),
            (None, Some(country)) => country.to_string(),
            (None, None) => "the traveler's home".to_string(),
        };
        let mut text = String::new();
        let _ = writeln!(text, "TRAVELER'S HOME LOCATION:");
        let _ = writeln!(text, "- Traveling from: {from}");
        let _ = writeln!(
            text,
            "- Distance to destination: {:.1} km",
            details.distance_km
        );
        let _ = writeln!(
            text,
            "- Recommended transport: {} ({}), {} {:.0} one-way, {} {:.0} round trip",
            option.name,
            option.duration,
            details.currency,
            option.one_way_cost,
            details.currency,
            option.round_trip_cost
        );
        Some(text)
    }

    /// International trips get a visa reminder
    fn crosses_border(&self) -> bool {
        self.home_country.is_some_and(|country| {
            !self
                .destination
                .to_lowercase()
                .contains(&country.to_lowercase())
        })
    }

    #[must_use]
    pub fn render(&self) -> String {
        let interests = self.interests_text();
        let currency = &self.costs.currency;
        let mut prompt = String::new();

        let _ = writeln!(
            prompt,
            "Create a highly personalized {}-day trip itinerary for {} traveler(s) visiting {}.",
            self.duration_days, self.travelers, self.destination
        );
        let _ = writeln!(prompt, "\nTRAVELER PROFILE:");
        let _ = writeln!(prompt, "- Budget category: {}", self.budget);
        let _ = writeln!(prompt, "- Primary interests: {interests}");
        let _ = writeln!(prompt, "- Number of travelers: {}", self.travelers);
        if let Some(date) = self.start_date {
            let _ = writeln!(prompt, "- Starting date: {date}");
        }
        if let Some(context) = self.travel_context() {
            let _ = write!(prompt, "\n{context}");
        }

        let _ = writeln!(prompt, "\nCALCULATED BUDGET:\n{}", self.costs.summary());

        let _ = writeln!(prompt, "\nIMPORTANT NOTES:");
        let _ = writeln!(
            prompt,
            "1. Personalize every recommendation for these interests and explain why it matches them"
        );
        let _ = writeln!(prompt, "2. Use {currency} for all cost estimates");
        let _ = writeln!(
            prompt,
            "3. Keep per-item prices consistent with the calculated budget above"
        );
        if self.crosses_border()
            && let Some(country) = self.home_country
        {
            let _ = writeln!(
                prompt,
                "4. If traveling internationally from {country}, include visa requirements and border crossing tips"
            );
        }

        let _ = write!(
            prompt,
            r#"
Respond with a single JSON object and nothing else, using this structure:
{{
  "destination": "{destination}",
  "destination_overview": {{
    "description": "history, culture and what makes it unique",
    "why_perfect_for_you": "why it matches the traveler's interests",
    "local_vibe": "atmosphere and local culture",
    "insider_secret": "a little-known fact or tip"
  }},
  "duration_days": {days},
  "budget_category": "{budget}",
  "travelers": {travelers},
  "personalization_summary": "how the itinerary is tailored to {interests}",
  "itinerary": [
    {{
      "day": 1,
      "date": "YYYY-MM-DD",
      "theme": "day theme",
      "activities": [
        {{
          "name": "activity name",
          "description": "what makes it special",
          "why_recommended": "link to the traveler's interests",
          "duration_hours": 2,
          "best_time": "morning/afternoon/evening",
          "insider_tips": ["tip"],
          "estimated_cost": 0,
          "location": "address or area"
        }}
      ],
      "meals": [
        {{
          "meal_type": "breakfast/lunch/dinner",
          "restaurant_name": "name",
          "description": "signature dishes",
          "cuisine_type": "type",
          "estimated_cost": 0
        }}
      ],
      "accommodation": {{
        "type": "hotel/hostel/etc",
        "description": "what makes it special",
        "location": "area",
        "estimated_cost": 0
      }},
      "hidden_gems": ["lesser-known spot"]
    }}
  ],
  "recommendations": {{
    "best_time_to_visit": "season with explanation",
    "weather_tips": "weather information",
    "safety_tips": ["tip"],
    "cultural_tips": ["tip"],
    "packing_list": ["item (why needed)"],
    "local_customs": ["custom"],
    "language_basics": {{"phrase": "translation"}}
  }},
  "local_transportation": {{
    "options": ["option with pros/cons"],
    "recommendations": "transport advice for this itinerary and budget",
    "insider_tips": ["tip"]
  }},
  "personalized_tips": ["tip"]
}}
Include exactly {days} entries in "itinerary"."#,
            destination = self.destination,
            days = self.duration_days,
            budget = self.budget,
            travelers = self.travelers,
        );
        prompt
    }
}

/// Asks for a saved plan reworked around the group's preferences
#[derive(Debug, Clone)]
pub struct EnhancementPrompt<'a> {
    pub plan: &'a TripPlan,
    pub activities: &'a [TripActivity],
    pub collaborators: &'a [String],
    pub preferences: &'a Value,
}

impl EnhancementPrompt<'_> {
    fn plan_json(&self) -> Value {
        json!({
            "title": self.plan.title,
            "description": self.plan.description,
            "destination": self.plan.destination,
            "start_date": self.plan.start_date,
            "end_date": self.plan.end_date,
            "budget": self.plan.budget,
            "travelers": self.plan.travelers,
            "activities": self.activities.iter().map(|a| json!({
                "title": a.title,
                "description": a.description,
                "category": a.category,
                "cost": a.cost,
            })).collect::<Vec<_>>(),
        })
    }

    #[must_use]
    pub fn render(&self) -> String {
        let pretty = |value: &Value| {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        };
        format!(
            r#"Enhance this existing trip plan by incorporating preferences from {count} collaborator(s).

Current plan:
{plan}

Collaborator preferences:
{preferences}

Create an enhanced version that:
1. Balances different preferences and interests
2. Suggests compromises where preferences conflict
3. Adds collaborative activities
4. Adjusts the itinerary to accommodate group dynamics
5. Provides alternative options for different group members
6. Includes communication tips for the group

Respond with a single JSON object and nothing else, with the same structure as the current plan plus:
{{
  "collaborative_enhancements": {{
    "group_activities": ["activity"],
    "compromise_suggestions": ["suggestion"],
    "alternative_options": ["option"],
    "communication_tips": ["tip"]
  }}
}}"#,
            count = self.collaborators.len(),
            plan = pretty(&self.plan_json()),
            preferences = pretty(self.preferences),
        )
    }
}
