//! Destination recommendations: filtering, trip budgets and ranking

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    TravelError,
    models::{
        BudgetTier, Coordinates, Destination,
        patch::{lenient_f64, tag_list},
    },
    transport::{RateTable, TransportOptions},
};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_TRIP_DAYS: u32 = 3;
pub const DEFAULT_SIMILAR_LIMIT: usize = 5;

/// A trip above this total scores zero for affordability
const AFFORDABLE_CEILING: f64 = 5000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Popularity,
    Rating,
    Distance,
    Cost,
}

/// Query string of `GET /api/recommendations`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default, alias = "user_lat", deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, alias = "user_lon", deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub budget_min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub budget_max: Option<f64>,
    #[serde(default, deserialize_with = "tag_list")]
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_distance_km: Option<f64>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort_by: SortBy,
    pub trip_duration_days: Option<u32>,
    /// Fall back to the saved home location, on unless `false`
    pub use_user_location: Option<bool>,
}

impl RecommendationQuery {
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    #[must_use]
    pub fn trip_days(&self) -> u32 {
        self.trip_duration_days
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_TRIP_DAYS)
    }

    #[must_use]
    pub fn use_saved_location(&self) -> bool {
        self.use_user_location.unwrap_or(true)
    }

    /// Explicit query point, validated
    pub fn origin(&self) -> Result<Option<Coordinates>, TravelError> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon).map(Some),
            (None, None) => Ok(None),
            _ => Err(TravelError::validation(
                "Latitude and longitude must be provided together",
            )),
        }
    }

    fn matches(&self, destination: &Destination) -> bool {
        let cost = destination.average_cost_per_day;
        if let Some(min) = self.budget_min
            && cost.is_none_or(|c| c < min)
        {
            return false;
        }
        if let Some(max) = self.budget_max
            && cost.is_none_or(|c| c > max)
        {
            return false;
        }
        if !self.categories.is_empty()
            && !destination.category.as_deref().is_some_and(|category| {
                self.categories
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(category))
            })
        {
            return false;
        }
        if let Some(min_rating) = self.min_rating
            && destination.rating.is_none_or(|r| r < min_rating)
        {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|tag| destination.has_tag(tag)) {
            return false;
        }
        true
    }
}

/// Full trip budget from a destination's average daily cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetBreakdown {
    pub transportation: f64,
    pub accommodation: f64,
    pub accommodation_per_night: f64,
    pub food: f64,
    pub food_per_day: f64,
    pub local_transport: f64,
    pub activities: f64,
    pub miscellaneous: f64,
    pub insurance: f64,
    pub contingency: f64,
    pub subtotal: f64,
    pub total: f64,
    pub per_day_average: f64,
}

/// A catalog entry with its score and optional budget
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDestination {
    #[serde(flatten)]
    pub destination: Destination,
    pub distance_km: Option<f64>,
    pub trip_duration_days: u32,
    pub currency: String,
    pub recommendation_score: f64,
    pub budget_breakdown: Option<BudgetBreakdown>,
    pub transportation_options: Option<TransportOptions>,
    pub total_trip_cost: Option<f64>,
    pub estimated_cost_per_day: Option<f64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    rates: RateTable,
}

impl RecommendationEngine {
    #[must_use]
    pub fn new(rates: RateTable) -> Self {
        Self { rates }
    }

    /// Budget for `days` at a destination `distance_km` away. Transport
    /// is the recommended round trip, zero when no mode applies.
    pub fn comprehensive_budget(
        &self,
        distance_km: f64,
        days: u32,
        daily_cost: f64,
        tier: BudgetTier,
    ) -> Result<(BudgetBreakdown, TransportOptions), TravelError> {
        let options = self.rates.score(distance_km)?;
        let transportation = options
            .require_recommended()
            .map_or(0.0, |option| option.round_trip_cost);

        let days_f = f64::from(days);
        let accommodation_per_night = daily_cost * 0.4 * tier.cost_multiplier();
        let accommodation = accommodation_per_night * days_f;
        let food_per_day = daily_cost * 0.35 * tier.food_multiplier();
        let food = food_per_day * days_f;
        let local_transport = daily_cost * 0.15 * tier.cost_multiplier() * days_f;
        let activities = daily_cost * 0.10 * days_f;
        let miscellaneous = (food + activities) * 0.15;

        let subtotal =
            transportation + accommodation + food + local_transport + activities + miscellaneous;
        let insurance = subtotal * 0.05;
        let contingency = (subtotal + insurance) * 0.10;
        let total = subtotal + insurance + contingency;

        let breakdown = BudgetBreakdown {
            transportation: round2(transportation),
            accommodation: round2(accommodation),
            accommodation_per_night: round2(accommodation_per_night),
            food: round2(food),
            food_per_day: round2(food_per_day),
            local_transport: round2(local_transport),
            activities: round2(activities),
            miscellaneous: round2(miscellaneous),
            insurance: round2(insurance),
            contingency: round2(contingency),
            subtotal: round2(subtotal),
            total: round2(total),
            per_day_average: if days == 0 { 0.0 } else { round2(total / days_f) },
        };
        Ok((breakdown, options))
    }

    /// Filter, score and rank `catalog` for a traveler at `origin`
    #[tracing::instrument(level = "debug", skip(self, catalog), fields(candidates = catalog.len()))]
    pub fn recommend(
        &self,
        catalog: Vec<Destination>,
        query: &RecommendationQuery,
        origin: Option<Coordinates>,
        currency: &str,
    ) -> Result<Vec<ScoredDestination>, TravelError> {
        let days = query.trip_days();
        let max_distance = query.max_distance_km.filter(|d| *d > 0.0);
        let mut results = Vec::new();

        for destination in catalog.into_iter().filter(|d| query.matches(d)) {
            let distance = match (origin, destination.coordinates()) {
                (Some(from), Some(to)) => Some(from.distance_km(&to)),
                _ => None,
            };
            if let Some(max) = max_distance {
                match distance {
                    Some(d) if d > max => continue,
                    None if destination.coordinates().is_none() => continue,
                    _ => {}
                }
            }

            let budget = match (distance, destination.average_cost_per_day) {
                (Some(d), Some(daily)) if daily > 0.0 => Some(self.comprehensive_budget(
                    d,
                    days,
                    daily,
                    destination.budget_tier.unwrap_or_default(),
                )?),
                _ => None,
            };
            let total_trip_cost = budget.as_ref().map(|(b, _)| b.total);
            let score = score(&destination, distance, total_trip_cost, max_distance);
            let (budget_breakdown, transportation_options) = budget.unzip();

            results.push(ScoredDestination {
                distance_km: distance.map(|d| (d * 10.0).round() / 10.0),
                trip_duration_days: days,
                currency: currency.to_string(),
                recommendation_score: round2(score),
                estimated_cost_per_day: budget_breakdown.as_ref().map(|b| b.per_day_average),
                budget_breakdown,
                transportation_options,
                total_trip_cost,
                destination,
            });
        }

        sort_results(&mut results, query.sort_by, origin.is_some());
        results.truncate(query.limit());
        tracing::debug!(returned = results.len(), "recommendations ranked");
        Ok(results)
    }
}

fn score(
    destination: &Destination,
    distance: Option<f64>,
    total_trip_cost: Option<f64>,
    max_distance: Option<f64>,
) -> f64 {
    let mut score = destination.popularity_score * 0.4
        + destination.rating.unwrap_or(3.0) * 0.3
        + f64::from(destination.review_count) * 0.01;

    let affordability = match total_trip_cost {
        Some(total) if total > 0.0 => {
            ((AFFORDABLE_CEILING - total) / AFFORDABLE_CEILING).max(0.0) * 5.0
        }
        _ => 5.0 - destination.average_cost_per_day.unwrap_or(100.0) / 50.0,
    };
    score += affordability * 0.2;

    if let (Some(d), Some(max)) = (distance, max_distance) {
        score += ((max - d) / max).max(0.0) * 0.1;
    }
    score
}

fn sort_results(results: &mut [ScoredDestination], sort_by: SortBy, has_origin: bool) {
    let desc = |a: f64, b: f64| b.partial_cmp(&a).unwrap_or(Ordering::Equal);
    let asc = |a: f64, b: f64| a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    match sort_by {
        SortBy::Distance if has_origin => results.sort_by(|a, b| {
            asc(
                a.distance_km.unwrap_or(f64::INFINITY),
                b.distance_km.unwrap_or(f64::INFINITY),
            )
        }),
        SortBy::Rating => results.sort_by(|a, b| {
            desc(
                a.destination.rating.unwrap_or(0.0),
                b.destination.rating.unwrap_or(0.0),
            )
        }),
        SortBy::Cost => results.sort_by(|a, b| {
            asc(
                a.destination.average_cost_per_day.unwrap_or(f64::INFINITY),
                b.destination.average_cost_per_day.unwrap_or(f64::INFINITY),
            )
        }),
        _ => results.sort_by(|a, b| desc(a.recommendation_score, b.recommendation_score)),
    }
}

/// Destinations with a positive popularity, most popular first
#[must_use]
pub fn trending(catalog: Vec<Destination>, limit: usize) -> Vec<Destination> {
    let mut popular: Vec<_> = catalog
        .into_iter()
        .filter(|d| d.popularity_score > 0.0)
        .collect();
    popular.sort_by(|a, b| {
        b.popularity_score
            .partial_cmp(&a.popularity_score)
            .unwrap_or(Ordering::Equal)
    });
    popular.truncate(limit);
    popular
}

/// Same category and at least one shared tag
#[must_use]
pub fn similar(source: &Destination, catalog: Vec<Destination>, limit: usize) -> Vec<Destination> {
    catalog
        .into_iter()
        .filter(|d| d.id != source.id)
        .filter(|d| match (&source.category, &d.category) {
            (Some(wanted), Some(category)) => wanted.eq_ignore_ascii_case(category),
            (Some(_), None) => false,
            (None, _) => true,
        })
        .filter(|d| source.tags.is_empty() || source.tags.iter().any(|tag| d.has_tag(tag)))
        .take(limit)
        .collect()
}

/// Average daily cost within `[min, max]`, best rated first
pub fn by_budget(
    catalog: Vec<Destination>,
    min: f64,
    max: f64,
    limit: usize,
) -> Result<Vec<Destination>, TravelError> {
    if !min.is_finite() || !max.is_finite() || min < 0.0 || max < min {
        return Err(TravelError::validation(
            "Budget range must satisfy 0 <= min <= max",
        ));
    }
    let mut matching: Vec<_> = catalog
        .into_iter()
        .filter(|d| {
            d.average_cost_per_day
                .is_some_and(|cost| (min..=max).contains(&cost))
        })
        .collect();
    matching.sort_by(|a, b| {
        b.rating
            .unwrap_or(0.0)
            .partial_cmp(&a.rating.unwrap_or(0.0))
            .unwrap_or(Ordering::Equal)
    });
    matching.truncate(limit);
    Ok(matching)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::{fixture, rstest};

    fn destination(id: i64, title: &str) -> Destination {
        Destination {
            id,
            title: title.into(),
            description: None,
            category: None,
            budget_tier: None,
            latitude: None,
            longitude: None,
            website: None,
            country: None,
            city: None,
            average_cost_per_day: None,
            best_time_to_visit: None,
            rating: None,
            review_count: 0,
            popularity_score: 0.0,
            tags: Vec::new(),
            estimated_duration_hours: None,
            created_at: Utc::now(),
        }
    }

    #[fixture]
    fn catalog() -> Vec<Destination> {
        let mut goa = destination(1, "Goa");
        goa.category = Some("beach".into());
        goa.latitude = Some(15.2993);
        goa.longitude = Some(74.124);
        goa.average_cost_per_day = Some(60.0);
        goa.rating = Some(4.5);
        goa.review_count = 120;
        goa.popularity_score = 2.8;
        goa.tags = vec!["beach".into(), "nightlife".into()];

        let mut pune = destination(2, "Pune");
        pune.category = Some("city".into());
        pune.latitude = Some(18.5204);
        pune.longitude = Some(73.8567);
        pune.average_cost_per_day = Some(40.0);
        pune.rating = Some(3.9);
        pune.popularity_score = 1.5;
        pune.tags = vec!["food".into()];

        let mut gokarna = destination(3, "Gokarna");
        gokarna.category = Some("beach".into());
        gokarna.average_cost_per_day = Some(30.0);
        gokarna.rating = Some(4.7);
        gokarna.tags = vec!["Beach".into()];

        vec![goa, pune, gokarna]
    }

    #[fixture]
    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(RateTable::default())
    }

    fn mumbai() -> Coordinates {
        Coordinates::new(19.076, 72.8777).unwrap()
    }

    #[rstest]
    fn test_default_sort_is_by_score(engine: RecommendationEngine, catalog: Vec<Destination>) {
        let results = engine
            .recommend(catalog, &RecommendationQuery::default(), None, "INR")
            .unwrap();
        assert_eq!(results.len(), 3);
        let scores: Vec<f64> = results.iter().map(|r| r.recommendation_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert!(results.iter().all(|r| r.budget_breakdown.is_none()));
    }

    #[rstest]
    fn test_max_distance_excludes_unlocated(
        engine: RecommendationEngine,
        catalog: Vec<Destination>,
    ) {
        let query = RecommendationQuery {
            max_distance_km: Some(200.0),
            ..Default::default()
        };
        let results = engine
            .recommend(catalog, &query, Some(mumbai()), "INR")
            .unwrap();
        let titles: Vec<&str> = results.iter().map(|r| r.destination.title.as_str()).collect();
        assert_eq!(titles, vec!["Pune"]);
        assert!(results[0].distance_km.unwrap() < 200.0);
    }

    #[rstest]
    fn test_budget_attached_when_located(engine: RecommendationEngine, catalog: Vec<Destination>) {
        let query = RecommendationQuery {
            sort_by: SortBy::Distance,
            ..Default::default()
        };
        let results = engine
            .recommend(catalog, &query, Some(mumbai()), "INR")
            .unwrap();
        assert_eq!(results[0].destination.title, "Pune");
        let pune = &results[0];
        let budget = pune.budget_breakdown.as_ref().unwrap();
        assert_eq!(pune.total_trip_cost, Some(budget.total));
        assert!(pune.transportation_options.is_some());
        // unlocated destinations sort last
        assert_eq!(results[2].destination.title, "Gokarna");
    }

    #[rstest]
    #[case(vec!["BEACH"], 2)]
    #[case(vec!["food", "nightlife"], 2)]
    #[case(vec!["hiking"], 0)]
    fn test_tag_filter(
        engine: RecommendationEngine,
        catalog: Vec<Destination>,
        #[case] tags: Vec<&str>,
        #[case] expected: usize,
    ) {
        let query = RecommendationQuery {
            tags: tags.into_iter().map(str::to_string).collect(),
            ..Default::default()
        };
        let results = engine.recommend(catalog, &query, None, "INR").unwrap();
        assert_eq!(results.len(), expected);
    }

    #[rstest]
    fn test_filters_and_limit(engine: RecommendationEngine, catalog: Vec<Destination>) {
        let query = RecommendationQuery {
            categories: vec!["beach".into()],
            min_rating: Some(4.6),
            ..Default::default()
        };
        let results = engine.recommend(catalog.clone(), &query, None, "INR").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].destination.title, "Gokarna");

        let query = RecommendationQuery {
            limit: Some(1),
            sort_by: SortBy::Cost,
            ..Default::default()
        };
        let results = engine.recommend(catalog, &query, None, "INR").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].destination.title, "Gokarna");
    }

    #[rstest]
    #[case(None, DEFAULT_LIMIT)]
    #[case(Some(0), 1)]
    #[case(Some(500), MAX_LIMIT)]
    fn test_limit_clamped(#[case] limit: Option<usize>, #[case] expected: usize) {
        let query = RecommendationQuery {
            limit,
            ..Default::default()
        };
        assert_eq!(query.limit(), expected);
    }

    #[rstest]
    fn test_comprehensive_budget(engine: RecommendationEngine) {
        let (budget, options) = engine
            .comprehensive_budget(500.0, 3, 100.0, BudgetTier::MidRange)
            .unwrap();
        let transport = options.require_recommended().unwrap().round_trip_cost;
        assert_eq!(budget.transportation, transport);
        assert!((budget.accommodation - 120.0).abs() < 1e-9);
        assert!((budget.food - 105.0).abs() < 1e-9);
        assert!((budget.local_transport - 45.0).abs() < 1e-9);
        assert!((budget.activities - 30.0).abs() < 1e-9);
        assert!((budget.miscellaneous - 20.25).abs() < 1e-9);
        let subtotal = transport + 120.0 + 105.0 + 45.0 + 30.0 + 20.25;
        let expected = subtotal * 1.05 * 1.1;
        assert!((budget.total - round2(expected)).abs() < 0.01);
    }

    #[rstest]
    fn test_trending_similar_budget(catalog: Vec<Destination>) {
        let top = trending(catalog.clone(), 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].title, "Goa");

        let related = similar(&catalog[0], catalog.clone(), DEFAULT_SIMILAR_LIMIT);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].title, "Gokarna");

        let cheap = by_budget(catalog.clone(), 25.0, 50.0, 10).unwrap();
        let titles: Vec<&str> = cheap.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Gokarna", "Pune"]);
        assert!(by_budget(catalog, 50.0, 10.0, 10).is_err());
    }
}
