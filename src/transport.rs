//! Transport option scoring
//!
//! Every mode follows a fixed-rate model: a base fee plus a per-kilometre
//! rate for cost, and a fixed overhead plus distance over average speed for
//! duration. Both are therefore non-negative and non-decreasing in distance
//! as long as the rate table itself is valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{TravelError, models::Coordinates};

/// Modes the scorer knows about, in tie-break order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Car,
    Train,
    Flight,
    Bus,
}

impl TransportMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Train => "train",
            Self::Flight => "flight",
            Self::Bus => "bus",
        }
    }
}

/// Fixed-rate parameters of one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRate {
    pub mode: TransportMode,
    pub name: String,
    pub icon: String,
    pub average_speed_kmh: f64,
    pub cost_per_km: f64,
    #[serde(default)]
    pub base_fee: f64,
    /// Terminal, boarding and transfer time added to every trip
    #[serde(default)]
    pub overhead_minutes: f64,
    #[serde(default)]
    pub min_distance_km: f64,
    /// `None` means the mode applies to any distance above the minimum
    pub max_distance_km: Option<f64>,
}

impl ModeRate {
    #[must_use]
    pub fn applies_to(&self, distance_km: f64) -> bool {
        distance_km >= self.min_distance_km
            && self.max_distance_km.is_none_or(|max| distance_km <= max)
    }

    #[must_use]
    pub fn one_way_cost(&self, distance_km: f64) -> f64 {
        (self.base_fee + self.cost_per_km * distance_km).round()
    }

    #[must_use]
    pub fn duration_minutes(&self, distance_km: f64) -> u32 {
        let minutes = self.overhead_minutes + distance_km / self.average_speed_kmh * 60.0;
        minutes.round().clamp(0.0, f64::from(u32::MAX)) as u32
    }
}

/// Rate table for all modes plus the currency its amounts are in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_modes")]
    pub modes: Vec<ModeRate>,
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_modes() -> Vec<ModeRate> {
    vec![
        ModeRate {
            mode: TransportMode::Car,
            name: "Car / Cab".to_string(),
            icon: "🚗".to_string(),
            average_speed_kmh: 60.0,
            cost_per_km: 8.0,
            base_fee: 0.0,
            overhead_minutes: 0.0,
            min_distance_km: 0.0,
            max_distance_km: Some(1500.0),
        },
        ModeRate {
            mode: TransportMode::Train,
            name: "Train".to_string(),
            icon: "🚆".to_string(),
            average_speed_kmh: 60.0,
            cost_per_km: 1.8,
            base_fee: 150.0,
            overhead_minutes: 30.0,
            min_distance_km: 20.0,
            max_distance_km: Some(3000.0),
        },
        ModeRate {
            mode: TransportMode::Flight,
            name: "Flight (Economy)".to_string(),
            icon: "✈️".to_string(),
            average_speed_kmh: 700.0,
            cost_per_km: 4.0,
            base_fee: 2500.0,
            overhead_minutes: 150.0,
            min_distance_km: 300.0,
            max_distance_km: None,
        },
        ModeRate {
            mode: TransportMode::Bus,
            name: "Bus".to_string(),
            icon: "🚌".to_string(),
            average_speed_kmh: 45.0,
            cost_per_km: 1.5,
            base_fee: 50.0,
            overhead_minutes: 15.0,
            min_distance_km: 0.0,
            max_distance_km: Some(1200.0),
        },
    ]
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            modes: default_modes(),
        }
    }
}

impl RateTable {
    /// Reject tables that would break the monotonicity guarantees
    pub fn validate(&self) -> Result<(), TravelError> {
        if self.currency.len() != 3 {
            return Err(TravelError::validation(
                "Transport currency must be a 3-letter code",
            ));
        }
        if self.modes.is_empty() {
            return Err(TravelError::validation("Transport rate table has no modes"));
        }
        for (i, rate) in self.modes.iter().enumerate() {
            let name = rate.mode.as_str();
            if self.modes[..i].iter().any(|other| other.mode == rate.mode) {
                return Err(TravelError::validation(format!(
                    "Transport mode '{name}' is listed twice"
                )));
            }
            if !(rate.average_speed_kmh.is_finite() && rate.average_speed_kmh > 0.0) {
                return Err(TravelError::validation(format!(
                    "Average speed of '{name}' must be positive"
                )));
            }
            for (field, value) in [
                ("cost_per_km", rate.cost_per_km),
                ("base_fee", rate.base_fee),
                ("overhead_minutes", rate.overhead_minutes),
                ("min_distance_km", rate.min_distance_km),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(TravelError::validation(format!(
                        "{field} of '{name}' must be a non-negative number"
                    )));
                }
            }
            if let Some(max) = rate.max_distance_km
                && !(max.is_finite() && max >= rate.min_distance_km)
            {
                return Err(TravelError::validation(format!(
                    "max_distance_km of '{name}' must not be below min_distance_km"
                )));
            }
        }
        Ok(())
    }

    /// Score every mode for a distance and pick the recommendation
    pub fn score(&self, distance_km: f64) -> Result<TransportOptions, TravelError> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(TravelError::validation(format!(
                "Distance must be a non-negative number, got {distance_km}"
            )));
        }

        let all_options: BTreeMap<TransportMode, TransportOption> = self
            .modes
            .iter()
            .map(|rate| (rate.mode, TransportOption::for_rate(rate, distance_km)))
            .collect();

        let recommended_mode = all_options
            .values()
            .filter(|option| option.available)
            .min_by(|a, b| {
                a.round_trip_cost
                    .total_cmp(&b.round_trip_cost)
                    .then(a.duration_minutes.cmp(&b.duration_minutes))
                    .then(a.mode.cmp(&b.mode))
            })
            .map(|option| option.mode);

        Ok(TransportOptions {
            distance_km: (distance_km * 10.0).round() / 10.0,
            currency: self.currency.clone(),
            recommended_mode,
            no_options: recommended_mode.is_none(),
            all_options,
        })
    }

    /// Score the great-circle distance between two points
    pub fn score_between(
        &self,
        from: &Coordinates,
        to: &Coordinates,
    ) -> Result<TransportOptions, TravelError> {
        from.validate()?;
        to.validate()?;
        self.score(from.distance_km(to))
    }
}

/// Cost and duration of one mode at a given distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportOption {
    pub mode: TransportMode,
    pub name: String,
    pub icon: String,
    pub available: bool,
    pub one_way_cost: f64,
    pub round_trip_cost: f64,
    pub duration_minutes: u32,
    /// `"2h 5m"` or `"45m"`
    pub duration: String,
}

impl TransportOption {
    fn for_rate(rate: &ModeRate, distance_km: f64) -> Self {
        let one_way_cost = rate.one_way_cost(distance_km);
        let duration_minutes = rate.duration_minutes(distance_km);
        Self {
            mode: rate.mode,
            name: rate.name.clone(),
            icon: rate.icon.clone(),
            available: rate.applies_to(distance_km),
            one_way_cost,
            round_trip_cost: one_way_cost * 2.0,
            duration_minutes,
            duration: format_duration(duration_minutes),
        }
    }
}

/// Outcome of scoring a distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recommendation<'a> {
    Mode(&'a TransportOption),
    NoOptions,
}

/// All modes at one distance plus the recommended one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportOptions {
    pub distance_km: f64,
    pub currency: String,
    pub recommended_mode: Option<TransportMode>,
    /// Set when no mode applies to the distance
    pub no_options: bool,
    pub all_options: BTreeMap<TransportMode, TransportOption>,
}

impl TransportOptions {
    #[must_use]
    pub fn recommendation(&self) -> Recommendation<'_> {
        match self
            .recommended_mode
            .and_then(|mode| self.all_options.get(&mode))
        {
            Some(option) => Recommendation::Mode(option),
            None => Recommendation::NoOptions,
        }
    }

    /// The recommended option, or the typed "no transport" error
    pub fn require_recommended(&self) -> Result<&TransportOption, TravelError> {
        match self.recommendation() {
            Recommendation::Mode(option) => Ok(option),
            Recommendation::NoOptions => Err(TravelError::NoTransportAvailable {
                distance_km: self.distance_km,
            }),
        }
    }

    pub fn available(&self) -> impl Iterator<Item = &TransportOption> {
        self.all_options.values().filter(|option| option.available)
    }
}

#[must_use]
pub fn format_duration(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours > 0 {
        format!("{hours}h {rest}m")
    } else {
        format!("{rest}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn table() -> RateTable {
        RateTable::default()
    }

    #[rstest]
    fn test_default_table_is_valid(table: RateTable) {
        assert!(table.validate().is_ok());
        assert_eq!(table.modes.len(), 4);
    }

    #[rstest]
    fn test_car_500km_example(table: RateTable) {
        let options = table.score(500.0).unwrap();
        let car = &options.all_options[&TransportMode::Car];
        assert_eq!(car.one_way_cost, 4000.0);
        assert_eq!(car.round_trip_cost, 8000.0);
        assert!(car.available);
    }

    #[rstest]
    fn test_round_trip_is_exactly_double(table: RateTable) {
        for distance in [0.0, 0.3, 7.77, 19.99, 123.456, 999.9, 2500.0, 12_000.0] {
            let options = table.score(distance).unwrap();
            for option in options.all_options.values() {
                assert_eq!(option.round_trip_cost, option.one_way_cost * 2.0);
            }
        }
    }

    #[rstest]
    fn test_costs_and_durations_monotonic(table: RateTable) {
        let mut previous: Option<TransportOptions> = None;
        let mut distance = 0.0;
        while distance <= 5000.0 {
            let current = table.score(distance).unwrap();
            for option in current.all_options.values() {
                assert!(option.one_way_cost >= 0.0);
                if let Some(prev) = &previous {
                    let before = &prev.all_options[&option.mode];
                    assert!(option.one_way_cost >= before.one_way_cost, "{:?} at {distance}", option.mode);
                    assert!(option.duration_minutes >= before.duration_minutes, "{:?} at {distance}", option.mode);
                }
            }
            previous = Some(current);
            distance += 37.5;
        }
    }

    #[rstest]
    #[case(5.0)]
    #[case(50.0)]
    #[case(400.0)]
    #[case(1400.0)]
    #[case(2800.0)]
    #[case(9000.0)]
    fn test_recommended_is_available_and_cheapest(table: RateTable, #[case] distance: f64) {
        let options = table.score(distance).unwrap();
        let recommended = options.require_recommended().unwrap();
        assert!(recommended.available);
        assert!(
            options
                .available()
                .all(|o| o.round_trip_cost >= recommended.round_trip_cost)
        );
    }

    #[rstest]
    #[case(10.0, false)]
    #[case(299.0, false)]
    #[case(300.0, true)]
    #[case(9000.0, true)]
    fn test_flight_minimum_distance(table: RateTable, #[case] distance: f64, #[case] available: bool) {
        let options = table.score(distance).unwrap();
        assert_eq!(options.all_options[&TransportMode::Flight].available, available);
    }

    #[test]
    fn test_no_options_is_explicit() {
        let table = RateTable {
            currency: "INR".into(),
            modes: default_modes()
                .into_iter()
                .filter(|m| m.mode == TransportMode::Car)
                .collect(),
        };
        let options = table.score(2000.0).unwrap();
        assert!(options.no_options);
        assert_eq!(options.recommended_mode, None);
        assert_eq!(options.recommendation(), Recommendation::NoOptions);
        assert!(matches!(
            options.require_recommended(),
            Err(TravelError::NoTransportAvailable { .. })
        ));

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["recommended_mode"], serde_json::Value::Null);
        assert_eq!(json["no_options"], true);
    }

    #[test]
    fn test_tie_breaks_on_duration() {
        let mut slow = default_modes().remove(0);
        slow.mode = TransportMode::Bus;
        slow.average_speed_kmh = 30.0;
        let fast = default_modes().remove(0);
        let table = RateTable {
            currency: "INR".into(),
            modes: vec![slow, fast],
        };
        let options = table.score(100.0).unwrap();
        assert_eq!(options.recommended_mode, Some(TransportMode::Car));
    }

    #[rstest]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_rejects_invalid_distance(table: RateTable, #[case] distance: f64) {
        assert!(matches!(table.score(distance), Err(TravelError::Validation { .. })));
    }

    #[test]
    fn test_invalid_tables_rejected() {
        let mut table = RateTable::default();
        table.modes[0].average_speed_kmh = 0.0;
        assert!(table.validate().is_err());

        let mut table = RateTable::default();
        table.modes[1].cost_per_km = -1.0;
        assert!(table.validate().is_err());

        let mut table = RateTable::default();
        table.modes[2].max_distance_km = Some(10.0);
        assert!(table.validate().is_err());

        let mut table = RateTable::default();
        table.modes.push(table.modes[0].clone());
        assert!(table.validate().is_err());
    }

    #[rstest]
    #[case(0, "0m")]
    #[case(45, "45m")]
    #[case(60, "1h 0m")]
    #[case(125, "2h 5m")]
    fn test_format_duration(#[case] minutes: u32, #[case] expected: &str) {
        assert_eq!(format_duration(minutes), expected);
    }

    #[rstest]
    fn test_response_shape(table: RateTable) {
        let json = serde_json::to_value(table.score(120.0).unwrap()).unwrap();
        assert_eq!(json["distance_km"], 120.0);
        assert!(json["all_options"]["train"]["available"].as_bool().unwrap());
        assert!(json["all_options"]["bus"]["duration"].is_string());
        assert!(json["recommended_mode"].is_string());
    }

    #[rstest]
    fn test_score_between_points(table: RateTable) {
        let mumbai = Coordinates::new(19.076, 72.8777).unwrap();
        let delhi = Coordinates::new(28.7041, 77.1025).unwrap();
        let options = table.score_between(&mumbai, &delhi).unwrap();
        assert!(options.distance_km > 1100.0 && options.distance_km < 1200.0);
        assert!(options.all_options[&TransportMode::Flight].available);
    }
}
