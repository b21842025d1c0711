//! `TourWithMe` - travel planning web service
//!
//! This library provides destination management, geocoding and routing,
//! transport and cost estimates, AI-generated itineraries and collaborative
//! trip plans behind a JSON API.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod costs;
pub mod error;
pub mod http;
pub mod llm;
pub mod models;
pub mod nearby;
pub mod notify;
pub mod planner;
pub mod recommendations;
pub mod routing;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod trips;
pub mod web;

// Re-export core types for public API
pub use cache::PersistentCache;
pub use config::AppConfig;
pub use error::TravelError;
pub use models::{Coordinates, Destination, TripPlan, User};
pub use planner::{TripPlanRequest, TripPlanResult, TripPlanner};
pub use routing::{MappingProvider, MappingService};
pub use store::Store;
pub use transport::{RateTable, TransportOptions};
pub use web::{AppState, Providers};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, TravelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
