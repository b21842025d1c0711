//! Data models for `TourWithMe`
//!
//! This module contains the core domain models organized by concern:
//! - Location: Geographic coordinates
//! - User: Accounts and saved home location
//! - Destination: The shared destination catalog
//! - Trip: Trip plans, participants and activities

pub mod destination;
pub mod location;
pub mod patch;
pub mod trip;
pub mod user;

// Re-export all public types for convenient access
pub use destination::{BudgetTier, Destination, DestinationInput, DestinationPatch};
pub use location::Coordinates;
pub use trip::{
    ActivityInput, NewTripPlan, ParticipantRole, TripActivity, TripParticipant, TripPlan,
    TripPlanUpdate,
};
pub use user::{HomeLocation, NewUser, User, UserProfile};
