//! JSON endpoints mounted under `/api`

mod auth;
mod destinations;
pub mod extract;
mod health;
mod location;
mod recommendations;
mod transport;
mod trips;

use axum::Router;

use crate::web::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(destinations::router())
        .merge(location::router())
        .merge(transport::router())
        .merge(trips::router())
        .merge(recommendations::router())
}
