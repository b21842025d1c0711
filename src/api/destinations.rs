use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};

use super::extract::{ApiJson, CurrentUser, Id};
use crate::{
    TravelError,
    models::{Destination, DestinationInput, DestinationPatch},
    web::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/destinations", get(list).post(create))
        .route(
            "/destinations/{id}",
            get(show).put(update).delete(remove),
        )
}

async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<Destination>>, TravelError> {
    Ok(Json(state.store.list_destinations().await?))
}

async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(input): ApiJson<DestinationInput>,
) -> Result<(StatusCode, Json<Destination>), TravelError> {
    let destination = state.store.create_destination(input).await?;
    tracing::info!(id = destination.id, user_id = user.id, "destination created");
    Ok((StatusCode::CREATED, Json(destination)))
}

async fn show(
    State(state): State<AppState>,
    _user: CurrentUser,
    Id(id): Id,
) -> Result<Json<Destination>, TravelError> {
    state
        .store
        .destination(id)
        .await?
        .map(Json)
        .ok_or_else(|| TravelError::not_found("Destination not found"))
}

async fn update(
    State(state): State<AppState>,
    _user: CurrentUser,
    Id(id): Id,
    ApiJson(patch): ApiJson<DestinationPatch>,
) -> Result<Json<Destination>, TravelError> {
    Ok(Json(state.store.update_destination(id, patch).await?))
}

async fn remove(
    State(state): State<AppState>,
    _user: CurrentUser,
    Id(id): Id,
) -> Result<StatusCode, TravelError> {
    if state.store.delete_destination(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TravelError::not_found("Destination not found"))
    }
}
