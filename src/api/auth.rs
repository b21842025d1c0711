use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use serde_json::{Value, json};

use super::extract::{ApiJson, CurrentUser, MaybeUser, bearer_token};
use crate::{
    TravelError,
    auth::{AuthSession, LoginRequest, SignupRequest},
    models::{HomeLocation, UserProfile},
    web::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/user/location", put(update_location))
}

async fn signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<AuthSession>), TravelError> {
    let session = state.auth.signup(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthSession>, TravelError> {
    Ok(Json(state.auth.login(request).await?))
}

async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
) -> Result<Json<Value>, TravelError> {
    if let Some(token) = bearer_token(&headers) {
        state.auth.logout(token).await?;
    }
    tracing::info!(user_id = user.id, "logged out");
    Ok(Json(json!({ "message": "Logged out" })))
}

async fn me(MaybeUser(user): MaybeUser) -> Json<UserProfile> {
    Json(user.map_or_else(UserProfile::anonymous, |user| user.profile()))
}

async fn update_location(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(location): ApiJson<HomeLocation>,
) -> Result<Json<UserProfile>, TravelError> {
    let location = location.normalized()?;
    let updated = state.store.update_home_location(user.id, location).await?;
    Ok(Json(updated.profile()))
}
