use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use super::extract::{ApiJson, CurrentUser, Id};
use crate::{
    TravelError,
    models::{
        ActivityInput, Destination, NewTripPlan, TripActivity, TripParticipant, TripPlan,
        TripPlanUpdate, User,
    },
    planner::{EnhanceRequest, PlanEnhancement, TripPlanRequest, TripPlanResult},
    store::TripPlanListing,
    trips::{InviteRequest, TripPlanDetails},
    web::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trip-plan", post(generate))
        .route("/trip-plans", get(list).post(create))
        .route(
            "/trip-plans/{id}",
            get(details).put(update).delete(remove),
        )
        .route("/trip-plans/{id}/invite", post(invite))
        .route("/trip-plans/{id}/leave", post(leave))
        .route("/trip-plans/{id}/activities", post(add_activity))
        .route("/trip-plans/{id}/enhance", post(enhance))
}

/// Catalog entry whose title or city names the requested destination
fn catalog_match<'a>(catalog: &'a [Destination], destination: &str) -> Option<&'a Destination> {
    let wanted = destination.trim();
    catalog.iter().find(|d| {
        d.coordinates().is_some()
            && (d.title.eq_ignore_ascii_case(wanted)
                || d.city.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(wanted)))
    })
}

/// Fill the home context from the profile unless the request names its own
fn with_home(mut request: TripPlanRequest, user: &User) -> TripPlanRequest {
    if request.home_city.as_deref().is_none_or(|c| c.trim().is_empty()) {
        request.home_city = user.home_city.clone();
        request.home_country = request.home_country.or_else(|| user.home_country.clone());
        request.home_point = user.home_coordinates();
    }
    request
}

async fn generate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<TripPlanRequest>,
) -> Result<Json<TripPlanResult>, TravelError> {
    let mut request = with_home(request, &user);

    let catalog = state.store.list_destinations().await?;
    let known = catalog_match(&catalog, &request.destination);
    request.destination_point = known.and_then(Destination::coordinates);
    let destination_id = known.map(|d| d.id);

    let mut result = state.planner.generate(&request).await?;

    let mut plan = result.to_new_plan(request.start_date)?;
    plan.destination_id = destination_id;
    match state.trips.create(&user, plan).await {
        Ok(saved) => result.saved_plan_id = Some(saved.id),
        Err(e) => tracing::warn!(error = %e, user_id = user.id, "could not save generated trip plan"),
    }
    Ok(Json(result))
}

async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<TripPlanListing>>, TravelError> {
    Ok(Json(state.trips.list(&user).await?))
}

async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(new): ApiJson<NewTripPlan>,
) -> Result<(StatusCode, Json<TripPlan>), TravelError> {
    let plan = state.trips.create(&user, new).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn details(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Id(id): Id,
) -> Result<Json<TripPlanDetails>, TravelError> {
    Ok(Json(state.trips.details(id, &user).await?))
}

async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Id(id): Id,
    ApiJson(update): ApiJson<TripPlanUpdate>,
) -> Result<Json<TripPlan>, TravelError> {
    Ok(Json(state.trips.update(id, &user, update).await?))
}

async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Id(id): Id,
) -> Result<StatusCode, TravelError> {
    state.trips.delete(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Id(id): Id,
    ApiJson(request): ApiJson<InviteRequest>,
) -> Result<(StatusCode, Json<TripParticipant>), TravelError> {
    let participant = state.trips.invite(id, &user, request).await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

async fn leave(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Id(id): Id,
) -> Result<StatusCode, TravelError> {
    state.trips.leave(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_activity(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Id(id): Id,
    ApiJson(input): ApiJson<ActivityInput>,
) -> Result<(StatusCode, Json<TripActivity>), TravelError> {
    let activity = state.trips.add_activity(id, &user, input).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

/// Any participant may ask; the saved plan is left unchanged
async fn enhance(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Id(id): Id,
    ApiJson(request): ApiJson<EnhanceRequest>,
) -> Result<Json<PlanEnhancement>, TravelError> {
    let details = state.trips.details(id, &user).await?;
    Ok(Json(state.planner.enhance(&details, &user, &request).await?))
}
