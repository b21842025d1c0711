//! Collaborative trip plans: membership and role checks on top of the store

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    TravelError,
    models::{
        ActivityInput, NewTripPlan, ParticipantRole, TripActivity, TripParticipant, TripPlan,
        TripPlanUpdate, User,
    },
    notify::{Invitation, Notifier},
    store::{Store, TripPlanListing},
};

/// Body of `POST /api/trip-plans/{id}/invite`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InviteRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
}

/// Full plan as seen by one of its participants
#[derive(Debug, Clone, Serialize)]
pub struct TripPlanDetails {
    pub plan: TripPlan,
    pub role: ParticipantRole,
    pub participants: Vec<TripParticipant>,
    pub activities: Vec<TripActivity>,
}

#[derive(Debug, Clone)]
pub struct TripPlanService {
    store: Store,
    notifier: Notifier,
}

impl TripPlanService {
    #[must_use]
    pub fn new(store: Store, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    #[must_use]
    pub fn notifications_enabled(&self) -> bool {
        self.notifier.is_enabled()
    }

    pub async fn create(&self, user: &User, new: NewTripPlan) -> Result<TripPlan, TravelError> {
        let plan = self.store.create_trip_plan(user.id, new).await?;
        tracing::info!(plan_id = plan.id, user_id = user.id, "trip plan created");
        Ok(plan)
    }

    pub async fn list(&self, user: &User) -> Result<Vec<TripPlanListing>, TravelError> {
        self.store.trip_plans_for_user(user.id).await
    }

    /// Caller's role, `not-found` for missing plans and `forbidden` for outsiders
    async fn role(&self, plan_id: i64, user: &User) -> Result<(TripPlan, ParticipantRole), TravelError> {
        let plan = self
            .store
            .trip_plan(plan_id)
            .await?
            .ok_or_else(|| TravelError::not_found("Trip plan not found"))?;
        let role = self
            .store
            .participant_role(plan_id, user.id)
            .await?
            .ok_or_else(|| TravelError::forbidden("You are not a participant of this trip plan"))?;
        Ok((plan, role))
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn details(&self, plan_id: i64, user: &User) -> Result<TripPlanDetails, TravelError> {
        let (plan, role) = self.role(plan_id, user).await?;
        Ok(TripPlanDetails {
            participants: self.store.participants(plan_id).await?,
            activities: self.store.activities(plan_id).await?,
            plan,
            role,
        })
    }

    #[instrument(skip(self, user, update), fields(user_id = user.id))]
    pub async fn update(
        &self,
        plan_id: i64,
        user: &User,
        update: TripPlanUpdate,
    ) -> Result<TripPlan, TravelError> {
        let (_, role) = self.role(plan_id, user).await?;
        if !role.can_edit() {
            return Err(TravelError::forbidden("Only creators and editors can edit this trip plan"));
        }
        self.store.update_trip_plan(plan_id, update).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn delete(&self, plan_id: i64, user: &User) -> Result<(), TravelError> {
        let (plan, _) = self.role(plan_id, user).await?;
        if plan.creator_id != user.id {
            return Err(TravelError::forbidden("Only the creator can delete this trip plan"));
        }
        self.store.delete_trip_plan(plan_id).await?;
        tracing::info!(plan_id, "trip plan deleted");
        Ok(())
    }

    /// Add a registered user by e-mail and notify them
    #[instrument(skip(self, user, request), fields(user_id = user.id))]
    pub async fn invite(
        &self,
        plan_id: i64,
        user: &User,
        request: InviteRequest,
    ) -> Result<TripParticipant, TravelError> {
        let (plan, _) = self.role(plan_id, user).await?;
        if plan.creator_id != user.id {
            return Err(TravelError::forbidden("Only the creator can invite participants"));
        }
        if request.email.trim().is_empty() {
            return Err(TravelError::validation("Email is required"));
        }
        let role = request.role.unwrap_or(ParticipantRole::Participant);
        if role == ParticipantRole::Creator {
            return Err(TravelError::validation("A trip plan has only one creator"));
        }

        let invitee = self
            .store
            .user_by_email(&request.email)
            .await?
            .ok_or_else(|| TravelError::not_found("No user registered with that email"))?;
        let participant = self.store.add_participant(plan_id, invitee.id, role).await?;

        let invitation = Invitation {
            to_email: &invitee.email,
            to_name: &invitee.name,
            inviter: &user.name,
            plan_title: &plan.title,
            plan_id,
        };
        if let Err(e) = self.notifier.send_invitation(&invitation).await {
            tracing::warn!(error = %format!("{e:#}"), "invitation email failed");
        }
        Ok(participant)
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn leave(&self, plan_id: i64, user: &User) -> Result<(), TravelError> {
        let (_, role) = self.role(plan_id, user).await?;
        if role == ParticipantRole::Creator {
            return Err(TravelError::validation(
                "The creator cannot leave the trip plan; delete it instead",
            ));
        }
        self.store.remove_participant(plan_id, user.id).await?;
        Ok(())
    }

    #[instrument(skip(self, user, input), fields(user_id = user.id))]
    pub async fn add_activity(
        &self,
        plan_id: i64,
        user: &User,
        input: ActivityInput,
    ) -> Result<TripActivity, TravelError> {
        let (_, role) = self.role(plan_id, user).await?;
        if !role.can_edit() {
            return Err(TravelError::forbidden("Only creators and editors can add activities"));
        }
        self.store.add_activity(plan_id, user.id, input).await
    }
}
