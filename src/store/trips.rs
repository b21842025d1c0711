use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use super::{Result, Store};
use crate::{
    TravelError,
    models::{
        ActivityInput, NewTripPlan, ParticipantRole, TripActivity, TripParticipant, TripPlan,
        TripPlanUpdate,
    },
};

const PLAN_COLUMNS: &str = "p.id, p.title, p.description, p.destination, p.destination_id, \
     p.creator_id, p.start_date, p.end_date, p.budget, p.travelers, p.estimated_total, \
     p.currency, p.itinerary, p.max_participants, p.is_collaborative, p.created_at, p.updated_at";

const ACTIVITY_COLUMNS: &str = "id, trip_plan_id, destination_id, title, description, \
     activity_date, start_time, end_time, cost, category, latitude, longitude, created_by, \
     created_at";

/// A plan as seen in the owner's list, with the caller's role
#[derive(Debug, Clone, Serialize)]
pub struct TripPlanListing {
    #[serde(flatten)]
    pub plan: TripPlan,
    pub role: ParticipantRole,
    pub participant_count: u32,
}

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<TripPlan> {
    let itinerary: Option<String> = row.get(12)?;
    let itinerary = itinerary
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(TripPlan {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        destination: row.get(3)?,
        destination_id: row.get(4)?,
        creator_id: row.get(5)?,
        start_date: row.get(6)?,
        end_date: row.get(7)?,
        budget: row.get(8)?,
        travelers: row.get(9)?,
        estimated_total: row.get(10)?,
        currency: row.get(11)?,
        itinerary,
        max_participants: row.get(13)?,
        is_collaborative: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<TripActivity> {
    Ok(TripActivity {
        id: row.get(0)?,
        trip_plan_id: row.get(1)?,
        destination_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        activity_date: row.get(5)?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        cost: row.get(8)?,
        category: row.get(9)?,
        latitude: row.get(10)?,
        longitude: row.get(11)?,
        created_by: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn find_plan(conn: &Connection, id: i64) -> Result<Option<TripPlan>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PLAN_COLUMNS} FROM trip_plans p WHERE p.id = ?1"),
            [id],
            plan_from_row,
        )
        .optional()?)
}

fn find_participant(conn: &Connection, plan_id: i64, user_id: i64) -> Result<Option<TripParticipant>> {
    Ok(conn
        .query_row(
            "SELECT tp.trip_plan_id, tp.user_id, u.name, u.email, tp.role, tp.joined_at
             FROM trip_participants tp JOIN users u ON u.id = tp.user_id
             WHERE tp.trip_plan_id = ?1 AND tp.user_id = ?2",
            [plan_id, user_id],
            participant_from_row,
        )
        .optional()?)
}

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<TripParticipant> {
    Ok(TripParticipant {
        trip_plan_id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        role: row.get(4)?,
        joined_at: row.get(5)?,
    })
}

fn count_participants(conn: &Connection, plan_id: i64) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM trip_participants WHERE trip_plan_id = ?1",
        [plan_id],
        |row| row.get(0),
    )?)
}

impl Store {
    /// Insert a plan and register its creator in the same transaction
    #[tracing::instrument(level = "debug", skip(self, new), fields(title = %new.title))]
    pub async fn create_trip_plan(&self, creator_id: i64, new: NewTripPlan) -> Result<TripPlan> {
        new.validate()?;
        self.call(move |conn| {
            let now = Utc::now();
            let itinerary = new
                .itinerary
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| TravelError::storage(format!("itinerary is not serializable: {e}")))?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO trip_plans (title, description, destination, destination_id,
                    creator_id, start_date, end_date, budget, travelers, estimated_total,
                    currency, itinerary, max_participants, is_collaborative, created_at,
                    updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
                params![
                    new.title.trim(),
                    new.description,
                    new.destination.trim(),
                    new.destination_id,
                    creator_id,
                    new.start_date,
                    new.end_date,
                    new.budget,
                    new.travelers,
                    new.estimated_total,
                    new.currency,
                    itinerary,
                    new.max_participants,
                    new.is_collaborative,
                    now
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO trip_participants (trip_plan_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, creator_id, ParticipantRole::Creator, now],
            )?;
            let plan = find_plan(&tx, id)?
                .ok_or_else(|| TravelError::storage("inserted trip plan row vanished"))?;
            tx.commit()?;
            Ok(plan)
        })
        .await
    }

    pub async fn trip_plan(&self, id: i64) -> Result<Option<TripPlan>> {
        self.call(move |conn| find_plan(conn, id)).await
    }

    /// Plans the user takes part in, most recently updated first
    pub async fn trip_plans_for_user(&self, user_id: i64) -> Result<Vec<TripPlanListing>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {PLAN_COLUMNS}, tp.role,
                    (SELECT COUNT(*) FROM trip_participants c WHERE c.trip_plan_id = p.id)
                 FROM trip_plans p
                 JOIN trip_participants tp ON tp.trip_plan_id = p.id
                 WHERE tp.user_id = ?1
                 ORDER BY p.updated_at DESC, p.id DESC"
            ))?;
            let rows = stmt.query_map([user_id], |row| {
                Ok(TripPlanListing {
                    plan: plan_from_row(row)?,
                    role: row.get(17)?,
                    participant_count: row.get(18)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    pub async fn participant_role(&self, plan_id: i64, user_id: i64) -> Result<Option<ParticipantRole>> {
        self.call(move |conn| Ok(find_participant(conn, plan_id, user_id)?.map(|p| p.role)))
            .await
    }

    pub async fn participants(&self, plan_id: i64) -> Result<Vec<TripParticipant>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT tp.trip_plan_id, tp.user_id, u.name, u.email, tp.role, tp.joined_at
                 FROM trip_participants tp JOIN users u ON u.id = tp.user_id
                 WHERE tp.trip_plan_id = ?1
                 ORDER BY tp.joined_at, tp.user_id",
            )?;
            let rows = stmt.query_map([plan_id], participant_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    pub async fn activities(&self, plan_id: i64) -> Result<Vec<TripActivity>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {ACTIVITY_COLUMNS} FROM trip_activities WHERE trip_plan_id = ?1
                 ORDER BY activity_date IS NULL, activity_date, start_time, id"
            ))?;
            let rows = stmt.query_map([plan_id], activity_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Edit plan metadata; the stored itinerary is never touched
    #[tracing::instrument(level = "debug", skip(self, update))]
    pub async fn update_trip_plan(&self, id: i64, update: TripPlanUpdate) -> Result<TripPlan> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let mut plan =
                find_plan(&tx, id)?.ok_or_else(|| TravelError::not_found("Trip plan not found"))?;
            update.apply(&mut plan)?;
            if count_participants(&tx, id)? > plan.max_participants {
                return Err(TravelError::validation(
                    "Max participants cannot be below the current participant count",
                ));
            }
            plan.updated_at = Utc::now();
            tx.execute(
                "UPDATE trip_plans SET title = ?1, description = ?2, start_date = ?3,
                    end_date = ?4, max_participants = ?5, is_collaborative = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    plan.title,
                    plan.description,
                    plan.start_date,
                    plan.end_date,
                    plan.max_participants,
                    plan.is_collaborative,
                    plan.updated_at,
                    id
                ],
            )?;
            tx.commit()?;
            Ok(plan)
        })
        .await
    }

    /// Participants and activities go with the plan
    pub async fn delete_trip_plan(&self, id: i64) -> Result<bool> {
        self.call(move |conn| Ok(conn.execute("DELETE FROM trip_plans WHERE id = ?1", [id])? > 0))
            .await
    }

    /// Add a member, enforcing capacity and uniqueness atomically
    pub async fn add_participant(
        &self,
        plan_id: i64,
        user_id: i64,
        role: ParticipantRole,
    ) -> Result<TripParticipant> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let plan = find_plan(&tx, plan_id)?
                .ok_or_else(|| TravelError::not_found("Trip plan not found"))?;
            if find_participant(&tx, plan_id, user_id)?.is_some() {
                return Err(TravelError::conflict("User is already a participant"));
            }
            if count_participants(&tx, plan_id)? >= plan.max_participants {
                return Err(TravelError::validation("Trip plan is full"));
            }
            tx.execute(
                "INSERT INTO trip_participants (trip_plan_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![plan_id, user_id, role, Utc::now()],
            )?;
            let participant = find_participant(&tx, plan_id, user_id)?
                .ok_or_else(|| TravelError::storage("inserted participant row vanished"))?;
            tx.commit()?;
            Ok(participant)
        })
        .await
    }

    pub async fn remove_participant(&self, plan_id: i64, user_id: i64) -> Result<bool> {
        self.call(move |conn| {
            Ok(conn.execute(
                "DELETE FROM trip_participants WHERE trip_plan_id = ?1 AND user_id = ?2",
                [plan_id, user_id],
            )? > 0)
        })
        .await
    }

    pub async fn add_activity(
        &self,
        plan_id: i64,
        created_by: i64,
        input: ActivityInput,
    ) -> Result<TripActivity> {
        input.validate()?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO trip_activities (trip_plan_id, destination_id, title, description,
                    activity_date, start_time, end_time, cost, category, latitude, longitude,
                    created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    plan_id,
                    input.destination_id,
                    input.title.trim(),
                    input.description,
                    input.activity_date,
                    input.start_time,
                    input.end_time,
                    input.cost,
                    input.category,
                    input.latitude,
                    input.longitude,
                    created_by,
                    Utc::now()
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM trip_activities WHERE id = ?1"),
                [id],
                activity_from_row,
            )?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BudgetTier, NewUser, User};
    use serde_json::json;

    async fn user(store: &Store, email: &str) -> User {
        store
            .create_user(NewUser {
                name: email.split('@').next().unwrap_or("user").into(),
                email: email.into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap()
    }

    fn new_plan(max: u32) -> NewTripPlan {
        let mut plan: NewTripPlan =
            serde_json::from_value(json!({"title": "Goa trip", "destination": "Goa"})).unwrap();
        plan.max_participants = max;
        plan.itinerary = Some(json!({"itinerary": [{"day": 1}]}));
        plan
    }

    #[tokio::test]
    async fn test_create_registers_creator() {
        let store = Store::open_in_memory().unwrap();
        let asha = user(&store, "asha@example.com").await;
        let plan = store.create_trip_plan(asha.id, new_plan(3)).await.unwrap();
        assert_eq!(plan.budget, BudgetTier::MidRange);
        assert_eq!(plan.itinerary, Some(json!({"itinerary": [{"day": 1}]})));
        assert_eq!(
            store.participant_role(plan.id, asha.id).await.unwrap(),
            Some(ParticipantRole::Creator)
        );

        let listing = store.trip_plans_for_user(asha.id).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].participant_count, 1);
        assert_eq!(listing[0].role, ParticipantRole::Creator);
    }

    #[tokio::test]
    async fn test_participant_capacity_and_conflict() {
        let store = Store::open_in_memory().unwrap();
        let asha = user(&store, "asha@example.com").await;
        let ravi = user(&store, "ravi@example.com").await;
        let meera = user(&store, "meera@example.com").await;
        let plan = store.create_trip_plan(asha.id, new_plan(2)).await.unwrap();

        let joined = store
            .add_participant(plan.id, ravi.id, ParticipantRole::Participant)
            .await
            .unwrap();
        assert_eq!(joined.email, "ravi@example.com");

        let again = store
            .add_participant(plan.id, ravi.id, ParticipantRole::Participant)
            .await;
        assert!(matches!(again, Err(TravelError::Conflict { .. })));

        let full = store
            .add_participant(plan.id, meera.id, ParticipantRole::Participant)
            .await;
        assert!(matches!(full, Err(TravelError::Validation { .. })));

        assert!(store.remove_participant(plan.id, ravi.id).await.unwrap());
        assert_eq!(store.participants(plan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_itinerary_and_capacity() {
        let store = Store::open_in_memory().unwrap();
        let asha = user(&store, "asha@example.com").await;
        let ravi = user(&store, "ravi@example.com").await;
        let plan = store.create_trip_plan(asha.id, new_plan(5)).await.unwrap();
        store
            .add_participant(plan.id, ravi.id, ParticipantRole::Editor)
            .await
            .unwrap();

        let update: TripPlanUpdate = serde_json::from_value(json!({"title": "Goa again"})).unwrap();
        let updated = store.update_trip_plan(plan.id, update).await.unwrap();
        assert_eq!(updated.title, "Goa again");
        assert_eq!(updated.itinerary, plan.itinerary);

        let shrink = TripPlanUpdate {
            max_participants: Some(1),
            ..Default::default()
        };
        assert!(store.update_trip_plan(plan.id, shrink).await.is_err());
    }

    #[tokio::test]
    async fn test_activities_and_cascade_delete() {
        let store = Store::open_in_memory().unwrap();
        let asha = user(&store, "asha@example.com").await;
        let plan = store.create_trip_plan(asha.id, new_plan(5)).await.unwrap();
        let activity = store
            .add_activity(
                plan.id,
                asha.id,
                ActivityInput {
                    title: "Spice farm tour".into(),
                    cost: Some(800.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(activity.created_by, asha.id);
        assert_eq!(store.activities(plan.id).await.unwrap(), vec![activity]);

        assert!(store.delete_trip_plan(plan.id).await.unwrap());
        assert!(store.trip_plan(plan.id).await.unwrap().is_none());
        assert!(store.activities(plan.id).await.unwrap().is_empty());
        assert!(store.participants(plan.id).await.unwrap().is_empty());
    }
}
