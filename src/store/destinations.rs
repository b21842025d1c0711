use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Result, Store, join_tags};
use crate::{
    TravelError,
    models::{Destination, DestinationInput, DestinationPatch, patch::split_tags},
};

const DESTINATION_COLUMNS: &str = "id, title, description, category, budget_tier, latitude, \
     longitude, website, country, city, average_cost_per_day, best_time_to_visit, rating, \
     review_count, popularity_score, tags, estimated_duration_hours, created_at";

fn destination_from_row(row: &Row<'_>) -> rusqlite::Result<Destination> {
    let tags: Option<String> = row.get(15)?;
    Ok(Destination {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        budget_tier: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        website: row.get(7)?,
        country: row.get(8)?,
        city: row.get(9)?,
        average_cost_per_day: row.get(10)?,
        best_time_to_visit: row.get(11)?,
        rating: row.get(12)?,
        review_count: row.get(13)?,
        popularity_score: row.get(14)?,
        tags: tags.as_deref().map(split_tags).unwrap_or_default(),
        estimated_duration_hours: row.get(16)?,
        created_at: row.get(17)?,
    })
}

fn find_destination(conn: &Connection, id: i64) -> Result<Option<Destination>> {
    Ok(conn
        .query_row(
            &format!("SELECT {DESTINATION_COLUMNS} FROM destinations WHERE id = ?1"),
            [id],
            destination_from_row,
        )
        .optional()?)
}

fn all_destinations(conn: &Connection) -> Result<Vec<Destination>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {DESTINATION_COLUMNS} FROM destinations ORDER BY created_at DESC, id DESC"
    ))?;
    let rows = stmt.query_map([], destination_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn write_destination(conn: &Connection, d: &Destination) -> Result<()> {
    conn.execute(
        "UPDATE destinations SET title = ?1, description = ?2, category = ?3, budget_tier = ?4,
            latitude = ?5, longitude = ?6, website = ?7, country = ?8, city = ?9,
            average_cost_per_day = ?10, best_time_to_visit = ?11, rating = ?12,
            review_count = ?13, popularity_score = ?14, tags = ?15,
            estimated_duration_hours = ?16
         WHERE id = ?17",
        params![
            d.title,
            d.description,
            d.category,
            d.budget_tier,
            d.latitude,
            d.longitude,
            d.website,
            d.country,
            d.city,
            d.average_cost_per_day,
            d.best_time_to_visit,
            d.rating,
            d.review_count,
            d.popularity_score,
            join_tags(&d.tags),
            d.estimated_duration_hours,
            d.id
        ],
    )?;
    Ok(())
}

impl Store {
    /// The whole catalog, newest first
    pub async fn list_destinations(&self) -> Result<Vec<Destination>> {
        self.call(|conn| all_destinations(conn)).await
    }

    pub async fn destination(&self, id: i64) -> Result<Option<Destination>> {
        self.call(move |conn| find_destination(conn, id)).await
    }

    #[tracing::instrument(level = "debug", skip(self, input), fields(title = %input.title))]
    pub async fn create_destination(&self, input: DestinationInput) -> Result<Destination> {
        let input = input.normalized();
        input.validate()?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO destinations (title, description, category, budget_tier, latitude,
                    longitude, website, country, city, average_cost_per_day, best_time_to_visit,
                    rating, review_count, tags, estimated_duration_hours, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    input.title,
                    input.description,
                    input.category,
                    input.budget_tier,
                    input.latitude,
                    input.longitude,
                    input.website,
                    input.country,
                    input.city,
                    input.average_cost_per_day,
                    input.best_time_to_visit,
                    input.rating,
                    input.review_count,
                    join_tags(&input.tags),
                    input.estimated_duration_hours,
                    Utc::now()
                ],
            )?;
            let id = conn.last_insert_rowid();
            find_destination(conn, id)?
                .ok_or_else(|| TravelError::storage("inserted destination row vanished"))
        })
        .await
    }

    /// Apply a partial update inside one transaction
    #[tracing::instrument(level = "debug", skip(self, patch))]
    pub async fn update_destination(&self, id: i64, patch: DestinationPatch) -> Result<Destination> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let mut destination = find_destination(&tx, id)?
                .ok_or_else(|| TravelError::not_found("Destination not found"))?;
            patch.apply(&mut destination)?;
            write_destination(&tx, &destination)?;
            tx.commit()?;
            Ok(destination)
        })
        .await
    }

    /// Returns whether a row was deleted
    pub async fn delete_destination(&self, id: i64) -> Result<bool> {
        self.call(move |conn| Ok(conn.execute("DELETE FROM destinations WHERE id = ?1", [id])? > 0))
            .await
    }

    /// Recompute every popularity score from rating and reviews
    pub async fn refresh_popularity(&self) -> Result<usize> {
        let updated = self
            .call(|conn| {
                let tx = conn.transaction()?;
                let destinations = all_destinations(&tx)?;
                {
                    let mut stmt = tx
                        .prepare_cached("UPDATE destinations SET popularity_score = ?1 WHERE id = ?2")?;
                    for destination in &destinations {
                        stmt.execute(params![destination.computed_popularity(), destination.id])?;
                    }
                }
                tx.commit()?;
                Ok(destinations.len())
            })
            .await?;
        tracing::info!(updated, "refreshed destination popularity");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BudgetTier;

    fn input(title: &str) -> DestinationInput {
        DestinationInput {
            title: title.into(),
            category: Some("beach".into()),
            budget_tier: Some(BudgetTier::Budget),
            latitude: Some(15.2993),
            longitude: Some(74.124),
            rating: Some(4.0),
            review_count: 50,
            tags: vec!["beach".into(), "food".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_crud_round() {
        let store = Store::open_in_memory().unwrap();
        let created = store.create_destination(input("Goa")).await.unwrap();
        assert_eq!(created.tags, vec!["beach", "food"]);
        assert_eq!(created.budget_tier, Some(BudgetTier::Budget));

        let patch: DestinationPatch =
            serde_json::from_str(r#"{"category": "", "rating": "4.8"}"#).unwrap();
        let updated = store.update_destination(created.id, patch).await.unwrap();
        assert_eq!(updated.category, None);
        assert_eq!(updated.rating, Some(4.8));
        assert_eq!(store.destination(created.id).await.unwrap(), Some(updated));

        assert!(store.delete_destination(created.id).await.unwrap());
        assert!(store.destination(created.id).await.unwrap().is_none());
        assert!(!store.delete_destination(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_tags_with_commas_are_split() {
        let store = Store::open_in_memory().unwrap();
        let created = store
            .create_destination(DestinationInput {
                tags: vec!["food, wine".into(), "beach".into()],
                ..input("Goa")
            })
            .await
            .unwrap();
        assert_eq!(created.tags, vec!["food", "wine", "beach"]);
        let again = store.destination(created.id).await.unwrap().unwrap();
        assert_eq!(again.tags, created.tags);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store.create_destination(input("First")).await.unwrap();
        store.create_destination(input("Second")).await.unwrap();
        let titles: Vec<String> = store
            .list_destinations()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.title)
            .collect();
        assert_eq!(titles, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn test_invalid_input_and_missing_rows() {
        let store = Store::open_in_memory().unwrap();
        let result = store.create_destination(input("  ")).await;
        assert!(matches!(result, Err(TravelError::Validation { .. })));

        let result = store.update_destination(42, DestinationPatch::default()).await;
        assert!(matches!(result, Err(TravelError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_refresh_popularity() {
        let store = Store::open_in_memory().unwrap();
        let created = store.create_destination(input("Goa")).await.unwrap();
        assert_eq!(store.refresh_popularity().await.unwrap(), 1);
        let refreshed = store.destination(created.id).await.unwrap().unwrap();
        // 4.0 * 0.5 + 0.5 * 0.3 + 0.2
        assert!((refreshed.popularity_score - 2.35).abs() < 1e-9);
    }
}
