use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::QuerySpec;
use crate::tours::dto::{NewTour, TourPatch};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub price: f64,
    pub rating_average: f64,
    pub ratings_quantity: i32,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const TOUR_COLUMNS: &str = "id, name, duration, max_group_size, difficulty, price, \
     rating_average, ratings_quantity, summary, description, created_at, updated_at";

impl Tour {
    pub async fn list(db: &PgPool, spec: &QuerySpec) -> anyhow::Result<Vec<Tour>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {TOUR_COLUMNS} FROM tours"));
        spec.apply(&mut qb, false);
        let tours = qb.build_query_as::<Tour>().fetch_all(db).await?;
        Ok(tours)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Tour>> {
        let sql = format!("SELECT {TOUR_COLUMNS} FROM tours WHERE id = $1");
        let tour = sqlx::query_as::<_, Tour>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(tour)
    }

    pub async fn create(db: &PgPool, new: &NewTour) -> anyhow::Result<Tour> {
        let sql = format!(
            "INSERT INTO tours (name, duration, max_group_size, difficulty, price, summary, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {TOUR_COLUMNS}"
        );
        let tour = sqlx::query_as::<_, Tour>(&sql)
            .bind(&new.name)
            .bind(new.duration)
            .bind(new.max_group_size)
            .bind(&new.difficulty)
            .bind(new.price)
            .bind(&new.summary)
            .bind(&new.description)
            .fetch_one(db)
            .await?;
        Ok(tour)
    }

    pub async fn update(db: &PgPool, id: Uuid, patch: &TourPatch) -> anyhow::Result<Option<Tour>> {
        let sql = format!(
            "UPDATE tours SET \
             name = COALESCE($2, name), \
             duration = COALESCE($3, duration), \
             max_group_size = COALESCE($4, max_group_size), \
             difficulty = COALESCE($5, difficulty), \
             price = COALESCE($6, price), \
             rating_average = COALESCE($7, rating_average), \
             ratings_quantity = COALESCE($8, ratings_quantity), \
             summary = COALESCE($9, summary), \
             description = COALESCE($10, description), \
             updated_at = now() \
             WHERE id = $1 RETURNING {TOUR_COLUMNS}"
        );
        let tour = sqlx::query_as::<_, Tour>(&sql)
            .bind(id)
            .bind(&patch.name)
            .bind(patch.duration)
            .bind(patch.max_group_size)
            .bind(&patch.difficulty)
            .bind(patch.price)
            .bind(patch.rating_average)
            .bind(patch.ratings_quantity)
            .bind(&patch.summary)
            .bind(&patch.description)
            .fetch_optional(db)
            .await?;
        Ok(tour)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tours WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tour_serializes_camel_case() {
        let tour = Tour {
            id: Uuid::new_v4(),
            name: "The Forest Hiker".into(),
            duration: 5,
            max_group_size: 25,
            difficulty: "easy".into(),
            price: 397.0,
            rating_average: 4.7,
            ratings_quantity: 37,
            summary: None,
            description: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let value = serde_json::to_value(&tour).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("maxGroupSize"));
        assert!(obj.contains_key("ratingAverage"));
        assert!(obj.contains_key("updatedAt"));
        assert!(!obj.contains_key("max_group_size"));
    }
}
