//! PostgreSQL repository for car records
//!
//! Insertion is protected twice against concurrent writers: a table lock
//! serializes the re-check-and-insert, and a unique-violation fallback
//! re-queries the winning row if the store still rejects the insert.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::domain::car::NewCar;
use crate::domain::repositories::{CarRepository, InsertOutcome};

#[derive(Clone)]
pub struct PgCarRepository {
    pool: PgPool,
}

impl PgCarRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_id_by_url(&self, url: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM cars WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn find_id_by_vin(&self, vin: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM cars WHERE car_vin = $1")
            .bind(vin)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// After a unique violation, find the row the concurrent writer won
    /// with, so the caller can report a skip instead of an error.
    async fn find_winning_row(&self, car: &NewCar) -> Result<Option<i64>> {
        if let Some(id) = self.find_id_by_url(&car.url).await? {
            info!("Car with URL {} was added by another writer, ID: {}", car.url, id);
            return Ok(Some(id));
        }
        if let Some(vin) = &car.car_vin {
            if let Some(id) = self.find_id_by_vin(vin).await? {
                info!("Car with VIN {} was added by another writer, ID: {}", vin, id);
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl CarRepository for PgCarRepository {
    async fn exists_by_url(&self, url: &str) -> Result<bool> {
        Ok(self.find_id_by_url(url).await?.is_some())
    }

    async fn filter_existing(&self, urls: &[String]) -> Result<HashSet<String>> {
        if urls.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = sqlx::query("SELECT url FROM cars WHERE url = ANY($1)")
            .bind(urls)
            .fetch_all(&self.pool)
            .await
            .context("Batch URL existence check failed")?;

        Ok(rows.into_iter().map(|row| row.get::<String, _>("url")).collect())
    }

    async fn insert_car(&self, car: &NewCar) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serialize writers for the re-check-and-insert window; readers are
        // not blocked by this mode.
        sqlx::query("LOCK TABLE cars IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .context("Failed to lock cars table")?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM cars WHERE url = $1")
            .bind(&car.url)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(id) = existing {
            info!("Car with URL {} already exists in DB, ID: {}", car.url, id);
            tx.commit().await?;
            return Ok(InsertOutcome::AlreadyExists);
        }

        if let Some(vin) = &car.car_vin {
            let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM cars WHERE car_vin = $1")
                .bind(vin)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(id) = existing {
                info!("Car with VIN {} already exists in DB, ID: {}", vin, id);
                tx.commit().await?;
                return Ok(InsertOutcome::AlreadyExists);
            }
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO cars
            (url, title, price_usd, odometer, username, phone_number,
             image_url, images_count, car_number, car_vin, datetime_found)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&car.url)
        .bind(&car.title)
        .bind(car.price_usd)
        .bind(car.odometer)
        .bind(&car.username)
        .bind(&car.phone_number)
        .bind(&car.image_url)
        .bind(car.images_count)
        .bind(&car.car_number)
        .bind(&car.car_vin)
        .bind(car.datetime_found)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(id) => {
                tx.commit().await?;
                info!("Car {} successfully saved, ID: {}", car.url, id);
                Ok(InsertOutcome::Inserted(id))
            }
            Err(err) if is_unique_violation(&err) => {
                // Isolation-level edge case: a concurrent writer slipped in
                // despite the lock. Find its row and report a skip.
                tx.rollback().await.ok();
                match self.find_winning_row(car).await? {
                    Some(_) => Ok(InsertOutcome::AlreadyExists),
                    None => {
                        warn!("Unique violation for {} but no winning row found", car.url);
                        Err(err).context("Integrity error when saving car")
                    }
                }
            }
            Err(err) => {
                tx.rollback().await.ok();
                Err(err).with_context(|| format!("Error saving car {}", car.url))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_car(url: &str, vin: Option<&str>) -> NewCar {
        NewCar {
            url: url.to_string(),
            title: Some("Test Car 2020".to_string()),
            price_usd: Some(15000),
            odometer: Some(90000),
            username: Some("Test Seller".to_string()),
            phone_number: "+380671234567".to_string(),
            image_url: None,
            images_count: Some(1),
            car_number: None,
            car_vin: vin.map(str::to_string),
            datetime_found: Utc::now(),
        }
    }

    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("DATABASE_URL").ok()?;
        PgPool::connect(&url).await.ok()
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL at DATABASE_URL"]
    async fn insert_then_duplicate_url_reports_already_exists() {
        let pool = test_pool().await.expect("DATABASE_URL must point at PostgreSQL");
        let conn = crate::infrastructure::database_connection::DatabaseConnection::connect(
            &std::env::var("DATABASE_URL").unwrap(),
        )
        .await
        .unwrap();
        conn.ensure_schema().await.unwrap();

        let repo = PgCarRepository::new(pool);
        let url = format!("https://auto.ria.com/auto_test_{}.html", uuid::Uuid::new_v4());
        let car = sample_car(&url, None);

        let first = repo.insert_car(&car).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = repo.insert_car(&car).await.unwrap();
        assert_eq!(second, InsertOutcome::AlreadyExists);
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL at DATABASE_URL"]
    async fn concurrent_inserts_for_same_url_persist_one_row() {
        let pool = test_pool().await.expect("DATABASE_URL must point at PostgreSQL");
        let repo = std::sync::Arc::new(PgCarRepository::new(pool));
        let url = format!("https://auto.ria.com/auto_race_{}.html", uuid::Uuid::new_v4());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let repo = std::sync::Arc::clone(&repo);
            let car = sample_car(&url, None);
            handles.push(tokio::spawn(async move { repo.insert_car(&car).await }));
        }

        let mut inserted = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                InsertOutcome::Inserted(_) => inserted += 1,
                InsertOutcome::AlreadyExists => duplicates += 1,
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(duplicates, 3);
    }
}
