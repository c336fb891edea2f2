// Database connection and pool management
// This module handles PostgreSQL connections using sqlx

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .with_context(|| "Failed to connect to PostgreSQL".to_string())?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `cars` table and its uniqueness constraints when they do
    /// not exist yet. Both `url` and `car_vin` carry unique constraints;
    /// NULL VINs are exempt under PostgreSQL semantics.
    pub async fn ensure_schema(&self) -> Result<()> {
        let create_cars_sql = r#"
            CREATE TABLE IF NOT EXISTS cars (
                id BIGSERIAL PRIMARY KEY,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                price_usd INTEGER NOT NULL,
                odometer INTEGER,
                username TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                image_url TEXT,
                images_count INTEGER DEFAULT 0,
                car_number TEXT,
                car_vin TEXT,
                datetime_found TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT uq_car_url UNIQUE (url),
                CONSTRAINT uq_car_vin UNIQUE (car_vin)
            )
        "#;

        sqlx::query(create_cars_sql)
            .execute(&self.pool)
            .await
            .context("Failed to create cars table")?;

        Ok(())
    }
}
