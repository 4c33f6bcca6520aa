//! Postgres-backed store, enabled with the `db` feature.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{RecordStore, ResultStore};
use crate::domain::{ApplianceRecord, BillingRecord, ConsumerId, ConsumerProfile, PredictionResult};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn consumer(&self, id: ConsumerId) -> Result<Option<ConsumerProfile>> {
        let profile = sqlx::query_as::<_, ConsumerProfile>(
            r#"
            SELECT consumer_id, name, family_members, working_members, ages, location
            FROM consumers
            WHERE consumer_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn consumers(&self) -> Result<Vec<ConsumerProfile>> {
        let profiles = sqlx::query_as::<_, ConsumerProfile>(
            r#"
            SELECT consumer_id, name, family_members, working_members, ages, location
            FROM consumers
            ORDER BY consumer_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn bills(&self, id: ConsumerId) -> Result<Vec<BillingRecord>> {
        let bills = sqlx::query_as::<_, BillingRecord>(
            r#"
            SELECT consumer_id, period, units_consumed, cost_per_unit
            FROM bills
            WHERE consumer_id = $1
            ORDER BY period
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bills)
    }

    async fn appliances(&self, id: ConsumerId) -> Result<Vec<ApplianceRecord>> {
        let appliances = sqlx::query_as::<_, ApplianceRecord>(
            r#"
            SELECT consumer_id, appliance_name, usage_hours
            FROM appliances
            WHERE consumer_id = $1
            ORDER BY appliance_name
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(appliances)
    }

    async fn latest_period(&self, id: ConsumerId) -> Result<Option<String>> {
        let period = sqlx::query_scalar::<_, String>(
            r#"
            SELECT period FROM bills
            WHERE consumer_id = $1
            ORDER BY period DESC
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(period)
    }

    async fn has_training_data(&self, id: ConsumerId) -> Result<bool> {
        let has_both = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (SELECT 1 FROM bills WHERE consumer_id = $1)
               AND EXISTS (SELECT 1 FROM appliances WHERE consumer_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(has_both)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn upsert(&self, result: &PredictionResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions (
                consumer_id, period, predicted_consumption, reduced_consumption,
                bill_amount, reduced_bill_amount, carbon_footprint, reduced_carbon_footprint
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (consumer_id, period)
            DO UPDATE SET
                predicted_consumption = EXCLUDED.predicted_consumption,
                reduced_consumption = EXCLUDED.reduced_consumption,
                bill_amount = EXCLUDED.bill_amount,
                reduced_bill_amount = EXCLUDED.reduced_bill_amount,
                carbon_footprint = EXCLUDED.carbon_footprint,
                reduced_carbon_footprint = EXCLUDED.reduced_carbon_footprint
            "#,
        )
        .bind(result.consumer_id)
        .bind(&result.period)
        .bind(result.predicted_consumption)
        .bind(result.reduced_consumption)
        .bind(result.bill_amount)
        .bind(result.reduced_bill_amount)
        .bind(result.carbon_footprint)
        .bind(result.reduced_carbon_footprint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: ConsumerId, period: &str) -> Result<Option<PredictionResult>> {
        let result = sqlx::query_as::<_, PredictionResult>(
            r#"
            SELECT consumer_id, period, predicted_consumption, reduced_consumption,
                   bill_amount, reduced_bill_amount, carbon_footprint, reduced_carbon_footprint
            FROM predictions
            WHERE consumer_id = $1 AND period = $2
            "#,
        )
        .bind(id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    async fn for_consumer(&self, id: ConsumerId) -> Result<Vec<PredictionResult>> {
        let results = sqlx::query_as::<_, PredictionResult>(
            r#"
            SELECT consumer_id, period, predicted_consumption, reduced_consumption,
                   bill_amount, reduced_bill_amount, carbon_footprint, reduced_carbon_footprint
            FROM predictions
            WHERE consumer_id = $1
            ORDER BY period
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(results)
    }
}
