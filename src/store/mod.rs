//! Storage access for consumer records and prediction results.
//!
//! Handles are constructed explicitly and passed in; there is no
//! process-wide connection singleton. The in-memory store is always
//! available; a Postgres-backed store sits behind the `db` feature.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{ApplianceRecord, BillingRecord, ConsumerId, ConsumerProfile, PredictionResult};

pub mod memory;

#[cfg(feature = "db")]
pub mod pg;

pub use memory::MemoryStore;

/// Read access to consumer, appliance and billing records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn consumer(&self, id: ConsumerId) -> Result<Option<ConsumerProfile>>;

    async fn consumers(&self) -> Result<Vec<ConsumerProfile>>;

    async fn bills(&self, id: ConsumerId) -> Result<Vec<BillingRecord>>;

    async fn appliances(&self, id: ConsumerId) -> Result<Vec<ApplianceRecord>>;

    /// Latest billing period label for a consumer, if any bill exists.
    async fn latest_period(&self, id: ConsumerId) -> Result<Option<String>>;

    /// Whether both the appliance set and the billing set are non-empty,
    /// i.e. the consumer has enough data to train and predict on.
    async fn has_training_data(&self, id: ConsumerId) -> Result<bool>;
}

/// Durable storage of prediction results, keyed by (consumer, period).
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or fully replace the row for this key. Atomic per row and
    /// safe to call repeatedly with identical inputs.
    async fn upsert(&self, result: &PredictionResult) -> Result<()>;

    async fn get(&self, id: ConsumerId, period: &str) -> Result<Option<PredictionResult>>;

    async fn for_consumer(&self, id: ConsumerId) -> Result<Vec<PredictionResult>>;
}
