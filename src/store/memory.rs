//! In-memory store used for tests and single-node deployments.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use validator::Validate;

use super::{RecordStore, ResultStore};
use crate::domain::{ApplianceRecord, BillingRecord, ConsumerId, ConsumerProfile, PredictionResult};

/// Hash-map backed implementation of both store traits. Each map is guarded
/// by its own lock; an upsert holds the results lock for the whole write,
/// so no reader ever observes a half-updated row.
#[derive(Debug, Default)]
pub struct MemoryStore {
    consumers: RwLock<HashMap<ConsumerId, ConsumerProfile>>,
    appliances: RwLock<HashMap<(ConsumerId, String), ApplianceRecord>>,
    bills: RwLock<HashMap<(ConsumerId, String), BillingRecord>>,
    results: RwLock<HashMap<(ConsumerId, String), PredictionResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_consumer(&self, profile: ConsumerProfile) -> Result<()> {
        profile
            .validate()
            .with_context(|| format!("invalid profile for consumer {}", profile.consumer_id))?;
        self.consumers.write().insert(profile.consumer_id, profile);
        Ok(())
    }

    pub fn insert_appliance(&self, record: ApplianceRecord) -> Result<()> {
        record.validate().with_context(|| {
            format!("invalid appliance record for consumer {}", record.consumer_id)
        })?;
        self.appliances
            .write()
            .insert((record.consumer_id, record.appliance_name.clone()), record);
        Ok(())
    }

    pub fn insert_bill(&self, record: BillingRecord) -> Result<()> {
        record
            .validate()
            .with_context(|| format!("invalid bill for consumer {}", record.consumer_id))?;
        self.bills
            .write()
            .insert((record.consumer_id, record.period.clone()), record);
        Ok(())
    }

    pub fn result_count(&self) -> usize {
        self.results.read().len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn consumer(&self, id: ConsumerId) -> Result<Option<ConsumerProfile>> {
        Ok(self.consumers.read().get(&id).cloned())
    }

    async fn consumers(&self) -> Result<Vec<ConsumerProfile>> {
        let mut all: Vec<ConsumerProfile> = self.consumers.read().values().cloned().collect();
        all.sort_by_key(|p| p.consumer_id);
        Ok(all)
    }

    async fn bills(&self, id: ConsumerId) -> Result<Vec<BillingRecord>> {
        let mut bills: Vec<BillingRecord> = self
            .bills
            .read()
            .values()
            .filter(|b| b.consumer_id == id)
            .cloned()
            .collect();
        bills.sort_by(|a, b| a.period.cmp(&b.period));
        Ok(bills)
    }

    async fn appliances(&self, id: ConsumerId) -> Result<Vec<ApplianceRecord>> {
        let mut appliances: Vec<ApplianceRecord> = self
            .appliances
            .read()
            .values()
            .filter(|a| a.consumer_id == id)
            .cloned()
            .collect();
        appliances.sort_by(|a, b| a.appliance_name.cmp(&b.appliance_name));
        Ok(appliances)
    }

    async fn latest_period(&self, id: ConsumerId) -> Result<Option<String>> {
        Ok(self
            .bills
            .read()
            .values()
            .filter(|b| b.consumer_id == id)
            .map(|b| b.period.clone())
            .max())
    }

    async fn has_training_data(&self, id: ConsumerId) -> Result<bool> {
        let has_bills = self.bills.read().values().any(|b| b.consumer_id == id);
        let has_appliances = self
            .appliances
            .read()
            .values()
            .any(|a| a.consumer_id == id);
        Ok(has_bills && has_appliances)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn upsert(&self, result: &PredictionResult) -> Result<()> {
        self.results.write().insert(
            (result.consumer_id, result.period.clone()),
            result.clone(),
        );
        Ok(())
    }

    async fn get(&self, id: ConsumerId, period: &str) -> Result<Option<PredictionResult>> {
        Ok(self.results.read().get(&(id, period.to_string())).cloned())
    }

    async fn for_consumer(&self, id: ConsumerId) -> Result<Vec<PredictionResult>> {
        let mut results: Vec<PredictionResult> = self
            .results
            .read()
            .values()
            .filter(|r| r.consumer_id == id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.period.cmp(&b.period));
        Ok(results)
    }
}
