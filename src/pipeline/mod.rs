//! The prediction pipeline: join → encode → predict → post-process →
//! upsert, with per-consumer outcomes instead of one opaque batch failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::ReferenceCatalog;
use crate::domain::{ConsumerId, ConsumerProfile, PredictionResult};
use crate::ml::models::ModelArtifact;
use crate::store::{RecordStore, ResultStore};

pub mod encoder;
pub mod joiner;
pub mod postprocess;

use encoder::FeatureEncoder;
use joiner::{DataJoiner, JoinedRow};
use postprocess::PostProcessor;

/// Per-row pipeline failures. Join gaps and missing reference data are not
/// errors — they are zero-filled upstream.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Live feature columns could not be reconciled with the trained
    /// schema. Fatal for this consumer's run; a silent mismatch would
    /// corrupt the prediction without any signal.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The model rejected a single row. The batch keeps going.
    #[error("prediction failed: {0}")]
    Prediction(String),
}

/// Which consumers a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    All,
    Consumers(Vec<ConsumerId>),
}

/// Outcome of one (consumer, period) row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    SchemaMismatch(String),
    PredictionFailure(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerOutcome {
    pub consumer_id: ConsumerId,
    pub period: String,
    pub status: OutcomeStatus,
}

/// Aggregated result of one `run_prediction` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub outcomes: Vec<ConsumerOutcome>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ConsumerOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status != OutcomeStatus::Success)
    }

    fn push(&mut self, consumer_id: ConsumerId, period: String, status: OutcomeStatus) {
        self.outcomes.push(ConsumerOutcome {
            consumer_id,
            period,
            status,
        });
    }
}

/// One pipeline run over a fixed model artifact. The artifact is shared
/// read-only; per-consumer work is independent.
pub struct PredictionPipeline {
    catalog: Arc<ReferenceCatalog>,
    artifact: Arc<ModelArtifact>,
    encoder: FeatureEncoder,
    post: PostProcessor,
}

impl PredictionPipeline {
    pub fn new(
        catalog: Arc<ReferenceCatalog>,
        artifact: Arc<ModelArtifact>,
        emission_factor: f64,
    ) -> Self {
        let encoder = FeatureEncoder::new(artifact.schema.clone());
        Self {
            catalog,
            artifact,
            encoder,
            post: PostProcessor::new(emission_factor),
        }
    }

    /// Execute the pipeline for the targeted consumers. Idempotent: re-runs
    /// with unchanged upstream data upsert byte-identical rows.
    pub async fn run(
        &self,
        target: &Target,
        records: &dyn RecordStore,
        results: &dyn ResultStore,
    ) -> anyhow::Result<BatchOutcome> {
        let profiles = self.resolve_target(target, records).await?;
        let joiner = DataJoiner::new(&self.catalog);

        let mut outcome = BatchOutcome::default();
        for profile in &profiles {
            let bills = records.bills(profile.consumer_id).await?;
            let appliances = records.appliances(profile.consumer_id).await?;
            let rows = joiner.join_consumer(profile, &bills, &appliances);

            for row in rows {
                match self.predict_row(&row) {
                    Ok(result) => {
                        results.upsert(&result).await?;
                        outcome.push(row.consumer_id, row.period, OutcomeStatus::Success);
                    }
                    Err(PipelineError::SchemaMismatch(detail)) => {
                        warn!(
                            consumer_id = row.consumer_id,
                            period = %row.period,
                            %detail,
                            "schema mismatch; skipping consumer row"
                        );
                        outcome.push(
                            row.consumer_id,
                            row.period,
                            OutcomeStatus::SchemaMismatch(detail),
                        );
                    }
                    Err(PipelineError::Prediction(detail)) => {
                        warn!(
                            consumer_id = row.consumer_id,
                            period = %row.period,
                            %detail,
                            "prediction failed; continuing with remaining consumers"
                        );
                        outcome.push(
                            row.consumer_id,
                            row.period,
                            OutcomeStatus::PredictionFailure(detail),
                        );
                    }
                }
            }
        }

        info!(
            targeted = profiles.len(),
            succeeded = outcome.succeeded(),
            failed = outcome.failed().count(),
            "prediction run complete"
        );
        Ok(outcome)
    }

    fn predict_row(&self, row: &JoinedRow) -> Result<PredictionResult, PipelineError> {
        let features = self.encoder.encode(row)?;
        // Explicit precondition before touching the model.
        self.encoder.verify(&features)?;

        let raw = self
            .artifact
            .predict(&features)
            .map_err(|e| PipelineError::Prediction(e.to_string()))?;
        if !raw.is_finite() {
            return Err(PipelineError::Prediction(format!(
                "model produced a non-finite value: {raw}"
            )));
        }
        let predicted = raw.max(0.0);

        let metrics = self.post.derive(predicted, row);
        Ok(PredictionResult {
            consumer_id: row.consumer_id,
            period: row.period.clone(),
            predicted_consumption: predicted,
            reduced_consumption: metrics.reduced_consumption,
            bill_amount: metrics.bill_amount,
            reduced_bill_amount: metrics.reduced_bill_amount,
            carbon_footprint: metrics.carbon_footprint,
            reduced_carbon_footprint: metrics.reduced_carbon_footprint,
        })
    }

    async fn resolve_target(
        &self,
        target: &Target,
        records: &dyn RecordStore,
    ) -> anyhow::Result<Vec<ConsumerProfile>> {
        match target {
            Target::All => records.consumers().await,
            Target::Consumers(ids) => {
                let mut profiles = Vec::with_capacity(ids.len());
                for &id in ids {
                    match records.consumer(id).await? {
                        Some(profile) => profiles.push(profile),
                        None => warn!(consumer_id = id, "targeted consumer does not exist"),
                    }
                }
                Ok(profiles)
            }
        }
    }
}
