//! Background job queue decoupling training and prediction from record
//! writes.
//!
//! Record-creation paths never block on model training: they publish a job
//! and return. A single worker task consumes the queue, which also
//! serializes training runs against each other.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::ReferenceCatalog;
use crate::domain::{ConsumerId, UNKNOWN_PERIOD};
use crate::ml::models::ModelArtifact;
use crate::ml::training::{ModelTrainer, TrainingConfig};
use crate::pipeline::joiner::{DataJoiner, JoinedRow};
use crate::pipeline::{BatchOutcome, PredictionPipeline, Target};
use crate::store::{RecordStore, ResultStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineJob {
    /// Refit the model on the full population and persist the artifact.
    Retrain,
    /// Run the prediction pipeline for the targeted consumers.
    Predict { target: Target },
}

/// Cheap cloneable handle for publishing jobs.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<PipelineJob>,
}

impl JobQueue {
    pub async fn enqueue(&self, job: PipelineJob) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| anyhow::anyhow!("pipeline worker is gone"))
    }

    /// Trigger hook for record writes: once a consumer has both bills and
    /// appliances, schedule a retrain and a re-prediction for them.
    pub async fn record_event(
        &self,
        records: &dyn RecordStore,
        consumer_id: ConsumerId,
    ) -> Result<()> {
        if records.has_training_data(consumer_id).await? {
            self.enqueue(PipelineJob::Retrain).await?;
            self.enqueue(PipelineJob::Predict {
                target: Target::Consumers(vec![consumer_id]),
            })
            .await?;
        } else {
            debug!(consumer_id, "not enough data to train yet");
        }
        Ok(())
    }
}

type ArtifactSlot = Arc<RwLock<Option<Arc<ModelArtifact>>>>;

pub struct PipelineWorker {
    rx: mpsc::Receiver<PipelineJob>,
    catalog: Arc<ReferenceCatalog>,
    records: Arc<dyn RecordStore>,
    results: Arc<dyn ResultStore>,
    training: TrainingConfig,
    emission_factor: f64,
    model_path: PathBuf,
    artifact: ArtifactSlot,
}

impl PipelineWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue_depth: usize,
        catalog: Arc<ReferenceCatalog>,
        records: Arc<dyn RecordStore>,
        results: Arc<dyn ResultStore>,
        training: TrainingConfig,
        emission_factor: f64,
        model_path: PathBuf,
        initial_artifact: Option<ModelArtifact>,
    ) -> (JobQueue, Self) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let worker = Self {
            rx,
            catalog,
            records,
            results,
            training,
            emission_factor,
            model_path,
            artifact: Arc::new(RwLock::new(initial_artifact.map(Arc::new))),
        };
        (JobQueue { tx }, worker)
    }

    /// Consume jobs until every queue handle is dropped.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = self.rx.recv().await {
                match job {
                    PipelineJob::Retrain => {
                        if let Err(e) = self.retrain().await {
                            error!(error = %e, "model training failed");
                        }
                    }
                    PipelineJob::Predict { target } => match self.predict(&target).await {
                        Ok(outcome) => {
                            for failure in outcome.failed() {
                                warn!(
                                    consumer_id = failure.consumer_id,
                                    period = %failure.period,
                                    status = ?failure.status,
                                    "consumer row failed"
                                );
                            }
                        }
                        Err(e) => error!(error = %e, "prediction run failed"),
                    },
                }
            }
            info!("pipeline worker stopped");
        })
    }

    async fn retrain(&self) -> Result<()> {
        let rows = self.training_rows().await?;
        let trainer = ModelTrainer::new(self.training.clone());
        let artifact = trainer.train(&rows)?;
        artifact.save(&self.model_path)?;
        info!(
            model_id = %artifact.metadata().model_id,
            columns = artifact.schema.len(),
            path = %self.model_path.display(),
            "model artifact persisted"
        );
        *self.artifact.write().await = Some(Arc::new(artifact));
        Ok(())
    }

    async fn predict(&self, target: &Target) -> Result<BatchOutcome> {
        let artifact = match self.artifact.read().await.clone() {
            Some(artifact) => artifact,
            None => {
                warn!("no trained model yet; skipping prediction run");
                return Ok(BatchOutcome::default());
            }
        };

        let pipeline =
            PredictionPipeline::new(Arc::clone(&self.catalog), artifact, self.emission_factor);
        pipeline
            .run(target, self.records.as_ref(), self.results.as_ref())
            .await
    }

    /// Historical joined rows with a real billing period; rows without a
    /// measured target are useless for fitting.
    async fn training_rows(&self) -> Result<Vec<JoinedRow>> {
        let joiner = DataJoiner::new(&self.catalog);
        let mut rows = Vec::new();
        for profile in self.records.consumers().await? {
            let bills = self.records.bills(profile.consumer_id).await?;
            let appliances = self.records.appliances(profile.consumer_id).await?;
            rows.extend(
                joiner
                    .join_consumer(&profile, &bills, &appliances)
                    .into_iter()
                    .filter(|row| row.period != UNKNOWN_PERIOD),
            );
        }
        Ok(rows)
    }
}
