use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use wattwise::catalog::ReferenceCatalog;
use wattwise::config::Config;
use wattwise::ml::models::ModelArtifact;
use wattwise::pipeline::Target;
use wattwise::store;
use wattwise::telemetry;
use wattwise::worker::{PipelineJob, PipelineWorker};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load()?;

    let catalog = Arc::new(ReferenceCatalog::from_json_files(
        &cfg.catalog.appliances_path,
        &cfg.catalog.tariffs_path,
    )?);
    info!(
        appliances = catalog.appliance_count(),
        tariffs = catalog.tariff_count(),
        "reference catalog loaded"
    );

    #[cfg(feature = "db")]
    let (records, results): (Arc<dyn store::RecordStore>, Arc<dyn store::ResultStore>) = {
        let pg = Arc::new(store::pg::PgStore::connect(&cfg.db.url).await?);
        (pg.clone(), pg)
    };

    #[cfg(not(feature = "db"))]
    let (records, results): (Arc<dyn store::RecordStore>, Arc<dyn store::ResultStore>) = {
        let _ = &cfg.db;
        let mem = Arc::new(store::MemoryStore::new());
        (mem.clone(), mem)
    };

    let initial_artifact = match ModelArtifact::load(&cfg.pipeline.model_path) {
        Ok(artifact) => {
            info!(
                model_id = %artifact.metadata().model_id,
                columns = artifact.schema.len(),
                "loaded model artifact"
            );
            Some(artifact)
        }
        Err(e) => {
            warn!(error = %e, "no usable model artifact; a retrain is required before predictions");
            None
        }
    };

    let (queue, worker) = PipelineWorker::new(
        cfg.worker.queue_depth,
        catalog,
        records,
        results,
        cfg.training.clone(),
        cfg.pipeline.emission_factor,
        cfg.pipeline.model_path.clone(),
        initial_artifact,
    );
    let worker_handle = worker.spawn();

    info!("starting wattwise pipeline service");
    queue
        .enqueue(PipelineJob::Predict {
            target: Target::All,
        })
        .await?;

    telemetry::shutdown_signal().await;
    drop(queue);
    worker_handle.await?;
    warn!("shutdown complete");
    Ok(())
}
