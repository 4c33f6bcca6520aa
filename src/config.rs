use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::PathBuf;

use crate::ml::training::TrainingConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub training: TrainingConfig,
    pub catalog: CatalogConfig,
    pub worker: WorkerConfig,
    pub db: DbConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// kg CO2 emitted per kWh consumed. Region-dependent, so configured
    /// rather than baked in.
    pub emission_factor: f64,
    /// Where the serialized model artifact (model + feature schema) lives.
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub appliances_path: PathBuf,
    pub tariffs_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("WATTWISE__").split("__"));
        Ok(figment.extract()?)
    }
}
