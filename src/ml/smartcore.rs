//! SmartCore random forest predictor, available behind the `ml` feature as
//! an alternative to the default stacked linear model.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use super::models::RegressionModel;
use super::{FeatureVector, ModelMetadata, ModelType};

/// Random forest wrapper. Conservative parameters keep training fast and
/// memory-bounded; the fixed seed keeps refits reproducible.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForestModel {
    pub metadata: ModelMetadata,
    model: RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    pub n_trees: usize,
    pub max_depth: Option<usize>,
}

impl Clone for ForestModel {
    fn clone(&self) -> Self {
        // RandomForestRegressor does not implement Clone; round-trip
        // through its serde representation instead.
        let bytes = bincode::serialize(&self.model).expect("forest serializes");
        let model = bincode::deserialize(&bytes).expect("forest deserializes");
        Self {
            metadata: self.metadata.clone(),
            model,
            n_trees: self.n_trees,
            max_depth: self.max_depth,
        }
    }
}

impl ForestModel {
    pub fn default_parameters() -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: Some(10),
            min_samples_leaf: 2,
            min_samples_split: 5,
            n_trees: 50,
            m: None,
            keep_samples: false,
            seed: 42,
        }
    }

    /// Train a forest on encoded feature rows.
    pub fn train(
        x: &[Vec<f64>],
        y: &[f64],
        params: RandomForestRegressorParameters,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if x.is_empty() || y.is_empty() {
            anyhow::bail!("cannot train on empty dataset");
        }
        if x.len() != y.len() {
            anyhow::bail!(
                "feature and target count mismatch: {} features, {} targets",
                x.len(),
                y.len()
            );
        }

        let n_trees = params.n_trees;
        let max_depth = params.max_depth.map(|d| d as usize);

        let n_samples = x.len();
        let n_features = x[0].len();
        let mut flat_data = Vec::with_capacity(n_samples * n_features);
        for row in x {
            if row.len() != n_features {
                anyhow::bail!("all feature vectors must have the same length");
            }
            flat_data.extend_from_slice(row);
        }

        let x_matrix = DenseMatrix::new(n_samples, n_features, flat_data, false);
        let y_vec = y.to_vec();

        let model = RandomForestRegressor::fit(&x_matrix, &y_vec, params)
            .map_err(|e| anyhow::anyhow!("random forest training failed: {e:?}"))?;

        let predictions = model
            .predict(&x_matrix)
            .map_err(|e| anyhow::anyhow!("validation prediction failed: {e:?}"))?;
        let metrics = super::training::ModelTrainer::new(super::training::TrainingConfig::default())
            .calculate_metrics(&predictions, y)?;

        let metadata = ModelMetadata {
            model_id: format!("forest_{}", uuid::Uuid::new_v4()),
            model_type: ModelType::RandomForest,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            training_samples: n_samples,
            validation_metrics: metrics,
            feature_names,
        };

        Ok(Self {
            metadata,
            model,
            n_trees,
            max_depth,
        })
    }
}

impl RegressionModel for ForestModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let n_features = features.len();
        let x = DenseMatrix::new(1, n_features, features.features.clone(), false);

        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("prediction failed: {e:?}"))?;

        let value = *predictions
            .first()
            .ok_or_else(|| anyhow::anyhow!("model returned no predictions"))?;

        if value < 0.0 {
            anyhow::bail!("invalid prediction: negative consumption ({value:.2} kWh)");
        }

        Ok(value)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
