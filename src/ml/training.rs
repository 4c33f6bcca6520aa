//! Offline model training.
//!
//! Training is a separate flow from prediction: historical joined rows are
//! run through a schema-defining encoding pass, a stacked pair of linear
//! learners is fitted by gradient descent over standardized features, and
//! the result is packaged as a [`ModelArtifact`] carrying the exact ordered
//! schema it was trained with.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::models::{LinearRegressionModel, ModelArtifact, ModelKind, RegressionModel, StackedModel};
use super::{FeatureVector, ModelMetadata, ModelType, StandardScaler, ValidationMetrics};
use crate::pipeline::encoder::{FeatureEncoder, FeatureSchema};
use crate::pipeline::joiner::JoinedRow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub max_iterations: usize,
    pub validation_split: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            max_iterations: 2000,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

/// Feature rows plus targets, post-encoding.
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub features: Vec<FeatureVector>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    pub fn new(features: Vec<FeatureVector>, targets: Vec<f64>) -> Result<Self> {
        if features.len() != targets.len() {
            anyhow::bail!(
                "feature and target count mismatch: {} features, {} targets",
                features.len(),
                targets.len()
            );
        }
        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Deterministic shuffled split into (train, validation).
    pub fn shuffled_split(&self, train_ratio: f64, seed: u64) -> Result<(Self, Self)> {
        if !(0.0..=1.0).contains(&train_ratio) {
            anyhow::bail!("train ratio must be within [0, 1]");
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let split_idx = (self.len() as f64 * train_ratio).floor() as usize;
        let (train_idx, val_idx) = indices.split_at(split_idx);

        let pick = |idx: &[usize]| Self {
            features: idx.iter().map(|&i| self.features[i].clone()).collect(),
            targets: idx.iter().map(|&i| self.targets[i]).collect(),
        };

        Ok((pick(train_idx), pick(val_idx)))
    }
}

pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Train the full stacked artifact from joined historical rows. The
    /// target is the measured consumption on the billing record.
    pub fn train(&self, rows: &[JoinedRow]) -> Result<ModelArtifact> {
        if rows.len() < 4 {
            anyhow::bail!("insufficient training data: {} rows", rows.len());
        }

        let schema = FeatureSchema::fit(rows);
        let encoder = FeatureEncoder::new(schema.clone());

        let mut features = Vec::with_capacity(rows.len());
        for row in rows {
            features.push(encoder.encode(row)?);
        }
        // The target column also sits in the schema: the trained column set
        // must match what live rows encode to, and live rows carry the
        // measured consumption.
        let targets: Vec<f64> = rows.iter().map(|r| r.units_consumed).collect();

        let scaler = StandardScaler::fit(&features)?;
        let scaled: Vec<FeatureVector> = features
            .iter()
            .map(|f| scaler.transform(f))
            .collect::<Result<_>>()?;

        let dataset = TrainingDataset::new(scaled, targets)?;
        let (train, val) =
            dataset.shuffled_split(1.0 - self.config.validation_split, self.config.seed)?;

        let (primary_coef, primary_intercept) =
            self.fit_linear(&train.features, &train.targets)?;
        let primary_meta = self.linear_metadata("primary", &schema, train.len());
        let primary = LinearRegressionModel::new(primary_coef, primary_intercept, primary_meta);

        // Correction learner fitted on the primary's residuals.
        let residuals: Vec<f64> = train
            .features
            .iter()
            .zip(train.targets.iter())
            .map(|(f, t)| primary.predict(f).map(|p| t - p))
            .collect::<Result<_>>()?;
        let (corr_coef, corr_intercept) = self.fit_linear(&train.features, &residuals)?;
        let correction = LinearRegressionModel::new(
            corr_coef,
            corr_intercept,
            self.linear_metadata("correction", &schema, train.len()),
        );

        let stacked_without_metrics = StackedModel {
            metadata: self.linear_metadata("stacked", &schema, rows.len()),
            primary,
            correction,
        };

        // Validate on the held-out split; fall back to the training split
        // when the dataset is too small to hold anything out.
        let (eval_features, eval_targets) = if val.is_empty() {
            (&train.features, &train.targets)
        } else {
            (&val.features, &val.targets)
        };
        let predictions: Vec<f64> = eval_features
            .iter()
            .map(|f| stacked_without_metrics.predict(f))
            .collect::<Result<_>>()?;
        let metrics = self.calculate_metrics(&predictions, eval_targets)?;
        info!(
            mae = metrics.mae,
            rmse = metrics.rmse,
            r2 = metrics.r2,
            samples = rows.len(),
            "model trained"
        );

        let mut stacked = stacked_without_metrics;
        stacked.metadata = ModelMetadata {
            model_id: format!("stacked_linear_{}", uuid::Uuid::new_v4()),
            model_type: ModelType::Stacked,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            training_samples: rows.len(),
            validation_metrics: metrics,
            feature_names: schema.columns.clone(),
        };

        Ok(ModelArtifact {
            schema,
            scaler,
            model: ModelKind::Stacked(stacked),
        })
    }

    /// Gradient-descent fit of coefficients and intercept.
    fn fit_linear(
        &self,
        features: &[FeatureVector],
        targets: &[f64],
    ) -> Result<(Vec<f64>, f64)> {
        let first = features
            .first()
            .ok_or_else(|| anyhow::anyhow!("cannot fit on an empty dataset"))?;
        let n_features = first.len();
        let n = features.len() as f64;

        let mut coefficients = vec![0.0; n_features];
        let mut intercept = 0.0;

        for _iter in 0..self.config.max_iterations {
            let mut coef_gradients = vec![0.0; n_features];
            let mut intercept_gradient = 0.0;

            for (row, target) in features.iter().zip(targets.iter()) {
                let prediction: f64 = row
                    .features
                    .iter()
                    .zip(coefficients.iter())
                    .map(|(f, c)| f * c)
                    .sum::<f64>()
                    + intercept;
                let error = prediction - target;

                for (grad, value) in coef_gradients.iter_mut().zip(row.features.iter()) {
                    *grad += error * value / n;
                }
                intercept_gradient += error / n;
            }

            for (coef, grad) in coefficients.iter_mut().zip(coef_gradients.iter()) {
                *coef -= self.config.learning_rate * grad;
            }
            intercept -= self.config.learning_rate * intercept_gradient;
        }

        Ok((coefficients, intercept))
    }

    pub fn calculate_metrics(
        &self,
        predictions: &[f64],
        targets: &[f64],
    ) -> Result<ValidationMetrics> {
        if predictions.len() != targets.len() {
            anyhow::bail!("prediction and target count mismatch");
        }
        if predictions.is_empty() {
            anyhow::bail!("no predictions to evaluate");
        }

        let n = predictions.len() as f64;

        let mae: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / n;

        let mse: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / n;
        let rmse = mse.sqrt();

        // Zero targets are excluded from MAPE entirely: they contribute to
        // neither the numerator nor the denominator.
        let mape_terms: Vec<f64> = predictions
            .iter()
            .zip(targets.iter())
            .filter(|(_, t)| t.abs() > 1e-10)
            .map(|(p, t)| ((p - t) / t).abs() * 100.0)
            .collect();
        let mape = if mape_terms.is_empty() {
            0.0
        } else {
            mape_terms.iter().sum::<f64>() / mape_terms.len() as f64
        };

        let mean_target: f64 = targets.iter().sum::<f64>() / n;
        let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
        let ss_res: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| (t - p).powi(2))
            .sum();

        let r2 = if ss_tot.abs() < 1e-10 {
            0.0
        } else {
            1.0 - (ss_res / ss_tot)
        };

        Ok(ValidationMetrics::new(mae, rmse, mape, r2))
    }

    fn linear_metadata(
        &self,
        label: &str,
        schema: &FeatureSchema,
        samples: usize,
    ) -> ModelMetadata {
        ModelMetadata {
            model_id: format!("linear_{label}_{}", uuid::Uuid::new_v4()),
            model_type: ModelType::LinearRegression,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            training_samples: samples,
            validation_metrics: ValidationMetrics::new(0.0, 0.0, 0.0, 0.0),
            feature_names: schema.columns.clone(),
        }
    }
}
