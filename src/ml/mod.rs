//! Machine learning support for consumption prediction.
//!
//! - Offline training pipeline (gradient-descent linear learner plus a
//!   stacked correction learner)
//! - Model artifact persistence: model and feature schema versioned together
//! - Optional smartcore random forest behind the `ml` feature

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod models;
pub mod training;

#[cfg(feature = "ml")]
pub mod smartcore;

/// Model family of a trained artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelType {
    LinearRegression,
    Stacked,
    RandomForest,
}

/// Metadata recorded at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub version: String,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub training_samples: usize,
    pub validation_metrics: ValidationMetrics,
    pub feature_names: Vec<String>,
}

/// Validation metrics computed on the held-out split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub r2: f64,
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, mape: f64, r2: f64) -> Self {
        Self { mae, rmse, mape, r2 }
    }

    pub fn meets_quality_threshold(&self, max_mape: f64, min_r2: f64) -> bool {
        self.mape <= max_mape && self.r2 >= min_r2
    }
}

/// One encoded feature row. Ephemeral: lives only for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl FeatureVector {
    pub fn new(features: Vec<f64>, feature_names: Vec<String>) -> Result<Self> {
        if features.len() != feature_names.len() {
            anyhow::bail!(
                "feature count mismatch: {} features, {} names",
                features.len(),
                feature_names.len()
            );
        }
        Ok(Self {
            features,
            feature_names,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Standardize features using z-score normalization.
    pub fn standardize(&self, means: &[f64], stds: &[f64]) -> Result<Self> {
        if means.len() != self.features.len() || stds.len() != self.features.len() {
            anyhow::bail!("standardization parameter count mismatch");
        }

        let standardized = self
            .features
            .iter()
            .zip(means.iter().zip(stds.iter()))
            .map(|(f, (mean, std))| {
                if std.abs() < 1e-10 {
                    0.0
                } else {
                    (f - mean) / std
                }
            })
            .collect();

        Ok(Self {
            features: standardized,
            feature_names: self.feature_names.clone(),
        })
    }
}

/// Column-wise z-score scaler fitted at training time and persisted inside
/// the model artifact so inference applies the exact same transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[FeatureVector]) -> Result<Self> {
        let first = rows
            .first()
            .ok_or_else(|| anyhow::anyhow!("cannot fit scaler on empty data"))?;
        let width = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            if row.len() != width {
                anyhow::bail!("ragged feature rows: expected width {width}, got {}", row.len());
            }
            for (acc, value) in means.iter_mut().zip(row.features.iter()) {
                *acc += value / n;
            }
        }

        let mut stds = vec![0.0; width];
        for row in rows {
            for (i, value) in row.features.iter().enumerate() {
                stds[i] += (value - means[i]).powi(2) / n;
            }
        }
        for std in stds.iter_mut() {
            *std = std.sqrt();
        }

        Ok(Self { means, stds })
    }

    pub fn transform(&self, row: &FeatureVector) -> Result<FeatureVector> {
        row.standardize(&self.means, &self.stds)
    }
}
