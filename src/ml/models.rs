//! Regression model definitions and the persisted model artifact.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{FeatureVector, ModelMetadata, ModelType, StandardScaler};
use crate::pipeline::encoder::{FeatureSchema, SCHEMA_VERSION};

/// Contract a learned predictor must satisfy: one deterministic value per
/// input row, for a fixed model.
pub trait RegressionModel: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<f64>;

    fn metadata(&self) -> &ModelMetadata;

    fn model_type(&self) -> ModelType {
        self.metadata().model_type
    }
}

/// Linear regression over standardized features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegressionModel {
    pub metadata: ModelMetadata,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressionModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64, metadata: ModelMetadata) -> Self {
        Self {
            metadata,
            coefficients,
            intercept,
        }
    }
}

impl RegressionModel for LinearRegressionModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            anyhow::bail!(
                "feature count mismatch: expected {}, got {}",
                self.coefficients.len(),
                features.len()
            );
        }

        let prediction: f64 = features
            .features
            .iter()
            .zip(self.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum::<f64>()
            + self.intercept;

        Ok(prediction)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

/// Stacked ensemble: a primary learner plus a correction learner fitted on
/// the primary's residuals. An internal detail of the predictor, invisible
/// to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackedModel {
    pub metadata: ModelMetadata,
    pub primary: LinearRegressionModel,
    pub correction: LinearRegressionModel,
}

impl RegressionModel for StackedModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let base = self.primary.predict(features)?;
        let correction = self.correction.predict(features)?;
        Ok(base + correction)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

/// Serializable closed set of model families.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelKind {
    Linear(LinearRegressionModel),
    Stacked(StackedModel),
    #[cfg(feature = "ml")]
    Forest(super::smartcore::ForestModel),
}

impl ModelKind {
    fn as_model(&self) -> &dyn RegressionModel {
        match self {
            ModelKind::Linear(m) => m,
            ModelKind::Stacked(m) => m,
            #[cfg(feature = "ml")]
            ModelKind::Forest(m) => m,
        }
    }
}

impl RegressionModel for ModelKind {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        self.as_model().predict(features)
    }

    fn metadata(&self) -> &ModelMetadata {
        self.as_model().metadata()
    }
}

/// The persisted training output: model, scaler and the ordered feature
/// schema, versioned together. A model is never loaded with a mismatched
/// schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema: FeatureSchema,
    pub scaler: StandardScaler,
    pub model: ModelKind,
}

impl ModelArtifact {
    pub fn metadata(&self) -> &ModelMetadata {
        self.model.metadata()
    }

    /// Run the model on an already schema-verified feature vector.
    pub fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let scaled = self.scaler.transform(features)?;
        self.model.predict(&scaled)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = bincode::serialize(self).context("serializing model artifact")?;
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let artifact: Self =
            bincode::deserialize(&bytes).context("deserializing model artifact")?;
        artifact.check_consistency()?;
        Ok(artifact)
    }

    /// Reject artifacts whose model, scaler and schema disagree.
    fn check_consistency(&self) -> Result<()> {
        if self.schema.version != SCHEMA_VERSION {
            anyhow::bail!(
                "schema version {} does not match supported version {SCHEMA_VERSION}",
                self.schema.version
            );
        }
        let metadata = self.metadata();
        if metadata.feature_names != self.schema.columns {
            anyhow::bail!(
                "model was trained on {} columns but the artifact schema has {}",
                metadata.feature_names.len(),
                self.schema.len()
            );
        }
        if self.scaler.means.len() != self.schema.len() {
            anyhow::bail!(
                "scaler width {} does not match schema width {}",
                self.scaler.means.len(),
                self.schema.len()
            );
        }
        Ok(())
    }
}
