//! Feature encoding against a fixed training-time schema.
//!
//! Live data will not in general produce the same indicator columns the
//! model was trained with: consumers register new appliance names, or own
//! no appliances at all. The encoder reconciles every live row against the
//! persisted [`FeatureSchema`] — missing training columns are zero-filled,
//! unseen live columns are dropped with a warning, and the result is
//! verified against the schema before it may reach the predictor.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::joiner::JoinedRow;
use super::PipelineError;
use crate::ml::FeatureVector;

/// Current schema layout version. Bumped when the column derivation rules
/// change, so stale artifacts are rejected on load.
pub const SCHEMA_VERSION: u32 = 1;

/// Numeric base columns, in fixed order. Indicator columns follow these.
pub const NUMERIC_COLUMNS: [&str; 9] = [
    "family_members",
    "working_members",
    "units_consumed",
    "cost_per_unit",
    "power_rating_w",
    "consumption_kwh_per_hour",
    "base_tariff",
    "tariff_per_unit",
    "total_usage_hours",
];

/// The exact ordered column set a model was trained with. Persisted inside
/// the model artifact; encoding is a pure function of (row, schema).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub columns: Vec<String>,
}

impl FeatureSchema {
    /// Schema-defining pass over training rows: numeric columns first, then
    /// every indicator column observed in the data, sorted for a stable
    /// order.
    pub fn fit(rows: &[JoinedRow]) -> Self {
        let indicators = rows
            .iter()
            .flat_map(|row| live_columns(row).into_keys())
            .filter(|col| !NUMERIC_COLUMNS.contains(&col.as_str()))
            .sorted()
            .dedup();

        let mut columns: Vec<String> = NUMERIC_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(indicators);

        Self {
            version: SCHEMA_VERSION,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Expand one joined row into its live column → value map. Categorical
/// fields become indicator columns; numerics keep their fixed names.
pub(crate) fn live_columns(row: &JoinedRow) -> BTreeMap<String, f64> {
    let mut columns = BTreeMap::new();
    columns.insert("family_members".to_string(), row.family_members);
    columns.insert("working_members".to_string(), row.working_members);
    columns.insert("units_consumed".to_string(), row.units_consumed);
    columns.insert("cost_per_unit".to_string(), row.cost_per_unit);
    columns.insert("power_rating_w".to_string(), row.power_rating_w);
    columns.insert(
        "consumption_kwh_per_hour".to_string(),
        row.consumption_kwh_per_hour,
    );
    columns.insert("base_tariff".to_string(), row.base_tariff);
    columns.insert("tariff_per_unit".to_string(), row.tariff_per_unit);
    columns.insert("total_usage_hours".to_string(), row.total_usage_hours);

    for appliance in &row.appliances {
        columns.insert(format!("appliance_name={appliance}"), 1.0);
    }
    if let Some(location) = &row.location {
        columns.insert(format!("location={location}"), 1.0);
    }

    columns
}

/// Encodes joined rows against one fixed schema.
pub struct FeatureEncoder {
    schema: FeatureSchema,
}

impl FeatureEncoder {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Reconcile one row against the schema and return the encoded vector.
    ///
    /// Training-time columns absent from the row are zero-filled; live
    /// columns the model has never seen are dropped and logged. The result
    /// is verified before it is handed back.
    pub fn encode(&self, row: &JoinedRow) -> Result<FeatureVector, PipelineError> {
        let mut live = live_columns(row);

        let values: Vec<f64> = self
            .schema
            .columns
            .iter()
            .map(|col| live.remove(col).unwrap_or(0.0))
            .collect();

        if !live.is_empty() {
            let dropped = live.keys().join(", ");
            warn!(
                consumer_id = row.consumer_id,
                period = %row.period,
                %dropped,
                "dropping live columns unknown to the trained schema"
            );
        }

        let vector = FeatureVector::new(values, self.schema.columns.clone())
            .map_err(|e| PipelineError::SchemaMismatch(e.to_string()))?;
        self.verify(&vector)?;
        Ok(vector)
    }

    /// Checked precondition before prediction: the vector must carry exactly
    /// the trained columns, in training order. A mismatch here would
    /// silently corrupt every downstream prediction, so it fails fast.
    pub fn verify(&self, vector: &FeatureVector) -> Result<(), PipelineError> {
        if vector.feature_names != self.schema.columns {
            return Err(PipelineError::SchemaMismatch(format!(
                "expected {} columns matching the trained schema, got {}",
                self.schema.len(),
                vector.len()
            )));
        }
        Ok(())
    }
}
