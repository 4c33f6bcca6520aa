//! Domain records for consumers, appliances, bills and prediction results.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Stable numeric identifier for a household account.
pub type ConsumerId = i64;

/// Period label used when a consumer has no billing record yet. The
/// pipeline still emits a prediction row in that case, it just cannot be
/// attributed to a real billing cycle.
pub const UNKNOWN_PERIOD: &str = "unknown";

/// A household account. Created on registration, mutated rarely.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ConsumerProfile {
    pub consumer_id: ConsumerId,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(min = 1))]
    pub family_members: i32,
    #[validate(range(min = 0))]
    pub working_members: i32,
    /// Member ages. Kept on the profile but deliberately excluded from the
    /// feature schema.
    pub ages: Vec<i32>,
    pub location: Option<String>,
}

/// One appliance owned by a consumer. (consumer, appliance name) is unique.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ApplianceRecord {
    pub consumer_id: ConsumerId,
    #[validate(length(min = 1))]
    pub appliance_name: String,
    #[validate(range(min = 0.0, max = 24.0))]
    pub usage_hours: f64,
}

/// One bill per consumer per period.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct BillingRecord {
    pub consumer_id: ConsumerId,
    #[validate(length(min = 1))]
    pub period: String,
    #[validate(range(min = 0.0))]
    pub units_consumed: f64,
    #[validate(range(min = 0.0))]
    pub cost_per_unit: f64,
}

/// Pipeline output, keyed by (consumer, period). Upserted as a whole row,
/// never partially written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PredictionResult {
    pub consumer_id: ConsumerId,
    pub period: String,
    pub predicted_consumption: f64,
    pub reduced_consumption: f64,
    pub bill_amount: f64,
    pub reduced_bill_amount: f64,
    pub carbon_footprint: f64,
    pub reduced_carbon_footprint: f64,
}
