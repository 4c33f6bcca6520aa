//! Assembles per-consumer feature rows from profile, billing, appliance and
//! reference data.
//!
//! All joins are left joins: a consumer with no billing or appliance data
//! still yields a row, with the unmatched numerics zero-filled downstream.

use tracing::warn;

use crate::catalog::{normalize_key, ReferenceCatalog};
use crate::domain::{ApplianceRecord, BillingRecord, ConsumerId, ConsumerProfile, UNKNOWN_PERIOD};

/// One joined row per (consumer, period). Numeric fields that failed to
/// match reference data are already zero here; the encoder treats zero as
/// "no measured effect".
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub consumer_id: ConsumerId,
    pub period: String,
    pub family_members: f64,
    pub working_members: f64,
    pub units_consumed: f64,
    pub cost_per_unit: f64,
    /// Sum of rated power across the consumer's catalog-matched appliances.
    pub power_rating_w: f64,
    /// Sum of per-hour consumption across catalog-matched appliances.
    pub consumption_kwh_per_hour: f64,
    pub base_tariff: f64,
    pub tariff_per_unit: f64,
    /// Sum of usage hours over all of the consumer's appliances; zero when
    /// the consumer has none.
    pub total_usage_hours: f64,
    /// Normalized appliance names, for indicator-column expansion.
    pub appliances: Vec<String>,
    /// Normalized location, if the profile has one.
    pub location: Option<String>,
}

pub struct DataJoiner<'a> {
    catalog: &'a ReferenceCatalog,
}

impl<'a> DataJoiner<'a> {
    pub fn new(catalog: &'a ReferenceCatalog) -> Self {
        Self { catalog }
    }

    /// Join one consumer's records into one row per billing period.
    ///
    /// A consumer with no bills still produces a single row labelled with
    /// [`UNKNOWN_PERIOD`] and zeroed cost fields.
    pub fn join_consumer(
        &self,
        profile: &ConsumerProfile,
        bills: &[BillingRecord],
        appliances: &[ApplianceRecord],
    ) -> Vec<JoinedRow> {
        let total_usage_hours: f64 = appliances.iter().map(|a| a.usage_hours).sum();

        let mut power_rating_w = 0.0;
        let mut consumption_kwh_per_hour = 0.0;
        let mut appliance_names = Vec::with_capacity(appliances.len());
        for appliance in appliances {
            let key = normalize_key(&appliance.appliance_name);
            match self.catalog.appliance(&key) {
                Some(spec) => {
                    power_rating_w += spec.power_rating_w;
                    consumption_kwh_per_hour += spec.consumption_kwh_per_hour;
                }
                None => {
                    // Data-quality gap, not an error: the spec columns stay
                    // zero for this appliance.
                    warn!(
                        consumer_id = profile.consumer_id,
                        appliance = %key,
                        "appliance has no reference spec"
                    );
                }
            }
            appliance_names.push(key);
        }
        appliance_names.sort();
        appliance_names.dedup();

        let location = profile.location.as_deref().map(normalize_key);
        let (base_tariff, tariff_per_unit) = match location.as_deref() {
            Some(loc) => match self.catalog.tariff(loc) {
                Some(tariff) => (tariff.base_tariff, tariff.per_unit_cost),
                None => {
                    warn!(
                        consumer_id = profile.consumer_id,
                        location = %loc,
                        "location has no reference tariff"
                    );
                    (0.0, 0.0)
                }
            },
            None => (0.0, 0.0),
        };

        let base_row = JoinedRow {
            consumer_id: profile.consumer_id,
            period: UNKNOWN_PERIOD.to_string(),
            family_members: f64::from(profile.family_members),
            working_members: f64::from(profile.working_members),
            units_consumed: 0.0,
            cost_per_unit: 0.0,
            power_rating_w,
            consumption_kwh_per_hour,
            base_tariff,
            tariff_per_unit,
            total_usage_hours,
            appliances: appliance_names,
            location,
        };

        if bills.is_empty() {
            return vec![base_row];
        }

        bills
            .iter()
            .map(|bill| {
                let mut row = base_row.clone();
                row.period = bill.period.clone();
                row.units_consumed = bill.units_consumed;
                row.cost_per_unit = bill.cost_per_unit;
                row
            })
            .collect()
    }
}
