//! Derived-metric transforms applied to the raw predicted consumption.
//!
//! Every derived value is clipped at zero; negative billing or carbon
//! figures are a correctness bug, not a valid output.

use super::joiner::JoinedRow;

/// Derived figures for one (consumer, period) prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub effective_hours: f64,
    pub reduction_factor: f64,
    pub reduced_consumption: f64,
    pub carbon_footprint: f64,
    pub reduced_carbon_footprint: f64,
    pub bill_amount: f64,
    pub reduced_bill_amount: f64,
}

pub struct PostProcessor {
    emission_factor: f64,
}

impl PostProcessor {
    pub fn new(emission_factor: f64) -> Self {
        Self { emission_factor }
    }

    /// Compute the load-shifting projection and billing/carbon figures.
    ///
    /// Guards: the working-member share is zero when the household size is
    /// zero, and the reduction factor is exactly 1 when total usage hours
    /// is zero — absence of usage data must neither degrade nor amplify
    /// the prediction.
    pub fn derive(&self, predicted: f64, row: &JoinedRow) -> DerivedMetrics {
        let usage = row.total_usage_hours;

        let working_share = if row.family_members > 0.0 {
            ((row.working_members * 8.0 / 24.0) / (row.family_members * 24.0)).max(0.0)
        } else {
            0.0
        };
        let effective_hours = (usage * (1.0 - working_share)).max(0.0);

        let reduction_factor = if usage != 0.0 {
            (effective_hours / usage).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let reduced_consumption = (predicted * reduction_factor).max(0.0);
        let carbon_footprint = (predicted * self.emission_factor).max(0.0);
        let reduced_carbon_footprint = (reduced_consumption * self.emission_factor).max(0.0);
        let bill_amount = (predicted * row.cost_per_unit).max(0.0);
        let reduced_bill_amount = (reduced_consumption * row.cost_per_unit).max(0.0);

        DerivedMetrics {
            effective_hours,
            reduction_factor,
            reduced_consumption,
            carbon_footprint,
            reduced_carbon_footprint,
            bill_amount,
            reduced_bill_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNKNOWN_PERIOD;
    use proptest::prelude::*;
    use rstest::rstest;

    fn row(usage: f64, working: f64, family: f64, cost: f64) -> JoinedRow {
        JoinedRow {
            consumer_id: 1,
            period: UNKNOWN_PERIOD.to_string(),
            family_members: family,
            working_members: working,
            units_consumed: 0.0,
            cost_per_unit: cost,
            power_rating_w: 0.0,
            consumption_kwh_per_hour: 0.0,
            base_tariff: 0.0,
            tariff_per_unit: 0.0,
            total_usage_hours: usage,
            appliances: Vec::new(),
            location: None,
        }
    }

    #[test]
    fn zero_usage_hours_yields_unit_reduction_factor() {
        let post = PostProcessor::new(0.82);
        let metrics = post.derive(10.0, &row(0.0, 2.0, 4.0, 8.0));

        assert_eq!(metrics.effective_hours, 0.0);
        assert_eq!(metrics.reduction_factor, 1.0);
        assert_eq!(metrics.reduced_consumption, 10.0);
        assert_eq!(metrics.bill_amount, 80.0);
        assert_eq!(metrics.reduced_bill_amount, 80.0);
        assert!((metrics.carbon_footprint - 8.2).abs() < 1e-12);
        assert!((metrics.reduced_carbon_footprint - 8.2).abs() < 1e-12);
    }

    #[test]
    fn carbon_footprint_is_exactly_prediction_times_factor() {
        let post = PostProcessor::new(0.82);
        let metrics = post.derive(123.45, &row(12.0, 1.0, 3.0, 7.0));
        assert_eq!(metrics.carbon_footprint, 123.45 * 0.82);
    }

    #[rstest]
    #[case(30.0, 2.0, 4.0)]
    #[case(1.0, 0.0, 1.0)]
    #[case(24.0, 6.0, 6.0)]
    fn reduced_never_exceeds_predicted(#[case] usage: f64, #[case] w: f64, #[case] f: f64) {
        let post = PostProcessor::new(0.82);
        let metrics = post.derive(50.0, &row(usage, w, f, 8.0));
        assert!(metrics.reduction_factor <= 1.0);
        assert!(metrics.reduced_consumption <= 50.0);
        assert!(metrics.reduced_consumption >= 0.0);
    }

    #[test]
    fn zero_family_members_does_not_divide_by_zero() {
        let post = PostProcessor::new(0.82);
        let metrics = post.derive(10.0, &row(20.0, 2.0, 0.0, 8.0));
        assert!(metrics.reduction_factor.is_finite());
        assert_eq!(metrics.reduction_factor, 1.0);
    }

    #[test]
    fn custom_emission_factor_is_honored() {
        let post = PostProcessor::new(0.5);
        let metrics = post.derive(10.0, &row(0.0, 0.0, 1.0, 0.0));
        assert_eq!(metrics.carbon_footprint, 5.0);
    }

    proptest! {
        #[test]
        fn reduction_factor_always_in_unit_interval(
            usage in 0.0..1000.0f64,
            working in 0.0..12.0f64,
            family in 0.0..12.0f64,
            predicted in 0.0..5000.0f64,
        ) {
            let post = PostProcessor::new(0.82);
            let metrics = post.derive(predicted, &row(usage, working, family, 8.0));
            prop_assert!(metrics.reduction_factor >= 0.0);
            prop_assert!(metrics.reduction_factor <= 1.0);
            prop_assert!(metrics.reduction_factor.is_finite());
            prop_assert!(metrics.reduced_consumption <= predicted + 1e-9);
            prop_assert!(metrics.reduced_consumption >= 0.0);
            prop_assert!(metrics.bill_amount >= 0.0);
            prop_assert!(metrics.carbon_footprint >= 0.0);
        }
    }
}
