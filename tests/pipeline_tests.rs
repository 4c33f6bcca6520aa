//! End-to-end pipeline tests over the in-memory store.

use std::sync::Arc;

use wattwise::catalog::{ApplianceSpecRow, ReferenceCatalog, TariffRow};
use wattwise::domain::{
    ApplianceRecord, BillingRecord, ConsumerProfile, PredictionResult, UNKNOWN_PERIOD,
};
use wattwise::ml::models::{LinearRegressionModel, ModelArtifact, ModelKind};
use wattwise::ml::training::{ModelTrainer, TrainingConfig};
use wattwise::ml::{ModelMetadata, ModelType, StandardScaler, ValidationMetrics};
use wattwise::pipeline::encoder::{FeatureSchema, NUMERIC_COLUMNS, SCHEMA_VERSION};
use wattwise::pipeline::joiner::DataJoiner;
use wattwise::pipeline::{OutcomeStatus, PredictionPipeline, Target};
use wattwise::store::{MemoryStore, RecordStore, ResultStore};

const EMISSION_FACTOR: f64 = 0.82;

fn catalog() -> Arc<ReferenceCatalog> {
    Arc::new(ReferenceCatalog::new(
        vec![
            ApplianceSpecRow {
                appliance_name: "fridge".to_string(),
                power_rating_w: 150.0,
                consumption_kwh_per_hour: 0.15,
            },
            ApplianceSpecRow {
                appliance_name: "air conditioner".to_string(),
                power_rating_w: 1500.0,
                consumption_kwh_per_hour: 1.5,
            },
        ],
        vec![TariffRow {
            location: "chennai".to_string(),
            base_tariff: 4.5,
            per_unit_cost: 6.2,
        }],
    ))
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for id in 1..=10 {
        store
            .insert_consumer(ConsumerProfile {
                consumer_id: id,
                name: format!("consumer-{id}"),
                family_members: 3 + (id % 3) as i32,
                working_members: 1 + (id % 2) as i32,
                ages: vec![35, 33, 6],
                location: Some("Chennai".to_string()),
            })
            .unwrap();
        store
            .insert_appliance(ApplianceRecord {
                consumer_id: id,
                appliance_name: "fridge".to_string(),
                usage_hours: 24.0,
            })
            .unwrap();
        if id % 2 == 0 {
            store
                .insert_appliance(ApplianceRecord {
                    consumer_id: id,
                    appliance_name: "Air Conditioner".to_string(),
                    usage_hours: 6.0,
                })
                .unwrap();
        }
        store
            .insert_bill(BillingRecord {
                consumer_id: id,
                period: "2026-07".to_string(),
                units_consumed: 120.0 + 15.0 * id as f64,
                cost_per_unit: 8.0,
            })
            .unwrap();
    }
    Arc::new(store)
}

async fn trained_artifact(
    catalog: &ReferenceCatalog,
    store: &MemoryStore,
) -> ModelArtifact {
    let joiner = DataJoiner::new(catalog);
    let mut rows = Vec::new();
    for profile in store.consumers().await.unwrap() {
        let bills = store.bills(profile.consumer_id).await.unwrap();
        let appliances = store.appliances(profile.consumer_id).await.unwrap();
        rows.extend(
            joiner
                .join_consumer(&profile, &bills, &appliances)
                .into_iter()
                .filter(|r| r.period != UNKNOWN_PERIOD),
        );
    }
    ModelTrainer::new(TrainingConfig::default())
        .train(&rows)
        .unwrap()
}

#[tokio::test]
async fn run_prediction_is_idempotent() {
    let catalog = catalog();
    let store = seeded_store();
    let artifact = Arc::new(trained_artifact(&catalog, &store).await);

    let pipeline = PredictionPipeline::new(catalog, artifact, EMISSION_FACTOR);
    pipeline
        .run(&Target::All, store.as_ref(), store.as_ref())
        .await
        .unwrap();
    let first: Vec<_> = {
        let mut rows = Vec::new();
        for id in 1..=10 {
            rows.push(store.get(id, "2026-07").await.unwrap().unwrap());
        }
        rows
    };

    pipeline
        .run(&Target::All, store.as_ref(), store.as_ref())
        .await
        .unwrap();

    for (id, before) in (1..=10).zip(first.iter()) {
        let after = store.get(id, "2026-07").await.unwrap().unwrap();
        assert_eq!(
            before.predicted_consumption.to_bits(),
            after.predicted_consumption.to_bits()
        );
        assert_eq!(
            before.reduced_consumption.to_bits(),
            after.reduced_consumption.to_bits()
        );
        assert_eq!(before, &after);
    }
    assert_eq!(store.result_count(), 10);
}

#[tokio::test]
async fn rerun_overwrites_instead_of_duplicating() {
    let catalog = catalog();
    let store = seeded_store();
    let artifact = Arc::new(trained_artifact(&catalog, &store).await);

    let pipeline = PredictionPipeline::new(Arc::clone(&catalog), artifact, EMISSION_FACTOR);
    pipeline
        .run(&Target::All, store.as_ref(), store.as_ref())
        .await
        .unwrap();
    let before = store.get(3, "2026-07").await.unwrap().unwrap();

    // New upstream data, retrained model: the same key must be replaced,
    // not duplicated.
    store
        .insert_bill(BillingRecord {
            consumer_id: 3,
            period: "2026-07".to_string(),
            units_consumed: 500.0,
            cost_per_unit: 9.0,
        })
        .unwrap();
    let retrained = Arc::new(trained_artifact(&catalog, &store).await);
    let pipeline = PredictionPipeline::new(catalog, retrained, EMISSION_FACTOR);
    pipeline
        .run(&Target::Consumers(vec![3]), store.as_ref(), store.as_ref())
        .await
        .unwrap();

    assert_eq!(store.result_count(), 10);
    let after = store.get(3, "2026-07").await.unwrap().unwrap();
    assert_ne!(before.predicted_consumption, after.predicted_consumption);
}

#[tokio::test]
async fn consumer_without_bills_gets_zero_cost_result() {
    let catalog = catalog();
    let store = seeded_store();
    store
        .insert_consumer(ConsumerProfile {
            consumer_id: 99,
            name: "newcomer".to_string(),
            family_members: 2,
            working_members: 1,
            ages: vec![29, 27],
            location: Some("chennai".to_string()),
        })
        .unwrap();
    store
        .insert_appliance(ApplianceRecord {
            consumer_id: 99,
            appliance_name: "fridge".to_string(),
            usage_hours: 24.0,
        })
        .unwrap();

    let artifact = Arc::new(trained_artifact(&catalog, &store).await);
    let pipeline = PredictionPipeline::new(catalog, artifact, EMISSION_FACTOR);
    let outcome = pipeline
        .run(&Target::Consumers(vec![99]), store.as_ref(), store.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome.succeeded(), 1);
    let result = store.get(99, UNKNOWN_PERIOD).await.unwrap().unwrap();
    assert_eq!(result.bill_amount, 0.0);
    assert_eq!(result.reduced_bill_amount, 0.0);
    assert!(result.predicted_consumption >= 0.0);
}

#[tokio::test]
async fn unseen_appliance_is_dropped_not_fatal() {
    let catalog = catalog();
    let store = seeded_store();
    let artifact = Arc::new(trained_artifact(&catalog, &store).await);

    // Registered after training: the model has never seen this appliance.
    store
        .insert_appliance(ApplianceRecord {
            consumer_id: 5,
            appliance_name: "plasma globe".to_string(),
            usage_hours: 2.0,
        })
        .unwrap();

    let pipeline = PredictionPipeline::new(catalog, artifact, EMISSION_FACTOR);
    let outcome = pipeline
        .run(&Target::Consumers(vec![5]), store.as_ref(), store.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome.succeeded(), 1);
    assert!(outcome
        .outcomes
        .iter()
        .all(|o| o.status == OutcomeStatus::Success));
}

#[tokio::test]
async fn derived_fields_are_consistent() {
    let catalog = catalog();
    let store = seeded_store();
    let artifact = Arc::new(trained_artifact(&catalog, &store).await);

    let pipeline = PredictionPipeline::new(catalog, artifact, EMISSION_FACTOR);
    pipeline
        .run(&Target::All, store.as_ref(), store.as_ref())
        .await
        .unwrap();

    for id in 1..=10 {
        let result = store.get(id, "2026-07").await.unwrap().unwrap();
        assert!(result.predicted_consumption >= 0.0);
        assert!(result.reduced_consumption >= 0.0);
        assert!(result.reduced_consumption <= result.predicted_consumption + 1e-9);
        assert_eq!(
            result.carbon_footprint,
            result.predicted_consumption * EMISSION_FACTOR
        );
        assert_eq!(
            result.reduced_carbon_footprint,
            result.reduced_consumption * EMISSION_FACTOR
        );
        assert_eq!(result.bill_amount, result.predicted_consumption * 8.0);
    }
}

/// Linear artifact whose units coefficient overflows any non-zero measured
/// consumption to infinity, which the pipeline must reject per row.
fn overflowing_artifact() -> ModelArtifact {
    let columns: Vec<String> = NUMERIC_COLUMNS.iter().map(|c| c.to_string()).collect();
    let units_idx = columns
        .iter()
        .position(|c| c == "units_consumed")
        .unwrap();
    let mut coefficients = vec![0.0; columns.len()];
    coefficients[units_idx] = f64::MAX;

    let metadata = ModelMetadata {
        model_id: "overflowing-linear".to_string(),
        model_type: ModelType::LinearRegression,
        version: "0.0.0".to_string(),
        trained_at: chrono::Utc::now(),
        training_samples: 4,
        validation_metrics: ValidationMetrics::new(0.0, 0.0, 0.0, 0.0),
        feature_names: columns.clone(),
    };
    ModelArtifact {
        schema: FeatureSchema {
            version: SCHEMA_VERSION,
            columns: columns.clone(),
        },
        scaler: StandardScaler {
            means: vec![0.0; columns.len()],
            stds: vec![1.0; columns.len()],
        },
        model: ModelKind::Linear(LinearRegressionModel::new(coefficients, 0.0, metadata)),
    }
}

#[tokio::test]
async fn failed_row_is_collected_and_the_batch_continues() {
    let catalog = catalog();
    let store = MemoryStore::new();
    for (id, units) in [(1, 0.0), (2, 2.0)] {
        store
            .insert_consumer(ConsumerProfile {
                consumer_id: id,
                name: format!("consumer-{id}"),
                family_members: 3,
                working_members: 1,
                ages: vec![40],
                location: None,
            })
            .unwrap();
        store
            .insert_bill(BillingRecord {
                consumer_id: id,
                period: "2026-07".to_string(),
                units_consumed: units,
                cost_per_unit: 8.0,
            })
            .unwrap();
    }
    let prior = PredictionResult {
        consumer_id: 2,
        period: "2026-07".to_string(),
        predicted_consumption: 42.0,
        reduced_consumption: 42.0,
        bill_amount: 336.0,
        reduced_bill_amount: 336.0,
        carbon_footprint: 34.44,
        reduced_carbon_footprint: 34.44,
    };
    store.upsert(&prior).await.unwrap();

    let artifact = Arc::new(overflowing_artifact());
    let pipeline = PredictionPipeline::new(catalog, artifact, EMISSION_FACTOR);
    let outcome = pipeline.run(&Target::All, &store, &store).await.unwrap();

    // Consumer 2's row overflowed; consumer 1 still went through.
    assert_eq!(outcome.succeeded(), 1);
    let failures: Vec<_> = outcome.failed().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].consumer_id, 2);
    assert!(matches!(
        failures[0].status,
        OutcomeStatus::PredictionFailure(_)
    ));

    // The failing row's previously stored result is untouched.
    assert_eq!(store.get(2, "2026-07").await.unwrap().unwrap(), prior);
    assert!(store.get(1, "2026-07").await.unwrap().is_some());
}

#[tokio::test]
async fn missing_result_is_none_not_error() {
    let store = MemoryStore::new();
    assert!(store.get(404, "2026-07").await.unwrap().is_none());
}

#[tokio::test]
async fn outcomes_cover_every_targeted_row() {
    let catalog = catalog();
    let store = seeded_store();
    let artifact = Arc::new(trained_artifact(&catalog, &store).await);

    let pipeline = PredictionPipeline::new(catalog, artifact, EMISSION_FACTOR);
    let outcome = pipeline
        .run(&Target::All, store.as_ref(), store.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome.outcomes.len(), 10);
    assert_eq!(outcome.succeeded(), 10);
    assert_eq!(outcome.failed().count(), 0);
}
