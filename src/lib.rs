//! Household electricity consumption prediction service.
//!
//! Joins per-consumer billing and appliance records with reference data,
//! encodes them against a fixed training-time feature schema, runs a
//! regression model and derives billing and carbon-footprint figures,
//! persisting one result per (consumer, period).

pub mod catalog;
pub mod config;
pub mod domain;
pub mod ml;
pub mod pipeline;
pub mod store;
pub mod telemetry;
pub mod worker;
