//! Static reference lookup tables for appliance specs and location tariffs.
//!
//! Both tables are keyed by normalized text (trimmed, lowercased) so that
//! live records join regardless of case or stray whitespace.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Rated power and per-hour consumption for one appliance model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApplianceSpec {
    pub power_rating_w: f64,
    pub consumption_kwh_per_hour: f64,
}

/// Tariff figures for one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TariffInfo {
    pub base_tariff: f64,
    pub per_unit_cost: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplianceSpecRow {
    pub appliance_name: String,
    pub power_rating_w: f64,
    pub consumption_kwh_per_hour: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffRow {
    pub location: String,
    pub base_tariff: f64,
    pub per_unit_cost: f64,
}

/// Normalize a join key: trim and lowercase.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Read-only lookup tables, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    appliances: HashMap<String, ApplianceSpec>,
    tariffs: HashMap<String, TariffInfo>,
}

impl ReferenceCatalog {
    pub fn new(
        appliances: impl IntoIterator<Item = ApplianceSpecRow>,
        tariffs: impl IntoIterator<Item = TariffRow>,
    ) -> Self {
        let appliances = appliances
            .into_iter()
            .map(|row| {
                (
                    normalize_key(&row.appliance_name),
                    ApplianceSpec {
                        power_rating_w: row.power_rating_w,
                        consumption_kwh_per_hour: row.consumption_kwh_per_hour,
                    },
                )
            })
            .collect();
        let tariffs = tariffs
            .into_iter()
            .map(|row| {
                (
                    normalize_key(&row.location),
                    TariffInfo {
                        base_tariff: row.base_tariff,
                        per_unit_cost: row.per_unit_cost,
                    },
                )
            })
            .collect();
        Self { appliances, tariffs }
    }

    /// Load both tables from JSON files produced by the reference-data
    /// loader.
    pub fn from_json_files(appliances_path: &Path, tariffs_path: &Path) -> Result<Self> {
        let appliances: Vec<ApplianceSpecRow> = serde_json::from_slice(
            &std::fs::read(appliances_path)
                .with_context(|| format!("reading {}", appliances_path.display()))?,
        )
        .with_context(|| format!("parsing {}", appliances_path.display()))?;
        let tariffs: Vec<TariffRow> = serde_json::from_slice(
            &std::fs::read(tariffs_path)
                .with_context(|| format!("reading {}", tariffs_path.display()))?,
        )
        .with_context(|| format!("parsing {}", tariffs_path.display()))?;
        Ok(Self::new(appliances, tariffs))
    }

    /// Look up an appliance spec. The key is normalized before matching.
    pub fn appliance(&self, name: &str) -> Option<&ApplianceSpec> {
        self.appliances.get(&normalize_key(name))
    }

    /// Look up tariff figures for a location.
    pub fn tariff(&self, location: &str) -> Option<&TariffInfo> {
        self.tariffs.get(&normalize_key(location))
    }

    pub fn appliance_count(&self) -> usize {
        self.appliances.len()
    }

    pub fn tariff_count(&self) -> usize {
        self.tariffs.len()
    }
}
