//! Data models for the SPC pipeline.
//!
//! This module contains the core data structures shared by the loader,
//! the statistics engine, the metrics store and the report generators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Per-SKU scalar result (mean, variance, std-dev or sigma).
pub type SkuScalarMap = HashMap<String, f64>;

/// Per-SKU specification limit (either LSL or USL).
pub type SpecLimitMap = HashMap<String, f64>;

/// A single measurement row taken from the input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Product identifier the statistics are grouped by.
    pub sku: String,
    /// Measured value.
    pub value: f64,
}

impl MeasurementRecord {
    pub fn new(sku: impl Into<String>, value: f64) -> Self {
        Self {
            sku: sku.into(),
            value,
        }
    }
}

/// Default specification limits for a SKU, seeded into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecLimit {
    pub sku: String,
    pub lsl: f64,
    pub usl: f64,
}

/// A computed metric and the store column it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Mean,
    Variance,
    StdDev,
    Sigma,
}

impl Metric {
    /// All metrics in the order they are persisted.
    pub const ALL: [Metric; 4] = [Metric::Mean, Metric::Variance, Metric::StdDev, Metric::Sigma];

    /// Column name in the metrics table.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Mean => "mean",
            Metric::Variance => "variance",
            Metric::StdDev => "std_dev",
            Metric::Sigma => "sigma_level",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Mean => write!(f, "Mean"),
            Metric::Variance => write!(f, "Variance"),
            Metric::StdDev => write!(f, "Std Dev"),
            Metric::Sigma => write!(f, "Sigma Level"),
        }
    }
}

/// Why a SKU has no sigma level in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No LSL or USL is known for the SKU.
    MissingLimit,
    /// All samples are identical.
    ZeroStdDev,
    /// The sample std-dev is NaN: fewer than two samples or a NaN value.
    UndefinedStdDev,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingLimit => write!(f, "missing specification limit"),
            SkipReason::ZeroStdDev => write!(f, "standard deviation is 0"),
            SkipReason::UndefinedStdDev => write!(f, "standard deviation is undefined"),
        }
    }
}

/// A SKU left out of the sigma map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSku {
    pub sku: String,
    pub reason: SkipReason,
}

/// The four per-SKU maps produced by one analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkuMetrics {
    pub mean: SkuScalarMap,
    pub variance: SkuScalarMap,
    pub std_dev: SkuScalarMap,
    pub sigma: SkuScalarMap,
    /// SKUs that got no sigma level, with the reason.
    pub skipped: Vec<SkippedSku>,
}

impl SkuMetrics {
    /// Returns the map for the given metric.
    pub fn get(&self, metric: Metric) -> &SkuScalarMap {
        match metric {
            Metric::Mean => &self.mean,
            Metric::Variance => &self.variance,
            Metric::StdDev => &self.std_dev,
            Metric::Sigma => &self.sigma,
        }
    }

    /// Distinct SKUs seen in the dataset, sorted.
    pub fn skus(&self) -> Vec<&str> {
        let mut skus: Vec<&str> = self.mean.keys().map(String::as_str).collect();
        skus.sort_unstable();
        skus
    }
}

/// A row of the metrics table as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMetrics {
    pub id: i64,
    pub sku: String,
    pub lsl: Option<f64>,
    pub usl: Option<f64>,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub std_dev: Option<f64>,
    pub sigma_level: Option<f64>,
}

/// Metadata about one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Input file the measurements were loaded from.
    pub input_file: String,
    /// Date and time of the run.
    pub analysis_date: DateTime<Utc>,
    /// Number of measurement records loaded.
    pub records: usize,
    /// Number of distinct SKUs.
    pub skus: usize,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// One line of the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuReportRow {
    pub sku: String,
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
    pub ucl: f64,
    pub lcl: f64,
}

/// The complete run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub rows: Vec<SkuReportRow>,
    pub skipped: Vec<SkippedSku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
}
