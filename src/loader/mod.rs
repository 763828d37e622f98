//! Measurement file loader.
//!
//! Reads a tabular CSV export with a header row and turns the SKU and
//! value columns into measurement records.

use crate::models::MeasurementRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while loading measurements.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open measurements file {path}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed measurement file")]
    Csv(#[from] csv::Error),

    #[error("column '{0}' not found in header")]
    MissingColumn(String),

    #[error("row {row}: value '{value}' is not a number")]
    InvalidValue { row: u64, value: String },
}

/// Column configuration for the loader.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Header of the SKU column.
    pub sku_column: String,
    /// Header of the value column.
    pub value_column: String,
    /// Field delimiter.
    pub delimiter: u8,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            sku_column: "Sku".to_string(),
            value_column: "Value".to_string(),
            delimiter: b',',
        }
    }
}

impl From<&crate::config::InputConfig> for LoadConfig {
    fn from(config: &crate::config::InputConfig) -> Self {
        Self {
            sku_column: config.sku_column.clone(),
            value_column: config.value_column.clone(),
            delimiter: config.delimiter as u8,
        }
    }
}

/// Load measurements from a file.
pub fn load_measurements(path: &Path, config: &LoadConfig) -> Result<Vec<MeasurementRecord>, LoadError> {
    info!("Loading measurements from: {}", path.display());

    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.display().to_string(),
        source,
    })?;

    let records = load_from_reader(file, config)?;
    info!("Loaded {} measurements", records.len());
    Ok(records)
}

/// Load measurements from any reader.
pub fn load_from_reader<R: Read>(input: R, config: &LoadConfig) -> Result<Vec<MeasurementRecord>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(config.delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let sku_idx = column_index(&headers, &config.sku_column)?;
    let value_idx = column_index(&headers, &config.value_column)?;
    debug!(
        "Using columns '{}' (#{}) and '{}' (#{})",
        config.sku_column, sku_idx, config.value_column, value_idx
    );

    let mut records = Vec::new();

    for result in reader.records() {
        let row = result?;
        // Header is line 1
        let line = row.position().map(|p| p.line()).unwrap_or(0);

        let sku = row.get(sku_idx).unwrap_or("");
        let raw_value = row.get(value_idx).unwrap_or("");

        if sku.is_empty() || raw_value.is_empty() {
            warn!("Skipping line {}: missing SKU or value", line);
            continue;
        }

        let value: f64 = raw_value.parse().map_err(|_| LoadError::InvalidValue {
            row: line,
            value: raw_value.to_string(),
        })?;

        records.push(MeasurementRecord::new(sku, value));
    }

    Ok(records)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, LoadError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
}
