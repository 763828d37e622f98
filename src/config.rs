//! Configuration file handling.
//!
//! This module handles loading `.spcstats.toml`, merging it with CLI and
//! environment overrides, and validating the result once at startup. The
//! validated [`Config`] is passed explicitly into the pipeline.

use crate::models::SpecLimit;
use crate::scheduler::WeeklySchedule;
use crate::store::TableName;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".spcstats.toml";

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Table(#[from] crate::store::StoreError),

    #[error("invalid schedule: {0}")]
    Schedule(String),

    #[error("input delimiter must be a single ASCII character, got '{0}'")]
    Delimiter(char),

    #[error("chart size must be non-zero, got {0}x{1}")]
    ChartSize(u32, u32),

    #[error("specification limits for '{sku}' are inverted (lsl {lsl} > usl {usl})")]
    InvertedLimits { sku: String, lsl: f64, usl: f64 },
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Measurement input settings.
    #[serde(default)]
    pub input: InputConfig,

    /// Metrics database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// What a pipeline run does besides computing metrics.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Weekly trigger used by `auto` mode.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Control chart settings.
    #[serde(default)]
    pub chart: ChartConfig,

    /// Log file settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Specification limits seeded into the database on every run.
    #[serde(default = "default_spec_limits")]
    pub spec_limits: Vec<SpecLimit>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            schedule: ScheduleConfig::default(),
            chart: ChartConfig::default(),
            logging: LoggingConfig::default(),
            spec_limits: default_spec_limits(),
        }
    }
}

/// Measurement file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to the CSV measurement export.
    #[serde(default = "default_input_file")]
    pub file: String,

    /// Header of the SKU column.
    #[serde(default = "default_sku_column")]
    pub sku_column: String,

    /// Header of the value column.
    #[serde(default = "default_value_column")]
    pub value_column: String,

    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            file: default_input_file(),
            sku_column: default_sku_column(),
            value_column: default_value_column(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_input_file() -> String {
    "measurements.csv".to_string()
}

fn default_sku_column() -> String {
    "Sku".to_string()
}

fn default_value_column() -> String {
    "Value".to_string()
}

fn default_delimiter() -> char {
    ','
}

/// Metrics database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Table holding limits and metrics.
    #[serde(default = "default_table")]
    pub table: String,

    /// Drop the table before the run (limits are re-seeded).
    #[serde(default)]
    pub reset: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            table: default_table(),
            reset: false,
        }
    }
}

fn default_db_path() -> String {
    "spc_stats.db".to_string()
}

fn default_table() -> String {
    "spc_metrics".to_string()
}

/// Pipeline switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Allow `auto` mode to arm the weekly scheduler.
    #[serde(default)]
    pub auto_run: bool,

    /// Render a control chart after each run.
    #[serde(default = "default_true")]
    pub visualize: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_run: false,
            visualize: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Weekly trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Day of the week (e.g. "Monday" or "mon").
    #[serde(default = "default_weekday")]
    pub weekday: String,

    /// Local time of day, `HH:MM`.
    #[serde(default = "default_time")]
    pub time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekday: default_weekday(),
            time: default_time(),
        }
    }
}

fn default_weekday() -> String {
    "Monday".to_string()
}

fn default_time() -> String {
    "08:00".to_string()
}

/// Control chart settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Directory the charts are written to.
    #[serde(default = "default_chart_dir")]
    pub output_dir: String,

    /// Chart width in pixels.
    #[serde(default = "default_chart_width")]
    pub width: u32,

    /// Chart height in pixels.
    #[serde(default = "default_chart_height")]
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            output_dir: default_chart_dir(),
            width: default_chart_width(),
            height: default_chart_height(),
        }
    }
}

fn default_chart_dir() -> String {
    "visuals".to_string()
}

fn default_chart_width() -> u32 {
    1200
}

fn default_chart_height() -> u32 {
    600
}

/// Log file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write a log file in addition to the console.
    #[serde(default = "default_true")]
    pub file: bool,

    /// Directory for log files.
    #[serde(default = "default_log_dir")]
    pub dir: String,

    /// Log file name prefix; the date is appended.
    #[serde(default = "default_log_prefix")]
    pub prefix: String,

    /// Rotate the log file once it reaches this size (0 disables rotation).
    #[serde(default = "default_log_max_size_mb")]
    pub max_size_mb: u64,

    /// Number of rotated files to keep.
    #[serde(default = "default_log_backups")]
    pub backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            dir: default_log_dir(),
            prefix: default_log_prefix(),
            max_size_mb: default_log_max_size_mb(),
            backups: default_log_backups(),
        }
    }
}

impl LoggingConfig {
    /// Size cap in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "app".to_string()
}

fn default_log_max_size_mb() -> u64 {
    10
}

fn default_log_backups() -> usize {
    5
}

fn default_spec_limits() -> Vec<SpecLimit> {
    [
        ("Ochk 70g", 62.0, 68.0),
        ("Mmchk 70g", 64.0, 68.0),
        ("Rchk 120g", 112.0, 122.0),
        ("RCHK 70g", 66.0, 72.0),
        ("Mchk 70g", 64.0, 68.0),
        ("Rchk 180g", 168.0, 182.0),
    ]
    .into_iter()
    .map(|(sku, lsl, usl)| SpecLimit {
        sku: sku.to_string(),
        lsl,
        usl,
    })
    .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments and environment values.
    ///
    /// Only values that were given explicitly override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref input) = args.input {
            self.input.file = input.display().to_string();
        }
        if let Some(ref database) = args.database {
            self.database.path = database.display().to_string();
        }
        if let Some(ref table) = args.table {
            self.database.table = table.clone();
        }
        if let Some(auto_run) = args.auto_run {
            self.pipeline.auto_run = auto_run;
        }
        if let Some(visualize) = args.visualize {
            self.pipeline.visualize = visualize;
        }
        if let Some(ref dir) = args.chart_dir {
            self.chart.output_dir = dir.display().to_string();
        }
        if let Some(ref dir) = args.log_dir {
            self.logging.dir = dir.display().to_string();
        }
        if args.no_log_file {
            self.logging.file = false;
        }
        if args.reset {
            self.database.reset = true;
        }
    }

    /// Check every value that can only be validated once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table_name()?;
        self.weekly_schedule()?;

        if !self.input.delimiter.is_ascii() {
            return Err(ConfigError::Delimiter(self.input.delimiter));
        }

        if self.chart.width == 0 || self.chart.height == 0 {
            return Err(ConfigError::ChartSize(self.chart.width, self.chart.height));
        }

        if let Some(limit) = self.spec_limits.iter().find(|l| l.lsl > l.usl) {
            return Err(ConfigError::InvertedLimits {
                sku: limit.sku.clone(),
                lsl: limit.lsl,
                usl: limit.usl,
            });
        }

        Ok(())
    }

    /// The validated metrics table name.
    pub fn table_name(&self) -> Result<TableName, ConfigError> {
        Ok(TableName::parse(&self.database.table)?)
    }

    /// The parsed weekly schedule.
    pub fn weekly_schedule(&self) -> Result<WeeklySchedule, ConfigError> {
        WeeklySchedule::parse(&self.schedule.weekday, &self.schedule.time).map_err(ConfigError::Schedule)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
