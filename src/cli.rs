//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and run-mode selection.

use clap::builder::BoolishValueParser;
use clap::Parser;
use std::fmt;
use std::path::PathBuf;

/// Usage line logged for an unknown mode.
pub const USAGE: &str = "Usage: spcstats [default|auto|manual] [OPTIONS]";

/// spcstats - Statistical process control for manufacturing SKUs
///
/// Computes mean, variance, standard deviation and sigma level per SKU from
/// a measurement export, stores them next to the SKU specification limits
/// and renders a control chart.
///
/// Modes:
///   default  run the analysis once
///   auto     run the analysis every week (requires auto_run)
///   manual   do nothing; analysis is run on demand
///
/// Examples:
///   spcstats
///   spcstats default --input weights.csv --report report.md
///   spcstats auto --auto-run true
///   spcstats --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Run mode: default, auto or manual
    #[arg(value_name = "MODE", default_value = "default")]
    pub mode: String,

    /// Path to configuration file
    ///
    /// If not specified, looks for .spcstats.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Measurement CSV file with Sku and Value columns
    #[arg(short, long, value_name = "FILE", env = "SPC_INPUT_FILE")]
    pub input: Option<PathBuf>,

    /// SQLite database holding limits and metrics
    #[arg(short, long, value_name = "FILE", env = "SPC_DB_PATH")]
    pub database: Option<PathBuf>,

    /// Table name for limits and metrics
    #[arg(long, value_name = "NAME", env = "SPC_TABLE_NAME")]
    pub table: Option<String>,

    /// Allow `auto` mode to arm the weekly scheduler (true/false, 1/0)
    #[arg(long, value_name = "BOOL", env = "SPC_AUTORUN", value_parser = BoolishValueParser::new())]
    pub auto_run: Option<bool>,

    /// Render a control chart after each run (true/false, 1/0)
    #[arg(long, value_name = "BOOL", env = "SPC_VISUALIZE", value_parser = BoolishValueParser::new())]
    pub visualize: Option<bool>,

    /// Directory for control charts
    #[arg(long, value_name = "DIR")]
    pub chart_dir: Option<PathBuf>,

    /// Drop and recreate the metrics table before the run
    #[arg(long)]
    pub reset: bool,

    /// Write a run report to this file
    #[arg(short, long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Report format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Directory for log files
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log to the console only
    #[arg(long)]
    pub no_log_file: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .spcstats.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// How the pipeline is triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Run once and exit.
    Default,
    /// Run on the weekly schedule.
    Auto,
    /// Placeholder for on-demand runs; does nothing.
    Manual,
    /// Anything else; usage help is logged.
    Unknown(String),
}

impl From<&str> for RunMode {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "default" => RunMode::Default,
            "auto" => RunMode::Auto,
            "manual" => RunMode::Manual,
            _ => RunMode::Unknown(s.to_string()),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Default => write!(f, "default"),
            RunMode::Auto => write!(f, "auto"),
            RunMode::Manual => write!(f, "manual"),
            RunMode::Unknown(s) => write!(f, "{}", s),
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The selected run mode.
    pub fn run_mode(&self) -> RunMode {
        RunMode::from(self.mode.as_str())
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref input) = self.input {
            if input.as_os_str().is_empty() {
                return Err("Input file path must not be empty".to_string());
            }
        }

        if let Some(ref report) = self.report {
            if report.is_dir() {
                return Err(format!(
                    "Report path is a directory: {}",
                    report.display()
                ));
            }
        }

        if let Some(ref config) = self.config {
            if !config.exists() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
