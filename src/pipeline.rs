//! One analysis run: load, compute, persist, visualize.

use crate::config::Config;
use crate::loader::{self, LoadConfig};
use crate::models::{Metric, RunMetadata, RunReport, SkuMetrics};
use crate::report;
use crate::stats;
use crate::store::MetricsStore;
use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub metadata: RunMetadata,
    pub metrics: SkuMetrics,
    /// Path of the control chart, when one was rendered.
    pub chart: Option<PathBuf>,
}

impl AnalysisOutcome {
    /// Build the report for this run.
    pub fn report(&self) -> RunReport {
        report::build_report(
            self.metadata.clone(),
            &self.metrics,
            self.chart.as_ref().map(|p| p.display().to_string()),
        )
    }
}

/// Run the full pipeline once with the given configuration.
///
/// The database connection is opened for this run only and closed before
/// returning.
pub fn run_analysis(config: &Config, show_progress: bool) -> Result<AnalysisOutcome> {
    let start = Instant::now();
    let table = config.table_name()?;

    let input = Path::new(&config.input.file);
    let records = loader::load_measurements(input, &LoadConfig::from(&config.input))
        .context("Failed to load measurements")?;

    let db_path = Path::new(&config.database.path);
    let mut store = MetricsStore::open(db_path, table)?;

    if config.database.reset {
        info!("Resetting table '{}'", store.table());
        store.drop_table()?;
    }
    store.ensure_table()?;
    store.seed_limits(&config.spec_limits)?;

    let lsl = store.lower_limits()?;
    let usl = store.upper_limits()?;
    debug!("Loaded limits for {} SKUs", lsl.len().min(usl.len()));

    let metrics = stats::analyze(&records, &lsl, &usl);
    info!(
        "Computed metrics for {} SKUs ({} with sigma level)",
        metrics.mean.len(),
        metrics.sigma.len()
    );

    let progress = progress_bar(show_progress, Metric::ALL.len() as u64)?;
    for metric in Metric::ALL {
        progress.set_message(metric.to_string());
        let written = store.upsert(metric, metrics.get(metric))?;
        info!("Updated {} for {} SKUs", metric, written);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let chart = if config.pipeline.visualize {
        let rows = store.rows()?;
        Some(report::write_control_chart(
            &rows,
            Path::new(&config.chart.output_dir),
            config.chart.width,
            config.chart.height,
        )?)
    } else {
        None
    };

    drop(store);

    let metadata = RunMetadata {
        input_file: config.input.file.clone(),
        analysis_date: Utc::now(),
        records: records.len(),
        skus: metrics.mean.len(),
        duration_seconds: start.elapsed().as_secs_f64(),
    };

    info!("Analysis complete in {:.2}s", metadata.duration_seconds);

    Ok(AnalysisOutcome {
        metadata,
        metrics,
        chart,
    })
}

fn progress_bar(show: bool, len: u64) -> Result<ProgressBar> {
    if !show {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Saving [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
