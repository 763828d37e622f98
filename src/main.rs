//! spcstats - Statistical process control for manufacturing SKUs
//!
//! A CLI tool that loads per-SKU measurements, computes mean, variance,
//! standard deviation and sigma level, stores them next to the SKU
//! specification limits and renders a control chart.
//!
//! Exit codes:
//!   0 - Success (including `manual` and unknown modes)
//!   1 - Runtime error (config, input file, database, etc.)

mod cli;
mod config;
mod loader;
mod logging;
mod models;
mod pipeline;
mod report;
mod scheduler;
mod stats;
mod store;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat, RunMode, USAGE};
use config::{Config, DEFAULT_CONFIG_FILE};
use pipeline::AnalysisOutcome;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&args, &config.logging) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    info!("spcstats v{}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {}", source);
    debug!("Arguments: {:?}", args);

    match run_mode(args, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .spcstats.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", DEFAULT_CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the input file, database, schedule and limits.");
    Ok(())
}

/// Load configuration, apply CLI/env overrides and validate it.
///
/// Returns the config and a description of where it came from.
fn load_config(args: &Args) -> Result<(Config, String)> {
    let (mut config, source) = if let Some(ref config_path) = args.config {
        (Config::load(config_path)?, config_path.display().to_string())
    } else {
        match Config::load_default()? {
            Some(config) => (config, DEFAULT_CONFIG_FILE.to_string()),
            None => (Config::default(), "built-in defaults".to_string()),
        }
    };

    config.merge_with_args(args);
    config.validate().context("Invalid configuration")?;

    Ok((config, source))
}

/// Initialize console and file logging based on verbosity settings.
fn init_logging(args: &Args, logging: &config::LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level()).into())
        .from_env_lossy();

    let console = fmt::layer().with_target(false).compact();

    let file = if logging.file {
        let dir = Path::new(&logging.dir);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        let path = dir.join(format!(
            "{}_{}.log",
            logging.prefix,
            chrono::Local::now().format("%Y%m%d")
        ));
        let handle = crate::logging::RotatingFile::open(&path, logging.max_bytes(), logging.backups)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        Some(
            fmt::layer()
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(Mutex::new(handle)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to set tracing subscriber")?;

    Ok(())
}

/// What the selected mode asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunPlan {
    /// Run the pipeline once.
    Once,
    /// Run the pipeline on the weekly schedule.
    Weekly(scheduler::WeeklySchedule),
    /// Nothing to do.
    Idle,
}

/// Decide what a mode does with this configuration.
fn plan_run(mode: &RunMode, config: &Config) -> Result<RunPlan> {
    match mode {
        RunMode::Default => Ok(RunPlan::Once),
        RunMode::Auto if !config.pipeline.auto_run => {
            info!("Auto-run is disabled; set pipeline.auto_run or pass --auto-run true to arm the weekly schedule");
            Ok(RunPlan::Idle)
        }
        RunMode::Auto => Ok(RunPlan::Weekly(config.weekly_schedule()?)),
        RunMode::Manual => {
            info!("Set to run analysis manually on user demand");
            Ok(RunPlan::Idle)
        }
        RunMode::Unknown(mode) => {
            debug!("Unknown mode: {}", mode);
            info!("{}", USAGE);
            Ok(RunPlan::Idle)
        }
    }
}

/// Dispatch on the selected run mode.
async fn run_mode(args: Args, config: Config) -> Result<()> {
    let target = args.report.clone().map(|path| (path, args.format));

    match plan_run(&args.run_mode(), &config)? {
        RunPlan::Once => {
            let show_progress = !args.quiet;
            let outcome = tokio::task::spawn_blocking(move || execute_run(&config, target.as_ref(), show_progress))
                .await
                .context("Analysis task failed")??;

            print_summary(&outcome);
        }
        RunPlan::Weekly(schedule) => {
            info!("Set to run analysis automatically {}", schedule);
            info!("Scheduler started. Press Ctrl+C to exit.");

            let job: scheduler::Job = Arc::new(move || execute_run(&config, target.as_ref(), false).map(|_| ()));
            scheduler::run_weekly(schedule, job, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }
        RunPlan::Idle => {}
    }

    Ok(())
}

/// Run the pipeline once and write the report, if one was requested.
fn execute_run(
    config: &Config,
    report_target: Option<&(PathBuf, OutputFormat)>,
    show_progress: bool,
) -> Result<AnalysisOutcome> {
    let outcome = pipeline::run_analysis(config, show_progress)?;

    if let Some((path, format)) = report_target {
        let run_report = outcome.report();
        let output = match format {
            OutputFormat::Json => report::generate_json_report(&run_report)?,
            OutputFormat::Markdown => report::generate_markdown_report(&run_report),
        };

        std::fs::write(path, &output)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report saved to: {}", path.display());
    }

    Ok(outcome)
}

/// Print a short summary of a finished run.
fn print_summary(outcome: &AnalysisOutcome) {
    println!("\n📊 Analysis Summary:");
    println!("   Measurements: {}", outcome.metadata.records);
    println!("   SKUs: {}", outcome.metadata.skus);
    println!("   With sigma level: {}", outcome.metrics.sigma.len());
    if !outcome.metrics.skipped.is_empty() {
        println!("   Without sigma level: {}", outcome.metrics.skipped.len());
    }
    if let Some(ref chart) = outcome.chart {
        println!("   Chart: {}", chart.display());
    }
    println!("   Duration: {:.2}s", outcome.metadata.duration_seconds);
    println!("\n✅ Analysis complete! Check the log file for details.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_mode_runs_once() {
        let plan = plan_run(&RunMode::Default, &Config::default()).unwrap();
        assert_eq!(plan, RunPlan::Once);
    }

    #[test]
    fn test_manual_and_unknown_modes_are_idle() {
        let config = Config::default();
        assert_eq!(plan_run(&RunMode::Manual, &config).unwrap(), RunPlan::Idle);
        assert_eq!(
            plan_run(&RunMode::from("weekly"), &config).unwrap(),
            RunPlan::Idle
        );
    }

    #[test]
    fn test_auto_mode_requires_auto_run() {
        let mut config = Config::default();
        assert_eq!(plan_run(&RunMode::Auto, &config).unwrap(), RunPlan::Idle);

        config.pipeline.auto_run = true;
        config.schedule.weekday = "Fri".to_string();
        config.schedule.time = "17:30".to_string();
        let expected = scheduler::WeeklySchedule::parse("Friday", "17:30").unwrap();
        assert_eq!(plan_run(&RunMode::Auto, &config).unwrap(), RunPlan::Weekly(expected));
    }

    #[test]
    fn test_idle_modes_never_touch_the_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.input.file = dir.path().join("missing.csv").display().to_string();
        config.database.path = dir.path().join("spc.db").display().to_string();

        for mode in ["manual", "bogus", "auto"] {
            let args = Args::try_parse_from(["spcstats", mode, "--auto-run", "false"]).unwrap();
            tokio_test::block_on(run_mode(args, config.clone())).unwrap();
        }

        assert!(!dir.path().join("spc.db").exists());
    }
}
