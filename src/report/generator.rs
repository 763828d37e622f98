//! Run report generation.
//!
//! This module turns the metrics of one analysis run into a Markdown or
//! JSON report.

use crate::models::{RunMetadata, RunReport, SkippedSku, SkuMetrics, SkuReportRow};
use crate::stats::control_limits;
use anyhow::Result;

/// Build the report rows from the computed metrics, sorted by SKU.
pub fn build_report(metadata: RunMetadata, metrics: &SkuMetrics, chart: Option<String>) -> RunReport {
    let rows = metrics
        .skus()
        .into_iter()
        .map(|sku| {
            let mean = metrics.mean[sku];
            let std_dev = metrics.std_dev.get(sku).copied().unwrap_or(f64::NAN);
            let limits = control_limits(mean, std_dev);

            SkuReportRow {
                sku: sku.to_string(),
                mean,
                variance: metrics.variance.get(sku).copied().unwrap_or(f64::NAN),
                std_dev,
                sigma: metrics.sigma.get(sku).copied(),
                ucl: limits.ucl,
                lcl: limits.lcl,
            }
        })
        .collect();

    RunReport {
        metadata,
        rows,
        skipped: metrics.skipped.clone(),
        chart,
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str("# SPC Analysis Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_metrics_section(&report.rows));
    output.push_str(&generate_skipped_section(&report.skipped));

    if let Some(ref chart) = report.chart {
        output.push_str("## Control Chart\n\n");
        output.push_str(&format!("Saved to `{}`.\n\n", chart));
    }

    output.push_str("---\n\n");
    output.push_str("*Report generated by spcstats*\n");

    output
}

fn generate_metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input File:** `{}`\n", metadata.input_file));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Measurements:** {}\n", metadata.records));
    section.push_str(&format!("- **SKUs:** {}\n", metadata.skus));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.2}s\n\n",
        metadata.duration_seconds
    ));

    section
}

/// Format a metric for a table cell; undefined values show as a dash.
fn cell(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}", value)
    } else {
        "–".to_string()
    }
}

fn generate_metrics_section(rows: &[SkuReportRow]) -> String {
    let mut section = String::new();

    section.push_str("## Metrics by SKU\n\n");

    if rows.is_empty() {
        section.push_str("No measurements were found in the input file.\n\n");
        return section;
    }

    section.push_str("| SKU | Mean | Variance | Std Dev | Sigma Level | UCL | LCL |\n");
    section.push_str("|:---|---:|---:|---:|---:|---:|---:|\n");

    for row in rows {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            row.sku,
            cell(row.mean),
            cell(row.variance),
            cell(row.std_dev),
            row.sigma.map(cell).unwrap_or_else(|| "–".to_string()),
            cell(row.ucl),
            cell(row.lcl),
        ));
    }
    section.push('\n');

    section
}

fn generate_skipped_section(skipped: &[SkippedSku]) -> String {
    if skipped.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## SKUs Without Sigma Level\n\n");
    for entry in skipped {
        section.push_str(&format!("- `{}`: {}\n", entry.sku, entry.reason));
    }
    section.push('\n');

    section
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MeasurementRecord, SkipReason};
    use crate::stats::analyze;
    use chrono::Utc;

    fn create_test_report() -> RunReport {
        let dataset = vec![
            MeasurementRecord::new("A", 65.0),
            MeasurementRecord::new("A", 67.0),
            MeasurementRecord::new("A", 63.0),
            MeasurementRecord::new("B", 5.0),
        ];
        let lsl = [("A".to_string(), 60.0)].into_iter().collect();
        let usl = [("A".to_string(), 70.0)].into_iter().collect();
        let metrics = analyze(&dataset, &lsl, &usl);

        let metadata = RunMetadata {
            input_file: "measurements.csv".to_string(),
            analysis_date: Utc::now(),
            records: 4,
            skus: 2,
            duration_seconds: 0.25,
        };

        build_report(metadata, &metrics, Some("visuals/chart.svg".to_string()))
    }

    #[test]
    fn test_build_report_rows() {
        let report = create_test_report();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].sku, "A");
        assert_eq!(report.rows[0].sigma, Some(2.5));
        assert_eq!(report.rows[0].ucl, 71.0);
        assert_eq!(report.rows[0].lcl, 59.0);
        assert!(report.rows[1].std_dev.is_nan());
        assert_eq!(report.rows[1].sigma, None);
        assert_eq!(report.skipped[0].reason, SkipReason::MissingLimit);
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# SPC Analysis Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("| A | 65.00 | 4.00 | 2.00 | 2.50 | 71.00 | 59.00 |"));
        assert!(markdown.contains("| B | 5.00 | – | – | – | – | – |"));
        assert!(markdown.contains("`B`: missing specification limit"));
        assert!(markdown.contains("visuals/chart.svg"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"input_file\""));
        assert!(json.contains("\"rows\""));
        assert!(json.contains("\"missing_limit\""));
    }
}
