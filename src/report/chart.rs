//! SVG control chart rendering.
//!
//! Plots the stored mean of each SKU with its UCL/LCL band and the LSL/USL
//! reference lines. Rows without a mean or std-dev leave a gap.

use crate::models::StoredMetrics;
use crate::stats::control_limits;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 200.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 90.0;
const Y_TICKS: usize = 5;

/// One SKU on the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub sku: String,
    pub mean: Option<f64>,
    pub ucl: Option<f64>,
    pub lcl: Option<f64>,
    pub lsl: Option<f64>,
    pub usl: Option<f64>,
    pub sigma: Option<f64>,
}

impl From<&StoredMetrics> for ChartPoint {
    fn from(row: &StoredMetrics) -> Self {
        let limits = match (row.mean, row.std_dev) {
            (Some(mean), Some(std)) => Some(control_limits(mean, std)),
            _ => None,
        };

        Self {
            sku: row.sku.clone(),
            mean: row.mean,
            ucl: limits.map(|l| l.ucl),
            lcl: limits.map(|l| l.lcl),
            lsl: row.lsl,
            usl: row.usl,
            sigma: row.sigma_level,
        }
    }
}

/// Maps data coordinates to SVG pixels.
struct Plot {
    width: f64,
    height: f64,
    count: usize,
    y_min: f64,
    y_max: f64,
}

impl Plot {
    fn x(&self, index: usize) -> f64 {
        let inner = self.width - MARGIN_LEFT - MARGIN_RIGHT;
        if self.count <= 1 {
            MARGIN_LEFT + inner / 2.0
        } else {
            MARGIN_LEFT + inner * index as f64 / (self.count - 1) as f64
        }
    }

    fn y(&self, value: f64) -> f64 {
        let inner = self.height - MARGIN_TOP - MARGIN_BOTTOM;
        MARGIN_TOP + inner * (self.y_max - value) / (self.y_max - self.y_min)
    }
}

/// Value range covering every plotted value, padded by 5%.
fn value_range(points: &[ChartPoint]) -> Option<(f64, f64)> {
    let values = points
        .iter()
        .flat_map(|p| [p.mean, p.ucl, p.lcl, p.lsl, p.usl])
        .flatten()
        .filter(|v| v.is_finite());

    let (min, max) = values.fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;

    let pad = if max > min { (max - min) * 0.05 } else { 1.0 };
    Some((min - pad, max + pad))
}

/// Split a series into runs of consecutive present values.
fn segments(values: impl Iterator<Item = Option<f64>>) -> Vec<Vec<(usize, f64)>> {
    let mut runs: Vec<Vec<(usize, f64)>> = Vec::new();
    let mut current = Vec::new();

    for (i, value) in values.enumerate() {
        match value.filter(|v| v.is_finite()) {
            Some(v) => current.push((i, v)),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    runs
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn polyline(plot: &Plot, run: &[(usize, f64)], attrs: &str) -> String {
    let points: Vec<String> = run
        .iter()
        .map(|(i, v)| format!("{:.1},{:.1}", plot.x(*i), plot.y(*v)))
        .collect();
    format!("<polyline points=\"{}\" fill=\"none\" {}/>\n", points.join(" "), attrs)
}

/// Render the control chart as an SVG document.
pub fn render_control_chart(points: &[ChartPoint], width: u32, height: u32) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" font-family=\"sans-serif\" font-size=\"12\">",
        w = width,
        h = height
    );
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"28\" text-anchor=\"middle\" font-size=\"16\">Control Chart with LSL, USL, UCL, LCL, and mean</text>",
        width as f64 / 2.0
    );

    let Some((y_min, y_max)) = value_range(points) else {
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">No data</text>",
            width as f64 / 2.0,
            height as f64 / 2.0
        );
        svg.push_str("</svg>\n");
        return svg;
    };

    let plot = Plot {
        width: width as f64,
        height: height as f64,
        count: points.len(),
        y_min,
        y_max,
    };

    svg.push_str(&render_axes(&plot, points));

    // UCL/LCL band, one polygon per contiguous run
    for run in segments(points.iter().map(|p| p.ucl.zip(p.lcl).map(|_| 0.0))) {
        let upper: Vec<String> = run
            .iter()
            .filter_map(|(i, _)| points[*i].ucl.map(|v| format!("{:.1},{:.1}", plot.x(*i), plot.y(v))))
            .collect();
        let lower: Vec<String> = run
            .iter()
            .rev()
            .filter_map(|(i, _)| points[*i].lcl.map(|v| format!("{:.1},{:.1}", plot.x(*i), plot.y(v))))
            .collect();
        let _ = writeln!(
            svg,
            "<polygon points=\"{} {}\" fill=\"lightgrey\" fill-opacity=\"0.7\" stroke=\"none\"/>",
            upper.join(" "),
            lower.join(" ")
        );
    }

    for run in segments(points.iter().map(|p| p.lsl)) {
        svg.push_str(&polyline(&plot, &run, "stroke=\"orange\" stroke-width=\"2\" stroke-dasharray=\"6,4\""));
    }
    for run in segments(points.iter().map(|p| p.usl)) {
        svg.push_str(&polyline(&plot, &run, "stroke=\"purple\" stroke-width=\"2\" stroke-dasharray=\"6,4\""));
    }
    for run in segments(points.iter().map(|p| p.mean)) {
        svg.push_str(&polyline(&plot, &run, "stroke=\"blue\" stroke-width=\"2\""));
        for (i, v) in &run {
            let point = &points[*i];
            let sigma = point
                .sigma
                .map(|s| format!(", sigma {:.2}", s))
                .unwrap_or_default();
            let _ = writeln!(
                svg,
                "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"4\" fill=\"blue\"><title>{}: mean {:.2}{}</title></circle>",
                plot.x(*i),
                plot.y(*v),
                escape(&point.sku),
                v,
                sigma
            );
        }
    }

    svg.push_str(&render_legend(&plot));
    svg.push_str("</svg>\n");
    svg
}

fn render_axes(plot: &Plot, points: &[ChartPoint]) -> String {
    let mut axes = String::new();
    let left = MARGIN_LEFT;
    let right = plot.width - MARGIN_RIGHT;
    let bottom = plot.height - MARGIN_BOTTOM;

    for t in 0..=Y_TICKS {
        let value = plot.y_min + (plot.y_max - plot.y_min) * t as f64 / Y_TICKS as f64;
        let y = plot.y(value);
        let _ = writeln!(
            axes,
            "<line x1=\"{left:.1}\" y1=\"{y:.1}\" x2=\"{right:.1}\" y2=\"{y:.1}\" stroke=\"#e0e0e0\"/>"
        );
        let _ = writeln!(
            axes,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{:.2}</text>",
            left - 8.0,
            y + 4.0,
            value
        );
    }

    let _ = writeln!(
        axes,
        "<line x1=\"{left:.1}\" y1=\"{top:.1}\" x2=\"{left:.1}\" y2=\"{bottom:.1}\" stroke=\"black\"/>",
        top = MARGIN_TOP
    );
    let _ = writeln!(
        axes,
        "<line x1=\"{left:.1}\" y1=\"{bottom:.1}\" x2=\"{right:.1}\" y2=\"{bottom:.1}\" stroke=\"black\"/>"
    );

    for (i, point) in points.iter().enumerate() {
        let x = plot.x(i);
        let _ = writeln!(
            axes,
            "<text x=\"{x:.1}\" y=\"{:.1}\" text-anchor=\"end\" transform=\"rotate(-30 {x:.1} {:.1})\">{}</text>",
            bottom + 18.0,
            bottom + 18.0,
            escape(&point.sku)
        );
    }

    let _ = writeln!(
        axes,
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">SKU</text>",
        (left + right) / 2.0,
        plot.height - 12.0
    );
    let _ = writeln!(
        axes,
        "<text x=\"18\" y=\"{mid:.1}\" text-anchor=\"middle\" transform=\"rotate(-90 18 {mid:.1})\">Mean/Average Weight</text>",
        mid = (MARGIN_TOP + bottom) / 2.0
    );

    axes
}

fn render_legend(plot: &Plot) -> String {
    let x = plot.width - MARGIN_RIGHT + 20.0;
    let entries = [
        ("Mean", "stroke=\"blue\" stroke-width=\"2\""),
        ("Control Limits", "stroke=\"lightgrey\" stroke-width=\"8\""),
        ("LSL", "stroke=\"orange\" stroke-width=\"2\" stroke-dasharray=\"6,4\""),
        ("USL", "stroke=\"purple\" stroke-width=\"2\" stroke-dasharray=\"6,4\""),
    ];

    let mut legend = String::new();
    for (i, (label, attrs)) in entries.iter().enumerate() {
        let y = MARGIN_TOP + 10.0 + i as f64 * 22.0;
        let _ = writeln!(
            legend,
            "<line x1=\"{x:.1}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" {attrs}/>",
            x + 28.0
        );
        let _ = writeln!(legend, "<text x=\"{:.1}\" y=\"{:.1}\">{}</text>", x + 36.0, y + 4.0, label);
    }
    legend
}

/// File name for a chart rendered at `timestamp`.
pub fn chart_file_name(timestamp: &DateTime<Local>) -> String {
    format!("control_chart_{}.svg", timestamp.format("%Y%m%d_%H%M%S"))
}

/// Render the chart for `rows` and write it into `dir`.
pub fn write_control_chart(rows: &[StoredMetrics], dir: &Path, width: u32, height: u32) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create chart directory {}", dir.display()))?;

    let points: Vec<ChartPoint> = rows.iter().map(ChartPoint::from).collect();
    let svg = render_control_chart(&points, width, height);

    let path = dir.join(chart_file_name(&Local::now()));
    std::fs::write(&path, svg).with_context(|| format!("Failed to write chart to {}", path.display()))?;

    info!("Control chart saved to: {}", path.display());
    Ok(path)
}
