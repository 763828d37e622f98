//! Report and chart output.

pub mod chart;
pub mod generator;

pub use chart::write_control_chart;
pub use generator::{build_report, generate_json_report, generate_markdown_report};
