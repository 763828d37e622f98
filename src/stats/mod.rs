//! Statistics engine.
//!
//! Groups measurement records by SKU and computes mean, sample variance,
//! sample standard deviation and sigma level, plus the control limits used
//! by the chart.

pub mod engine;
pub mod limits;

pub use engine::*;
pub use limits::*;
