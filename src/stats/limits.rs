//! Control limits derived from the process mean and std-dev.

use serde::{Deserialize, Serialize};

/// Multiplier applied to the std-dev for the control band.
pub const CONTROL_LIMIT_SIGMAS: f64 = 3.0;

/// Upper and lower control limits of a SKU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    pub ucl: f64,
    pub lcl: f64,
}

/// `UCL = mean + 3 * std_dev`, `LCL = mean - 3 * std_dev`.
pub fn control_limits(mean: f64, std_dev: f64) -> ControlLimits {
    ControlLimits {
        ucl: mean + CONTROL_LIMIT_SIGMAS * std_dev,
        lcl: mean - CONTROL_LIMIT_SIGMAS * std_dev,
    }
}
