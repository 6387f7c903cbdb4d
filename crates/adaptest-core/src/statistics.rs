//! Distribution helpers and aggregate statistics over simulated sessions.

use serde::{Deserialize, Serialize};

use crate::simulation::SimulationRecord;

/// Standard normal cumulative distribution function.
///
/// Uses the Abramowitz & Stegun 7.1.26 approximation of `erf`
/// (absolute error below 1.5e-7), which is far finer than the
/// integer percentile it feeds.
pub fn normal_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Median of a slice of finite values. Returns `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Recovery statistics for a batch of simulated sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// Number of sessions summarized.
    pub sessions: usize,
    /// Mean absolute difference between estimated and true theta.
    pub mean_absolute_error: f64,
    /// Root mean squared error of the theta estimates.
    pub root_mean_square_error: f64,
    /// Mean signed error (estimated minus true).
    pub bias: f64,
    /// Distance used for `within_tolerance_rate`.
    pub tolerance: f64,
    /// Share of sessions whose estimate lies within `tolerance` of the truth.
    pub within_tolerance_rate: f64,
    /// Average test length.
    pub mean_items: f64,
    /// Average final standard error.
    pub mean_standard_error: f64,
}

/// Summarize recovery of true ability across simulated sessions.
pub fn summarize(records: &[SimulationRecord], tolerance: f64) -> SimulationSummary {
    let n = records.len();
    if n == 0 {
        return SimulationSummary {
            sessions: 0,
            mean_absolute_error: 0.0,
            root_mean_square_error: 0.0,
            bias: 0.0,
            tolerance,
            within_tolerance_rate: 0.0,
            mean_items: 0.0,
            mean_standard_error: 0.0,
        };
    }

    let count = n as f64;
    let errors: Vec<f64> = records
        .iter()
        .map(|r| r.estimated_theta - r.true_theta)
        .collect();

    let mean_absolute_error = errors.iter().map(|e| e.abs()).sum::<f64>() / count;
    let root_mean_square_error = (errors.iter().map(|e| e * e).sum::<f64>() / count).sqrt();
    let bias = errors.iter().sum::<f64>() / count;
    let within = errors.iter().filter(|e| e.abs() <= tolerance).count() as f64 / count;
    let mean_items = records
        .iter()
        .map(|r| r.items_administered as f64)
        .sum::<f64>()
        / count;
    let mean_standard_error = records.iter().map(|r| r.standard_error).sum::<f64>() / count;

    SimulationSummary {
        sessions: n,
        mean_absolute_error,
        root_mean_square_error,
        bias,
        tolerance,
        within_tolerance_rate: within,
        mean_items,
        mean_standard_error,
    }
}
