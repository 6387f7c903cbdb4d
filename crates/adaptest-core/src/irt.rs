//! Three-parameter logistic (3PL) response model.
//!
//! `P(θ) = c + (1 - c) / (1 + exp(-D·a·(θ - b)))`
//!
//! `D` is the calibration scaling constant of the item bank. It is fixed when
//! the bank is loaded and passed explicitly to every function here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::ItemParams;

/// Scaling constant for parameters calibrated on the logistic metric.
pub const LOGISTIC_SCALE: f64 = 1.0;

/// Scaling constant for parameters calibrated on the normal-ogive metric.
pub const NORMAL_OGIVE_SCALE: f64 = 1.702;

/// Bound on `D·a·(θ - b)`. Information and probabilities beyond it are
/// below 1e-15 and the exponentials would otherwise overflow.
const MAX_LOGIT: f64 = 35.0;

/// Metric the item parameters were calibrated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    Logistic,
    NormalOgive,
}

impl Metric {
    /// The `D` constant for this metric.
    pub fn scaling(self) -> f64 {
        match self {
            Metric::Logistic => LOGISTIC_SCALE,
            Metric::NormalOgive => NORMAL_OGIVE_SCALE,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Logistic => write!(f, "logistic"),
            Metric::NormalOgive => write!(f, "normal-ogive"),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "logistic" => Ok(Metric::Logistic),
            "normal-ogive" | "normal_ogive" | "ogive" => Ok(Metric::NormalOgive),
            other => Err(other.to_string()),
        }
    }
}

fn logit(theta: f64, params: &ItemParams, scaling: f64) -> f64 {
    (scaling * params.discrimination * (theta - params.difficulty)).clamp(-MAX_LOGIT, MAX_LOGIT)
}

fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Probability of a correct response at ability `theta`.
pub fn probability(theta: f64, params: &ItemParams, scaling: f64) -> f64 {
    let c = params.guessing;
    c + (1.0 - c) * logistic(logit(theta, params, scaling))
}

/// Fisher information of one item at `theta`.
///
/// `I(θ) = D²a²(1-c) / ((c + e^z)(1 + e^-z)²)` with `z = D·a·(θ - b)`.
pub fn information(theta: f64, params: &ItemParams, scaling: f64) -> f64 {
    let z = logit(theta, params, scaling);
    let a = params.discrimination;
    let c = params.guessing;
    let tail = 1.0 + (-z).exp();
    scaling * scaling * a * a * (1.0 - c) / ((c + z.exp()) * tail * tail)
}

/// Contribution of one response to the derivative of the log-likelihood.
///
/// `D·a·(u - P)(P - c) / (P(1 - c))`
pub fn score_contribution(theta: f64, params: &ItemParams, scaling: f64, correct: bool) -> f64 {
    let p = probability(theta, params, scaling);
    let c = params.guessing;
    let u = if correct { 1.0 } else { 0.0 };
    scaling * params.discrimination * (u - p) * (p - c) / (p * (1.0 - c))
}

/// Log-likelihood of a single response at `theta`.
pub fn log_likelihood(theta: f64, params: &ItemParams, scaling: f64, correct: bool) -> f64 {
    let p = probability(theta, params, scaling).clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
    if correct {
        p.ln()
    } else {
        (1.0 - p).ln()
    }
}
