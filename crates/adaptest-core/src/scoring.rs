//! Mapping of the final ability estimate onto the published score scale.
//!
//! The scale bounds are part of the external contract: consumers persist and
//! display scaled scores, so changing `score_min`/`score_max` is a breaking
//! change for them.
//!
//! Percentiles assume the calibration population's theta is standard normal.
//! No empirical norm table is involved; the percentile is `Φ(θ)` expressed
//! in `[1, 99]`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::report::{DomainScore, ScoreReport};
use crate::session::{Session, SessionStatus};
use crate::statistics::normal_cdf;
use crate::stopping::StopReason;

/// Minimum answered items in a domain before it can be called a strength
/// or an improvement area.
const MIN_DOMAIN_EVIDENCE: usize = 2;
const STRENGTH_THRESHOLD: f64 = 0.75;
const IMPROVEMENT_THRESHOLD: f64 = 0.5;

/// Linear theta-to-score mapping (`[scale]` in the settings file).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreScale {
    #[serde(default = "default_theta_min")]
    pub theta_min: f64,
    #[serde(default = "default_theta_max")]
    pub theta_max: f64,
    #[serde(default = "default_score_min")]
    pub score_min: i32,
    #[serde(default = "default_score_max")]
    pub score_max: i32,
}

fn default_theta_min() -> f64 {
    -4.0
}

fn default_theta_max() -> f64 {
    4.0
}

fn default_score_min() -> i32 {
    300
}

fn default_score_max() -> i32 {
    850
}

impl Default for ScoreScale {
    fn default() -> Self {
        Self {
            theta_min: default_theta_min(),
            theta_max: default_theta_max(),
            score_min: default_score_min(),
            score_max: default_score_max(),
        }
    }
}

impl ScoreScale {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.theta_min.is_finite()
            || !self.theta_max.is_finite()
            || self.theta_min >= self.theta_max
        {
            return Err(ConfigError::InvalidScale(format!(
                "theta range [{}, {}] is empty or not finite",
                self.theta_min, self.theta_max
            )));
        }
        if self.score_min >= self.score_max {
            return Err(ConfigError::InvalidScale(format!(
                "score range [{}, {}] is empty",
                self.score_min, self.score_max
            )));
        }
        Ok(())
    }

    /// Scaled score for `theta`, always within `[score_min, score_max]`.
    pub fn scaled_score(&self, theta: f64) -> i32 {
        let clamped = theta.clamp(self.theta_min, self.theta_max);
        let fraction = (clamped - self.theta_min) / (self.theta_max - self.theta_min);
        let span = f64::from(self.score_max) - f64::from(self.score_min);
        let raw = (f64::from(self.score_min) + fraction * span).round();
        if raw.is_nan() {
            return self.score_min;
        }
        (raw as i32).clamp(self.score_min, self.score_max)
    }

    /// Percentile of `theta` under a standard normal population, in `[1, 99]`.
    pub fn percentile(&self, theta: f64) -> u8 {
        let p = (normal_cdf(theta) * 100.0).round();
        if p.is_nan() {
            return 50;
        }
        p.clamp(1.0, 99.0) as u8
    }
}

/// Coarse placement band derived from theta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementLevel {
    /// θ < -1
    Foundation,
    /// -1 ≤ θ < 1
    Immersion,
    /// θ ≥ 1
    Mastery,
}

impl PlacementLevel {
    pub fn from_theta(theta: f64) -> Self {
        if theta < -1.0 {
            PlacementLevel::Foundation
        } else if theta < 1.0 {
            PlacementLevel::Immersion
        } else {
            PlacementLevel::Mastery
        }
    }
}

impl fmt::Display for PlacementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementLevel::Foundation => write!(f, "foundation"),
            PlacementLevel::Immersion => write!(f, "immersion"),
            PlacementLevel::Mastery => write!(f, "mastery"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoreTransformer {
    scale: ScoreScale,
}

impl ScoreTransformer {
    pub fn new(scale: ScoreScale) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> &ScoreScale {
        &self.scale
    }

    /// Build the report for a session that has just stopped.
    pub fn finalize(
        &self,
        session: &Session,
        stop_reason: StopReason,
        completed_at: DateTime<Utc>,
    ) -> ScoreReport {
        let theta = session.theta();

        let mut tallies: BTreeMap<String, (usize, usize)> = session
            .bank()
            .domains()
            .keys()
            .map(|d| (d.clone(), (0, 0)))
            .collect();
        for response in session.responses() {
            let entry = tallies.entry(response.domain.clone()).or_default();
            entry.0 += 1;
            if response.correct {
                entry.1 += 1;
            }
        }

        let mut strengths = Vec::new();
        let mut improvement_areas = Vec::new();
        let domain_breakdown = tallies
            .into_iter()
            .map(|(domain, (answered, correct))| {
                if answered == 0 {
                    return (domain, None);
                }
                let proportion_correct = correct as f64 / answered as f64;
                if answered >= MIN_DOMAIN_EVIDENCE {
                    if proportion_correct >= STRENGTH_THRESHOLD {
                        strengths.push(domain.clone());
                    } else if proportion_correct < IMPROVEMENT_THRESHOLD {
                        improvement_areas.push(domain.clone());
                    }
                }
                let score = DomainScore {
                    items_administered: answered,
                    correct,
                    proportion_correct,
                };
                (domain, Some(score))
            })
            .collect();

        ScoreReport {
            session_id: session.id(),
            status: SessionStatus::Completed,
            raw_theta: theta,
            standard_error: session.standard_error(),
            scaled_score: self.scale.scaled_score(theta),
            percentile: self.scale.percentile(theta),
            placement_level: PlacementLevel::from_theta(theta),
            domain_breakdown,
            item_count: session.responses().len(),
            elapsed_time_ms: session.elapsed_ms(completed_at),
            completed_at,
            stop_reason,
            strengths,
            improvement_areas,
            diagnostics: session.diagnostics().to_vec(),
        }
    }
}
