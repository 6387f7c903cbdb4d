//! Ability estimation from an accumulated response pattern.
//!
//! Two estimators are available. Maximum likelihood runs Fisher scoring from
//! the current estimate; expected a posteriori integrates the likelihood
//! against a standard normal prior on a fixed quadrature grid. Both report
//! the standard error from the test information at the new estimate, which
//! is what the stopping rule compares against its target.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::irt;
use crate::model::ItemParams;

/// Estimation method used after each response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
    #[default]
    Mle,
    Eap,
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationMethod::Mle => write!(f, "mle"),
            EstimationMethod::Eap => write!(f, "eap"),
        }
    }
}

impl FromStr for EstimationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mle" => Ok(EstimationMethod::Mle),
            "eap" => Ok(EstimationMethod::Eap),
            other => Err(format!("unknown estimation method: {other}")),
        }
    }
}

/// Tuning for the ability estimator (`[estimator]` in the settings file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSettings {
    #[serde(default)]
    pub method: EstimationMethod,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_theta_min")]
    pub theta_min: f64,
    #[serde(default = "default_theta_max")]
    pub theta_max: f64,
    #[serde(default)]
    pub initial_theta: f64,
    #[serde(default = "default_initial_se")]
    pub initial_standard_error: f64,
    #[serde(default = "default_quadrature_points")]
    pub quadrature_points: usize,
}

fn default_max_iterations() -> usize {
    25
}

fn default_tolerance() -> f64 {
    0.001
}

fn default_theta_min() -> f64 {
    -4.0
}

fn default_theta_max() -> f64 {
    4.0
}

fn default_initial_se() -> f64 {
    1.0
}

fn default_quadrature_points() -> usize {
    61
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            method: EstimationMethod::default(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            theta_min: default_theta_min(),
            theta_max: default_theta_max(),
            initial_theta: 0.0,
            initial_standard_error: default_initial_se(),
            quadrature_points: default_quadrature_points(),
        }
    }
}

impl EstimatorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidEstimator(msg));
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".into());
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return invalid(format!("tolerance must be positive, got {}", self.tolerance));
        }
        if !self.theta_min.is_finite()
            || !self.theta_max.is_finite()
            || self.theta_min >= self.theta_max
        {
            return invalid(format!(
                "theta range [{}, {}] is empty or not finite",
                self.theta_min, self.theta_max
            ));
        }
        if !(self.theta_min..=self.theta_max).contains(&self.initial_theta) {
            return invalid(format!(
                "initial_theta {} lies outside [{}, {}]",
                self.initial_theta, self.theta_min, self.theta_max
            ));
        }
        if !self.initial_standard_error.is_finite() || self.initial_standard_error <= 0.0 {
            return invalid(format!(
                "initial_standard_error must be positive, got {}",
                self.initial_standard_error
            ));
        }
        if self.method == EstimationMethod::Eap && self.quadrature_points < 2 {
            return invalid("EAP needs at least 2 quadrature points".into());
        }
        Ok(())
    }
}

/// A point estimate of ability with its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityEstimate {
    pub theta: f64,
    pub standard_error: f64,
}

/// One scored response as seen by the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub params: ItemParams,
    pub correct: bool,
}

/// Result of re-estimating ability after a response.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateUpdate {
    pub estimate: AbilityEstimate,
    /// Scoring iterations used (0 for EAP and for the empty pattern).
    pub iterations: usize,
    /// Set when the estimator fell back to a bisection step.
    pub instability: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AbilityEstimator {
    settings: EstimatorSettings,
}

impl AbilityEstimator {
    pub fn new(settings: EstimatorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    /// The estimate before any response has been recorded.
    pub fn prior(&self) -> AbilityEstimate {
        AbilityEstimate {
            theta: self.settings.initial_theta,
            standard_error: self.settings.initial_standard_error,
        }
    }

    fn clamp(&self, theta: f64) -> f64 {
        theta.clamp(self.settings.theta_min, self.settings.theta_max)
    }

    /// Re-estimate ability over the full response pattern.
    ///
    /// The last observation is the item just answered; its difficulty is the
    /// bisection target when the iterative estimate cannot be trusted.
    pub fn update(
        &self,
        current: AbilityEstimate,
        responses: &[Observation],
        scaling: f64,
    ) -> EstimateUpdate {
        let Some(last) = responses.last() else {
            return EstimateUpdate {
                estimate: current,
                iterations: 0,
                instability: None,
            };
        };

        let attempt = match self.settings.method {
            EstimationMethod::Mle => self.fisher_scoring(current.theta, responses, scaling),
            EstimationMethod::Eap => self.expected_a_posteriori(responses, scaling),
        };

        match attempt {
            Ok((theta, iterations)) => {
                let standard_error = self
                    .standard_error(theta, responses, scaling)
                    .unwrap_or(current.standard_error);
                debug!(theta, standard_error, iterations, "ability updated");
                EstimateUpdate {
                    estimate: AbilityEstimate {
                        theta,
                        standard_error,
                    },
                    iterations,
                    instability: None,
                }
            }
            Err((reason, iterations)) => {
                let theta = self.clamp((current.theta + last.params.difficulty) / 2.0);
                let standard_error = self
                    .standard_error(theta, responses, scaling)
                    .unwrap_or(current.standard_error);
                EstimateUpdate {
                    estimate: AbilityEstimate {
                        theta,
                        standard_error,
                    },
                    iterations,
                    instability: Some(reason),
                }
            }
        }
    }

    /// `1 / sqrt(Σ I_i(θ))`, or `None` when the test information is not usable.
    pub fn standard_error(
        &self,
        theta: f64,
        responses: &[Observation],
        scaling: f64,
    ) -> Option<f64> {
        let total: f64 = responses
            .iter()
            .map(|o| irt::information(theta, &o.params, scaling))
            .sum();
        let se = 1.0 / total.sqrt();
        (total > 0.0 && se.is_finite()).then_some(se)
    }

    fn fisher_scoring(
        &self,
        start: f64,
        responses: &[Observation],
        scaling: f64,
    ) -> Result<(f64, usize), (String, usize)> {
        let mut theta = self.clamp(start);
        for iteration in 1..=self.settings.max_iterations {
            let mut score = 0.0;
            let mut info = 0.0;
            for o in responses {
                score += irt::score_contribution(theta, &o.params, scaling, o.correct);
                info += irt::information(theta, &o.params, scaling);
            }
            if !score.is_finite() || !info.is_finite() || info <= 0.0 {
                return Err((
                    format!("degenerate likelihood at theta {theta:.4} (information {info})"),
                    iteration,
                ));
            }

            let next = self.clamp(theta + score / info);
            if !next.is_finite() {
                return Err((format!("non-finite step from theta {theta:.4}"), iteration));
            }
            let moved = (next - theta).abs();
            theta = next;
            if moved < self.settings.tolerance {
                return Ok((theta, iteration));
            }
        }
        Err((
            format!(
                "no convergence within {} iterations (last theta {theta:.4})",
                self.settings.max_iterations
            ),
            self.settings.max_iterations,
        ))
    }

    fn expected_a_posteriori(
        &self,
        responses: &[Observation],
        scaling: f64,
    ) -> Result<(f64, usize), (String, usize)> {
        let n = self.settings.quadrature_points;
        let lo = self.settings.theta_min;
        let step = (self.settings.theta_max - lo) / (n - 1) as f64;

        let log_posterior: Vec<(f64, f64)> = (0..n)
            .map(|k| {
                let q = lo + step * k as f64;
                let ll: f64 = responses
                    .iter()
                    .map(|o| irt::log_likelihood(q, &o.params, scaling, o.correct))
                    .sum();
                (q, ll - 0.5 * q * q)
            })
            .collect();

        let peak = log_posterior
            .iter()
            .map(|&(_, lp)| lp)
            .fold(f64::NEG_INFINITY, f64::max);

        let mut weight_sum = 0.0;
        let mut weighted = 0.0;
        for &(q, lp) in &log_posterior {
            let w = (lp - peak).exp();
            weight_sum += w;
            weighted += w * q;
        }

        let theta = weighted / weight_sum;
        if !theta.is_finite() || weight_sum <= 0.0 {
            return Err(("posterior has no usable mass".to_string(), 0));
        }
        Ok((self.clamp(theta), 0))
    }
}

impl Default for AbilityEstimator {
    fn default() -> Self {
        Self::new(EstimatorSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(difficulty: f64, correct: bool) -> Observation {
        Observation {
            params: ItemParams::new(1.0, difficulty, 0.2),
            correct,
        }
    }

    #[test]
    fn empty_pattern_keeps_prior() {
        let estimator = AbilityEstimator::default();
        let prior = estimator.prior();
        let update = estimator.update(prior, &[], 1.0);
        assert_eq!(update.estimate, prior);
        assert_eq!(update.iterations, 0);
        assert!(update.instability.is_none());
    }

    #[test]
    fn all_correct_pattern_is_clamped() {
        let estimator = AbilityEstimator::default();
        let pattern = [obs(-1.0, true), obs(0.0, true), obs(1.0, true)];
        let update = estimator.update(estimator.prior(), &pattern, 1.0);
        assert_eq!(update.estimate.theta, 4.0);
        assert!(update.instability.is_none());
    }

    #[test]
    fn all_incorrect_pattern_is_clamped() {
        let estimator = AbilityEstimator::default();
        let pattern = [obs(-1.0, false), obs(0.0, false)];
        let update = estimator.update(estimator.prior(), &pattern, 1.0);
        assert_eq!(update.estimate.theta, -4.0);
    }

    #[test]
    fn mixed_pattern_lands_between_items() {
        let estimator = AbilityEstimator::default();
        let pattern = [
            obs(-2.0, true),
            obs(-1.0, true),
            obs(0.0, true),
            obs(1.0, false),
            obs(2.0, false),
        ];
        let update = estimator.update(estimator.prior(), &pattern, 1.0);
        let theta = update.estimate.theta;
        assert!(theta > -1.0 && theta < 2.0, "theta {theta}");
        assert!(update.iterations >= 1);
        assert!(update.estimate.standard_error > 0.0);
    }

    #[test]
    fn mle_stationary_point_has_zero_score() {
        let estimator = AbilityEstimator::default();
        let pattern = [obs(-0.5, true), obs(0.5, false), obs(0.0, true), obs(1.0, false)];
        let update = estimator.update(estimator.prior(), &pattern, 1.702);
        let theta = update.estimate.theta;
        let score: f64 = pattern
            .iter()
            .map(|o| irt::score_contribution(theta, &o.params, 1.702, o.correct))
            .sum();
        assert!(score.abs() < 0.01, "score {score} at theta {theta}");
    }

    #[test]
    fn standard_error_matches_information() {
        let estimator = AbilityEstimator::default();
        let pattern = [obs(0.0, true), obs(0.5, false)];
        let theta = 0.3;
        let info: f64 = pattern
            .iter()
            .map(|o| irt::information(theta, &o.params, 1.0))
            .sum();
        let se = estimator.standard_error(theta, &pattern, 1.0).unwrap();
        assert!((se - 1.0 / info.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn non_convergence_falls_back_to_bisection() {
        let settings = EstimatorSettings {
            max_iterations: 1,
            tolerance: 1e-12,
            ..EstimatorSettings::default()
        };
        let estimator = AbilityEstimator::new(settings);
        let pattern = [obs(-1.0, true), obs(1.5, false)];
        let update = estimator.update(estimator.prior(), &pattern, 1.0);
        assert!(update.instability.is_some());
        assert_eq!(update.estimate.theta, 0.75);
    }

    #[test]
    fn eap_shrinks_toward_prior() {
        let estimator = AbilityEstimator::new(EstimatorSettings {
            method: EstimationMethod::Eap,
            ..EstimatorSettings::default()
        });
        let pattern = [obs(-1.0, true), obs(0.0, true), obs(1.0, true)];
        let update = estimator.update(estimator.prior(), &pattern, 1.0);
        let theta = update.estimate.theta;
        assert!(theta > 0.0 && theta < 4.0, "theta {theta}");
        assert!(update.instability.is_none());
    }

    #[test]
    fn settings_validation() {
        assert!(EstimatorSettings::default().validate().is_ok());
        let bad = EstimatorSettings {
            theta_min: 2.0,
            theta_max: -2.0,
            ..EstimatorSettings::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidEstimator(_))));
        let bad = EstimatorSettings {
            initial_standard_error: 0.0,
            ..EstimatorSettings::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn method_parse() {
        assert_eq!("EAP".parse::<EstimationMethod>().unwrap(), EstimationMethod::Eap);
        assert!("map".parse::<EstimationMethod>().is_err());
    }
}
