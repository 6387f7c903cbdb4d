//! Per-examinee session state.
//!
//! A `Session` is only ever touched through the engine, under its own lock.
//! Every field the rest of the crate reads has a getter; mutation is
//! `pub(crate)` and happens in `engine.rs`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::ItemBank;
use crate::error::ConfigError;
use crate::estimator::{AbilityEstimate, Observation};
use crate::model::ItemId;
use crate::report::ScoreReport;
use crate::stopping::{Progress, StopReason};

/// Number of most recent responses the adaptation signal looks at.
const ADAPTATION_WINDOW: usize = 3;

/// Standard error above which the signal asks for more evidence.
const EVIDENCE_SE_THRESHOLD: f64 = 1.0;

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state. `Completed` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Stopping thresholds and content targets accepted at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub min_items: usize,
    pub max_items: usize,
    pub se_target: f64,
    pub time_limit_ms: u64,
    /// Target item count per domain. Empty means no content balancing
    /// beyond spreading items across domains.
    pub domain_targets: BTreeMap<String, usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_items: 5,
            max_items: 30,
            se_target: 0.3,
            time_limit_ms: 60 * 60 * 1000,
            domain_targets: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Check the documented rejection rules against the bank the session
    /// will run on.
    pub fn validate(&self, bank: &ItemBank) -> Result<(), ConfigError> {
        if self.min_items < 1 {
            return Err(ConfigError::MinItemsTooSmall(self.min_items));
        }
        if self.min_items > self.max_items {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_items,
                max: self.max_items,
            });
        }
        if !self.se_target.is_finite() || self.se_target <= 0.0 {
            return Err(ConfigError::InvalidSeTarget(self.se_target));
        }
        if self.time_limit_ms == 0 {
            return Err(ConfigError::ZeroTimeLimit);
        }

        let mut total = 0usize;
        for (domain, &target) in &self.domain_targets {
            if target == 0 {
                return Err(ConfigError::ZeroDomainTarget(domain.clone()));
            }
            let available = bank.domain_size(domain);
            if available == 0 {
                return Err(ConfigError::UnknownDomain(domain.clone()));
            }
            if target > available {
                return Err(ConfigError::DomainTargetExceedsBank {
                    domain: domain.clone(),
                    target,
                    available,
                });
            }
            total += target;
        }
        if total > self.max_items {
            return Err(ConfigError::DomainTargetsExceedMax {
                total,
                max_items: self.max_items,
            });
        }
        Ok(())
    }
}

/// One recorded response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub item_id: ItemId,
    pub domain: String,
    pub correct: bool,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    NumericInstability,
}

/// A non-fatal event recorded on the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub item_id: ItemId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Hint to the caller about where the recent responses are pointing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationSignal {
    IncreaseDifficulty,
    DecreaseDifficulty,
    GatherMoreEvidence,
    MaintainLevel,
}

impl fmt::Display for AdaptationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdaptationSignal::IncreaseDifficulty => "increase_difficulty",
            AdaptationSignal::DecreaseDifficulty => "decrease_difficulty",
            AdaptationSignal::GatherMoreEvidence => "gather_more_evidence",
            AdaptationSignal::MaintainLevel => "maintain_level",
        };
        f.write_str(s)
    }
}

/// Signal derived from the last three responses and the current SE.
pub fn adaptation_signal(responses: &[ResponseRecord], standard_error: f64) -> AdaptationSignal {
    if responses.len() >= ADAPTATION_WINDOW {
        let recent = &responses[responses.len() - ADAPTATION_WINDOW..];
        let correct = recent.iter().filter(|r| r.correct).count();
        if correct == ADAPTATION_WINDOW {
            return AdaptationSignal::IncreaseDifficulty;
        }
        if correct == 0 {
            return AdaptationSignal::DecreaseDifficulty;
        }
    }
    if standard_error > EVIDENCE_SE_THRESHOLD {
        AdaptationSignal::GatherMoreEvidence
    } else {
        AdaptationSignal::MaintainLevel
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) bank: Arc<ItemBank>,
    pub(crate) estimate: AbilityEstimate,
    pub(crate) theta_history: Vec<f64>,
    pub(crate) administered: Vec<ItemId>,
    pub(crate) administered_set: HashSet<ItemId>,
    pub(crate) responses: Vec<ResponseRecord>,
    pub(crate) observations: Vec<Observation>,
    pub(crate) domain_counts: BTreeMap<String, usize>,
    pub(crate) status: SessionStatus,
    pub(crate) pending: Option<ItemId>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) last_activity: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) stop_reason: Option<StopReason>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) report: Option<ScoreReport>,
    pub(crate) rng: ChaCha8Rng,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        bank: Arc<ItemBank>,
        prior: AbilityEstimate,
        now: DateTime<Utc>,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            id: SessionId::new(),
            config,
            bank,
            estimate: prior,
            theta_history: vec![prior.theta],
            administered: Vec::new(),
            administered_set: HashSet::new(),
            responses: Vec::new(),
            observations: Vec::new(),
            domain_counts: BTreeMap::new(),
            status: SessionStatus::Active,
            pending: None,
            started_at: now,
            last_activity: now,
            completed_at: None,
            stop_reason: None,
            diagnostics: Vec::new(),
            report: None,
            rng,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bank snapshot this session was started on.
    pub fn bank(&self) -> &Arc<ItemBank> {
        &self.bank
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn theta(&self) -> f64 {
        self.estimate.theta
    }

    pub fn standard_error(&self) -> f64 {
        self.estimate.standard_error
    }

    pub fn estimate(&self) -> AbilityEstimate {
        self.estimate
    }

    /// Theta after each response, starting with the prior.
    pub fn theta_history(&self) -> &[f64] {
        &self.theta_history
    }

    /// Item ids in administration order, including a pending item.
    pub fn administered_items(&self) -> &[ItemId] {
        &self.administered
    }

    pub fn has_administered(&self, id: &ItemId) -> bool {
        self.administered_set.contains(id)
    }

    pub fn responses(&self) -> &[ResponseRecord] {
        &self.responses
    }

    pub fn domain_counts(&self) -> &BTreeMap<String, usize> {
        &self.domain_counts
    }

    pub fn pending_item(&self) -> Option<&ItemId> {
        self.pending.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn report(&self) -> Option<&ScoreReport> {
        self.report.as_ref()
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn remaining_items(&self) -> usize {
        self.bank.len().saturating_sub(self.administered_set.len())
    }

    pub fn progress(&self, now: DateTime<Utc>) -> Progress {
        Progress {
            administered: self.administered.len(),
            standard_error: self.estimate.standard_error,
            elapsed_ms: self.elapsed_ms(now),
            remaining_items: self.remaining_items(),
            targets_met: self.targets_met(),
        }
    }

    /// True when every domain target has at least its target count.
    pub fn targets_met(&self) -> bool {
        self.config
            .domain_targets
            .iter()
            .all(|(domain, &target)| self.domain_counts.get(domain).copied().unwrap_or(0) >= target)
    }

    pub fn adaptation_signal(&self) -> AdaptationSignal {
        adaptation_signal(&self.responses, self.estimate.standard_error)
    }

    /// A detached, serializable copy of the session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            bank_id: self.bank.id().to_string(),
            status: self.status,
            config: self.config.clone(),
            theta: self.estimate.theta,
            standard_error: self.estimate.standard_error,
            theta_history: self.theta_history.clone(),
            administered_items: self.administered.clone(),
            responses: self.responses.clone(),
            domain_counts: self.domain_counts.clone(),
            pending_item: self.pending.clone(),
            started_at: self.started_at,
            last_activity: self.last_activity,
            completed_at: self.completed_at,
            stop_reason: self.stop_reason,
            diagnostics: self.diagnostics.clone(),
            report: self.report.clone(),
        }
    }
}

/// Read-only view of a session, also what `archive` hands back for
/// persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub bank_id: String,
    pub status: SessionStatus,
    pub config: SessionConfig,
    pub theta: f64,
    pub standard_error: f64,
    pub theta_history: Vec<f64>,
    pub administered_items: Vec<ItemId>,
    pub responses: Vec<ResponseRecord>,
    pub domain_counts: BTreeMap<String, usize>,
    pub pending_item: Option<ItemId>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub diagnostics: Vec<Diagnostic>,
    pub report: Option<ScoreReport>,
}
