//! Stopping rules evaluated after every response.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::SessionConfig;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The standard error reached its target after the minimum item count.
    PrecisionReached,
    /// The hard item ceiling was hit.
    MaxItems,
    /// No unadministered item is left in the bank.
    BankExhausted,
    /// The wall-clock limit elapsed.
    TimeLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::PrecisionReached => write!(f, "precision_reached"),
            StopReason::MaxItems => write!(f, "max_items"),
            StopReason::BankExhausted => write!(f, "bank_exhausted"),
            StopReason::TimeLimit => write!(f, "time_limit"),
        }
    }
}

/// The slice of session state the stopping rules look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Items administered so far.
    pub administered: usize,
    pub standard_error: f64,
    pub elapsed_ms: u64,
    /// Unadministered items left in the session's bank.
    pub remaining_items: usize,
    /// Every domain target of the session has been reached.
    pub targets_met: bool,
}

/// First rule that fires, checked in the order precision, item ceiling,
/// bank exhaustion, time limit. Precision only counts once the domain
/// targets are met.
pub fn evaluate(config: &SessionConfig, progress: &Progress) -> Option<StopReason> {
    if progress.targets_met
        && progress.administered >= config.min_items
        && progress.standard_error <= config.se_target
    {
        return Some(StopReason::PrecisionReached);
    }
    if progress.administered >= config.max_items {
        return Some(StopReason::MaxItems);
    }
    if progress.remaining_items == 0 {
        return Some(StopReason::BankExhausted);
    }
    if progress.elapsed_ms > config.time_limit_ms {
        return Some(StopReason::TimeLimit);
    }
    None
}

pub fn should_stop(config: &SessionConfig, progress: &Progress) -> bool {
    evaluate(config, progress).is_some()
}
