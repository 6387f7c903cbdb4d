//! Engine error types.
//!
//! Every failure is scoped to a single session or a single bank load and is
//! handed back to the caller as a typed value. Bank exhaustion and estimator
//! non-convergence are not errors: the former is a normal `next_item` result,
//! the latter a diagnostic recorded on the session.

use thiserror::Error;

use crate::model::ItemId;
use crate::session::{SessionId, SessionStatus};

/// Errors returned by the session-level engine API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The session configuration was rejected; no session was created.
    #[error("invalid session configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// No session with this id is known to the engine.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The operation needs a session in another state.
    #[error("session {session_id} is {status}")]
    InvalidSessionState {
        session_id: SessionId,
        status: SessionStatus,
    },

    /// A report was requested before the session was finalized.
    #[error("session {0} has not completed, no report available")]
    SessionNotComplete(SessionId),

    /// A response arrived for an item that is not the pending one.
    #[error("unexpected response for item {received} (pending: {})", pending_label(.expected))]
    UnexpectedResponse {
        expected: Option<ItemId>,
        received: ItemId,
    },
}

fn pending_label(expected: &Option<ItemId>) -> String {
    expected
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Rejection rules for session configuration and engine settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("min_items must be at least 1, got {0}")]
    MinItemsTooSmall(usize),

    #[error("min_items ({min}) exceeds max_items ({max})")]
    MinExceedsMax { min: usize, max: usize },

    #[error("se_target must be a positive finite number, got {0}")]
    InvalidSeTarget(f64),

    #[error("time_limit_ms must be greater than zero")]
    ZeroTimeLimit,

    #[error("domain target for '{0}' must be at least 1")]
    ZeroDomainTarget(String),

    #[error("domain target names '{0}', which the item bank does not contain")]
    UnknownDomain(String),

    #[error("domain target for '{domain}' is {target} but the bank holds {available} item(s)")]
    DomainTargetExceedsBank {
        domain: String,
        target: usize,
        available: usize,
    },

    #[error("domain targets sum to {total}, above max_items ({max_items})")]
    DomainTargetsExceedMax { total: usize, max_items: usize },

    #[error("invalid score scale: {0}")]
    InvalidScale(String),

    #[error("invalid estimator settings: {0}")]
    InvalidEstimator(String),

    #[error("invalid selector settings: {0}")]
    InvalidSelector(String),
}

/// Load-time rejections of a calibrated item bank.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BankError {
    #[error("item bank contains no items")]
    Empty,

    #[error("duplicate item id: {0}")]
    DuplicateId(ItemId),

    #[error("item {id}: {reason}")]
    InvalidItem { id: ItemId, reason: String },

    #[error("item {id}: malformed answer key: {reason}")]
    MalformedAnswerKey { id: ItemId, reason: String },

    #[error("unknown calibration metric: {0}")]
    UnknownMetric(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_response_message_names_pending_item() {
        let err = EngineError::UnexpectedResponse {
            expected: Some(ItemId::from("alg-002")),
            received: ItemId::from("alg-001"),
        };
        assert_eq!(
            err.to_string(),
            "unexpected response for item alg-001 (pending: alg-002)"
        );

        let err = EngineError::UnexpectedResponse {
            expected: None,
            received: ItemId::from("alg-001"),
        };
        assert!(err.to_string().ends_with("(pending: none)"));
    }

    #[test]
    fn config_error_converts_into_engine_error() {
        let err: EngineError = ConfigError::ZeroTimeLimit.into();
        assert!(matches!(
            err,
            EngineError::Configuration(ConfigError::ZeroTimeLimit)
        ));
    }
}
