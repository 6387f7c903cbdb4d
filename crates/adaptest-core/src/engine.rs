//! Session manager: the engine's external API.
//!
//! The session map is only held long enough to look up (or insert) a
//! session's `Arc<Mutex<_>>`; all work on a session happens under that
//! session's own lock, so calls for different sessions never wait on each
//! other. The item bank sits behind its own lock as an `Arc` that is swapped
//! on reload. Each session pins the bank it started on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::bank::ItemBank;
use crate::config::EngineSettings;
use crate::error::{ConfigError, EngineError};
use crate::estimator::{AbilityEstimator, Observation};
use crate::model::{Item, ItemId};
use crate::report::ScoreReport;
use crate::scoring::ScoreTransformer;
use crate::selector::{ItemSelector, Selection, SelectionContext};
use crate::session::{
    AdaptationSignal, Diagnostic, DiagnosticKind, ResponseRecord, Session, SessionConfig,
    SessionId, SessionSnapshot, SessionStatus,
};
use crate::stopping::{self, StopReason};
use crate::traits::{Clock, SystemClock};

/// Upper bound on the idle TTL, well inside what `chrono::Duration` holds.
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Result of asking for the next item.
#[derive(Debug, Clone, PartialEq)]
pub enum NextItem {
    /// The item to administer. Asking again before answering returns the
    /// same item.
    Item(Arc<Item>),
    /// The session stopped instead of issuing an item.
    SessionComplete { reason: StopReason },
}

/// What a recorded response changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOutcome {
    pub item_id: ItemId,
    pub correct: bool,
    pub new_theta: f64,
    #[serde(rename = "newSE")]
    pub new_se: f64,
    pub stopped: bool,
    pub stop_reason: Option<StopReason>,
    pub adaptation: AdaptationSignal,
    /// Set when the estimator had to fall back on this response.
    pub diagnostic: Option<Diagnostic>,
}

/// The adaptive assessment engine.
pub struct AssessmentEngine {
    bank: RwLock<Arc<ItemBank>>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    estimator: AbilityEstimator,
    selector: ItemSelector,
    transformer: ScoreTransformer,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    seeds: Mutex<ChaCha8Rng>,
}

impl AssessmentEngine {
    /// Build an engine over `bank`, rejecting invalid settings.
    pub fn new(
        bank: impl Into<Arc<ItemBank>>,
        settings: EngineSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let seed = settings.selector.seed.unwrap_or_else(rand::random);
        Ok(Self {
            bank: RwLock::new(bank.into()),
            sessions: RwLock::new(HashMap::new()),
            estimator: AbilityEstimator::new(settings.estimator.clone()),
            selector: ItemSelector::new(settings.selector.clone()),
            transformer: ScoreTransformer::new(settings.scale),
            settings,
            clock: Arc::new(SystemClock),
            seeds: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The bank new sessions start on.
    pub fn current_bank(&self) -> Arc<ItemBank> {
        Arc::clone(&self.bank.read())
    }

    /// Atomically swap the item bank. Sessions already running keep the
    /// bank they started with.
    pub fn reload_bank(&self, bank: impl Into<Arc<ItemBank>>) {
        let bank = bank.into();
        tracing::info!(bank = bank.id(), items = bank.len(), "item bank reloaded");
        *self.bank.write() = bank;
    }

    /// Validate `config` against the current bank and open a session.
    pub fn start_session(&self, config: SessionConfig) -> Result<SessionId, EngineError> {
        let bank = self.current_bank();
        config.validate(&bank)?;

        let rng = ChaCha8Rng::seed_from_u64(self.seeds.lock().gen());
        let session = Session::new(config, bank, self.estimator.prior(), self.clock.now(), rng);
        let id = session.id();
        tracing::info!(session = %id, bank = session.bank().id(), "session started");

        self.sessions.write().insert(id, Arc::new(Mutex::new(session)));
        Ok(id)
    }

    fn session(&self, id: SessionId) -> Result<Arc<Mutex<Session>>, EngineError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(id))
    }

    /// Issue the next item, or report that the session has stopped.
    pub fn next_item(&self, id: SessionId) -> Result<NextItem, EngineError> {
        let handle = self.session(id)?;
        let mut guard = handle.lock();
        let session = &mut *guard;
        ensure_active(session)?;

        if let Some(pending) = &session.pending {
            if let Some(item) = session.bank.get(pending) {
                return Ok(NextItem::Item(Arc::clone(item)));
            }
        }

        let now = self.clock.now();
        if let Some(reason) = stopping::evaluate(&session.config, &session.progress(now)) {
            self.complete(session, reason, now);
            return Ok(NextItem::SessionComplete { reason });
        }

        let ctx = SelectionContext {
            theta: session.estimate.theta,
            first_item: session.responses.is_empty(),
            administered: &session.administered_set,
            domain_counts: &session.domain_counts,
            domain_targets: &session.config.domain_targets,
        };
        let selection = self.selector.select_next(&session.bank, &ctx, &mut session.rng);

        match selection {
            Selection::Item { position, .. } => {
                let item = Arc::clone(&session.bank.items()[position]);
                session.bank.record_exposure(position);
                session.administered.push(item.id().clone());
                session.administered_set.insert(item.id().clone());
                *session
                    .domain_counts
                    .entry(item.domain().to_string())
                    .or_default() += 1;
                session.pending = Some(item.id().clone());
                session.last_activity = now;
                Ok(NextItem::Item(item))
            }
            Selection::NoItemAvailable => {
                self.complete(session, StopReason::BankExhausted, now);
                Ok(NextItem::SessionComplete {
                    reason: StopReason::BankExhausted,
                })
            }
        }
    }

    /// Record the examinee's raw answer to the pending item.
    pub fn submit_response(
        &self,
        id: SessionId,
        item_id: &ItemId,
        answer: &str,
        response_time_ms: u64,
    ) -> Result<ResponseOutcome, EngineError> {
        self.record(id, item_id, response_time_ms, |item| item.is_correct(answer))
    }

    /// Record an externally scored response to the pending item.
    pub fn submit_outcome(
        &self,
        id: SessionId,
        item_id: &ItemId,
        correct: bool,
        response_time_ms: u64,
    ) -> Result<ResponseOutcome, EngineError> {
        self.record(id, item_id, response_time_ms, |_| correct)
    }

    fn record<F>(
        &self,
        id: SessionId,
        item_id: &ItemId,
        response_time_ms: u64,
        score: F,
    ) -> Result<ResponseOutcome, EngineError>
    where
        F: FnOnce(&Item) -> bool,
    {
        let handle = self.session(id)?;
        let mut guard = handle.lock();
        let session = &mut *guard;
        ensure_active(session)?;

        let item = match (&session.pending, session.bank.get(item_id)) {
            (Some(pending), Some(item)) if pending == item_id => Arc::clone(item),
            _ => {
                return Err(EngineError::UnexpectedResponse {
                    expected: session.pending.clone(),
                    received: item_id.clone(),
                })
            }
        };

        let now = self.clock.now();
        let correct = score(&item);
        session.pending = None;
        session.last_activity = now;
        session.responses.push(ResponseRecord {
            item_id: item_id.clone(),
            domain: item.domain().to_string(),
            correct,
            response_time_ms,
            timestamp: now,
        });
        session.observations.push(Observation {
            params: item.params(),
            correct,
        });

        let update = self
            .estimator
            .update(session.estimate, &session.observations, session.bank.scaling());
        let diagnostic = update.instability.map(|message| {
            tracing::warn!(session = %id, item = %item_id, "{message}, fell back to bisection");
            Diagnostic {
                kind: DiagnosticKind::NumericInstability,
                item_id: item_id.clone(),
                message,
                timestamp: now,
            }
        });
        if let Some(d) = &diagnostic {
            session.diagnostics.push(d.clone());
        }
        session.estimate = update.estimate;
        session.theta_history.push(update.estimate.theta);
        tracing::debug!(
            session = %id,
            item = %item_id,
            correct,
            theta = update.estimate.theta,
            se = update.estimate.standard_error,
            "response recorded"
        );

        let stop_reason = stopping::evaluate(&session.config, &session.progress(now));
        if let Some(reason) = stop_reason {
            self.complete(session, reason, now);
        }

        Ok(ResponseOutcome {
            item_id: item_id.clone(),
            correct,
            new_theta: session.estimate.theta,
            new_se: session.estimate.standard_error,
            stopped: stop_reason.is_some(),
            stop_reason,
            adaptation: session.adaptation_signal(),
            diagnostic,
        })
    }

    fn complete(&self, session: &mut Session, reason: StopReason, now: DateTime<Utc>) {
        session.status = SessionStatus::Completed;
        session.pending = None;
        session.completed_at = Some(now);
        session.stop_reason = Some(reason);
        session.last_activity = now;
        let report = self.transformer.finalize(session, reason, now);
        tracing::info!(
            session = %session.id,
            reason = %reason,
            items = report.item_count,
            theta = report.raw_theta,
            score = report.scaled_score,
            "session completed"
        );
        session.report = Some(report);
    }

    /// The report of a completed session. Repeated calls return the same value.
    pub fn get_report(&self, id: SessionId) -> Result<ScoreReport, EngineError> {
        let handle = self.session(id)?;
        let session = handle.lock();
        match (&session.status, &session.report) {
            (SessionStatus::Completed, Some(report)) => Ok(report.clone()),
            _ => Err(EngineError::SessionNotComplete(id)),
        }
    }

    /// Abandon an active session. Abandoning twice is a no-op; a completed
    /// session cannot be abandoned.
    pub fn abandon(&self, id: SessionId) -> Result<(), EngineError> {
        let handle = self.session(id)?;
        let mut session = handle.lock();
        match session.status {
            SessionStatus::Active => {
                session.status = SessionStatus::Abandoned;
                session.pending = None;
                session.last_activity = self.clock.now();
                tracing::info!(session = %id, items = session.responses.len(), "session abandoned");
                Ok(())
            }
            SessionStatus::Abandoned => Ok(()),
            SessionStatus::Completed => Err(EngineError::InvalidSessionState {
                session_id: id,
                status: SessionStatus::Completed,
            }),
        }
    }

    /// Abandon every active session idle for longer than the configured TTL.
    /// Returns the ids of the sessions that were expired.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let ttl = Duration::seconds(self.settings.session_ttl_secs.min(MAX_TTL_SECS) as i64);
        let handles: Vec<(SessionId, Arc<Mutex<Session>>)> = self
            .sessions
            .read()
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect();

        let mut expired = Vec::new();
        for (id, handle) in handles {
            let mut session = handle.lock();
            if session.status == SessionStatus::Active && now - session.last_activity > ttl {
                session.status = SessionStatus::Abandoned;
                session.pending = None;
                tracing::info!(session = %id, "idle session expired");
                expired.push(id);
            }
        }
        expired.sort();
        expired
    }

    /// Remove a finished session from memory and hand back its final state.
    pub fn archive(&self, id: SessionId) -> Result<SessionSnapshot, EngineError> {
        let mut sessions = self.sessions.write();
        let handle = sessions.get(&id).ok_or(EngineError::SessionNotFound(id))?;
        let snapshot = {
            let session = handle.lock();
            if !session.status.is_terminal() {
                return Err(EngineError::InvalidSessionState {
                    session_id: id,
                    status: session.status,
                });
            }
            session.snapshot()
        };
        sessions.remove(&id);
        Ok(snapshot)
    }

    /// A read-only copy of a session's state.
    pub fn snapshot(&self, id: SessionId) -> Result<SessionSnapshot, EngineError> {
        let handle = self.session(id)?;
        let session = handle.lock();
        Ok(session.snapshot())
    }

    /// Number of sessions held in memory, in any state.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Number of sessions still active.
    pub fn active_sessions(&self) -> usize {
        let handles: Vec<Arc<Mutex<Session>>> = self.sessions.read().values().cloned().collect();
        handles
            .iter()
            .filter(|s| s.lock().status == SessionStatus::Active)
            .count()
    }
}

fn ensure_active(session: &Session) -> Result<(), EngineError> {
    if session.status == SessionStatus::Active {
        Ok(())
    } else {
        Err(EngineError::InvalidSessionState {
            session_id: session.id,
            status: session.status,
        })
    }
}
