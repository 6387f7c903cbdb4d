//! Monte-Carlo simulation of examinees answering under the 3PL model.
//!
//! Used to check ability recovery of a bank/settings combination: every
//! simulated examinee has a known true theta, answers items with the model
//! probability, and the final estimate is compared with the truth.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::engine::{AssessmentEngine, NextItem};
use crate::error::EngineError;
use crate::irt;
use crate::model::Item;
use crate::report::ScoreReport;
use crate::session::{SessionConfig, SessionId};
use crate::statistics::{summarize, SimulationSummary};
use crate::stopping::StopReason;
use crate::traits::ProgressReporter;

/// Simulated response latency bounds, in milliseconds.
const MIN_RESPONSE_MS: u64 = 5_000;
const MAX_RESPONSE_MS: u64 = 35_000;

/// Something that can answer an item.
pub trait ResponseModel: Send + Sync {
    fn respond(&self, item: &Item, scaling: f64, rng: &mut dyn RngCore) -> bool;
}

/// An examinee whose answers follow the 3PL model at a fixed true ability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedExaminee {
    pub true_theta: f64,
}

impl SimulatedExaminee {
    pub fn new(true_theta: f64) -> Self {
        Self { true_theta }
    }
}

impl ResponseModel for SimulatedExaminee {
    fn respond(&self, item: &Item, scaling: f64, rng: &mut dyn RngCore) -> bool {
        let p = irt::probability(self.true_theta, &item.params(), scaling);
        rng.gen::<f64>() < p
    }
}

/// Outcome of one simulated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub session_id: SessionId,
    pub true_theta: f64,
    pub estimated_theta: f64,
    pub standard_error: f64,
    pub items_administered: usize,
    pub scaled_score: i32,
    pub stop_reason: StopReason,
    pub numeric_instabilities: usize,
}

/// Drive one session to completion with `examinee` answering, then archive it.
///
/// A session that fails midway is abandoned and archived before the error
/// is returned, so no failed session stays in the engine.
pub fn simulate_session<M, R>(
    engine: &AssessmentEngine,
    examinee: &M,
    true_theta: f64,
    config: SessionConfig,
    rng: &mut R,
) -> Result<SimulationRecord, EngineError>
where
    M: ResponseModel + ?Sized,
    R: RngCore,
{
    let scaling = engine.current_bank().scaling();
    let id = engine.start_session(config)?;

    let report = match run_to_completion(engine, id, examinee, scaling, rng) {
        Ok(report) => report,
        Err(e) => {
            // Abandon fails on completed sessions; archive either way.
            let _ = engine.abandon(id);
            if let Err(cleanup) = engine.archive(id) {
                tracing::warn!(session = %id, "failed to discard simulated session: {cleanup}");
            }
            return Err(e);
        }
    };
    engine.archive(id)?;
    Ok(SimulationRecord {
        session_id: id,
        true_theta,
        estimated_theta: report.raw_theta,
        standard_error: report.standard_error,
        items_administered: report.item_count,
        scaled_score: report.scaled_score,
        stop_reason: report.stop_reason,
        numeric_instabilities: report.diagnostics.len(),
    })
}

fn run_to_completion<M, R>(
    engine: &AssessmentEngine,
    id: SessionId,
    examinee: &M,
    scaling: f64,
    rng: &mut R,
) -> Result<ScoreReport, EngineError>
where
    M: ResponseModel + ?Sized,
    R: RngCore,
{
    loop {
        match engine.next_item(id)? {
            NextItem::Item(item) => {
                let correct = examinee.respond(&item, scaling, rng);
                let latency = rng.gen_range(MIN_RESPONSE_MS..=MAX_RESPONSE_MS);
                let outcome = engine.submit_outcome(id, item.id(), correct, latency)?;
                if outcome.stopped {
                    break;
                }
            }
            NextItem::SessionComplete { .. } => break,
        }
    }
    engine.get_report(id)
}

/// Parameters of a simulation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPlan {
    pub sessions: usize,
    /// True abilities are drawn uniformly from `[theta_min, theta_max]`.
    pub theta_min: f64,
    pub theta_max: f64,
    pub config: SessionConfig,
    pub seed: u64,
    /// Maximum sessions simulated at once.
    pub parallelism: usize,
    /// Recovery tolerance reported in the summary.
    pub tolerance: f64,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            sessions: 1000,
            theta_min: -2.5,
            theta_max: 2.5,
            config: SessionConfig::default(),
            seed: 42,
            parallelism: 4,
            tolerance: 0.5,
        }
    }
}

/// Full result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub id: Uuid,
    pub bank_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub plan: SimulationPlan,
    pub summary: SimulationSummary,
    /// Sessions that ended in an engine error.
    pub failed: usize,
    /// Per-session records, in plan order.
    pub records: Vec<SimulationRecord>,
}

impl SimulationReport {
    /// Save the report as pretty-printed JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize simulation")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write simulation to {}", path.display()))?;
        Ok(())
    }
}

/// Simulate `plan.sessions` examinees against `engine`.
///
/// True abilities and per-session response seeds are drawn up front from
/// `plan.seed`, so the examinee population is reproducible. Sessions run on
/// the blocking pool, at most `plan.parallelism` at a time.
pub async fn run_batch(
    engine: Arc<AssessmentEngine>,
    plan: &SimulationPlan,
    progress: &dyn ProgressReporter,
) -> Result<SimulationReport> {
    if plan.theta_min.is_nan() || plan.theta_max.is_nan() || plan.theta_min > plan.theta_max {
        anyhow::bail!(
            "invalid true theta range [{}, {}]",
            plan.theta_min,
            plan.theta_max
        );
    }

    let start = Instant::now();
    let started_at = Utc::now();
    let bank_id = engine.current_bank().id().to_string();
    let semaphore = Arc::new(Semaphore::new(plan.parallelism.max(1)));
    let mut population = ChaCha8Rng::seed_from_u64(plan.seed);

    let mut futures = FuturesUnordered::new();
    for index in 0..plan.sessions {
        let true_theta = population.gen_range(plan.theta_min..=plan.theta_max);
        let session_seed: u64 = population.gen();
        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        let config = plan.config.clone();

        futures.push(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
            progress.on_session_start(index, true_theta);
            let record = tokio::task::spawn_blocking(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(session_seed);
                let examinee = SimulatedExaminee::new(true_theta);
                simulate_session(&engine, &examinee, true_theta, config, &mut rng)
            })
            .await
            .context("simulation task panicked")??;
            Ok::<_, anyhow::Error>((index, record))
        });
    }

    let mut records = Vec::with_capacity(plan.sessions);
    let mut failed = 0;
    while let Some(result) = futures.next().await {
        match result {
            Ok((index, record)) => {
                progress.on_session_complete(index, &record);
                records.push((index, record));
            }
            Err(e) => {
                failed += 1;
                tracing::error!("simulated session failed: {e:#}");
            }
        }
    }
    records.sort_by_key(|(index, _)| *index);
    let records: Vec<SimulationRecord> = records.into_iter().map(|(_, r)| r).collect();
    progress.on_batch_complete(records.len());

    Ok(SimulationReport {
        id: Uuid::new_v4(),
        bank_id,
        started_at,
        duration_ms: start.elapsed().as_millis() as u64,
        plan: plan.clone(),
        summary: summarize(&records, plan.tolerance),
        failed,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::ItemBank;
    use crate::config::EngineSettings;
    use crate::irt::Metric;
    use crate::model::{ItemContent, ItemParams};
    use crate::traits::NoopReporter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> AssessmentEngine {
        let items = (0..40)
            .map(|i| {
                Item::new(
                    format!("s{i}"),
                    if i % 2 == 0 { "verbal" } else { "numeric" },
                    ItemParams::new(1.5, -3.0 + 6.0 * i as f64 / 39.0, 0.1),
                    ItemContent::default(),
                    "a",
                )
                .unwrap()
            })
            .collect();
        let bank = ItemBank::new("sim", "Sim", Metric::NormalOgive, items).unwrap();
        let mut settings = EngineSettings::default();
        settings.selector.seed = Some(3);
        AssessmentEngine::new(bank, settings).unwrap()
    }

    #[test]
    fn examinee_follows_model_extremes() {
        let item = Item::new(
            "x",
            "d",
            ItemParams::new(2.0, 0.0, 0.0),
            ItemContent::default(),
            "a",
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let strong = SimulatedExaminee::new(10.0);
        let weak = SimulatedExaminee::new(-10.0);
        assert!((0..100).all(|_| strong.respond(&item, 1.702, &mut rng)));
        assert!((0..100).all(|_| !weak.respond(&item, 1.702, &mut rng)));
    }

    #[test]
    fn single_session_runs_to_completion() {
        let engine = engine();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let config = SessionConfig {
            min_items: 5,
            max_items: 15,
            ..SessionConfig::default()
        };
        let record =
            simulate_session(&engine, &SimulatedExaminee::new(0.5), 0.5, config, &mut rng)
                .unwrap();
        assert!(record.items_administered >= 5 && record.items_administered <= 15);
        assert!(record.estimated_theta.is_finite());
        assert_eq!(engine.session_count(), 0);
    }

    #[tokio::test]
    async fn batch_is_summarized_in_plan_order() {
        let engine = Arc::new(engine());
        let plan = SimulationPlan {
            sessions: 12,
            config: SessionConfig {
                min_items: 3,
                max_items: 10,
                ..SessionConfig::default()
            },
            parallelism: 3,
            ..SimulationPlan::default()
        };
        let report = run_batch(Arc::clone(&engine), &plan, &NoopReporter)
            .await
            .unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.records.len(), 12);
        assert_eq!(report.summary.sessions, 12);
        assert!(report.summary.mean_items <= 10.0);

        let again = run_batch(engine, &plan, &NoopReporter).await.unwrap();
        let truths: Vec<f64> = report.records.iter().map(|r| r.true_theta).collect();
        let again_truths: Vec<f64> = again.records.iter().map(|r| r.true_theta).collect();
        assert_eq!(truths, again_truths);
    }

    /// Expires every session the first time it is asked to answer.
    struct ExpiringExaminee<'a> {
        engine: &'a AssessmentEngine,
    }

    impl ResponseModel for ExpiringExaminee<'_> {
        fn respond(&self, _item: &Item, _scaling: f64, _rng: &mut dyn RngCore) -> bool {
            self.engine.expire_idle(Utc::now() + chrono::Duration::days(1));
            true
        }
    }

    #[test]
    fn failed_session_is_not_left_behind() {
        let engine = engine();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let examinee = ExpiringExaminee { engine: &engine };
        let err = simulate_session(&engine, &examinee, 0.0, SessionConfig::default(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSessionState { .. }));
        assert_eq!(engine.session_count(), 0);
    }

    #[derive(Default)]
    struct InFlight {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ProgressReporter for InFlight {
        fn on_session_start(&self, _index: usize, _true_theta: f64) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }
        fn on_session_complete(&self, _index: usize, _record: &SimulationRecord) {
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
        fn on_batch_complete(&self, _completed: usize) {}
    }

    #[tokio::test]
    async fn sessions_are_reported_started_when_they_run() {
        let plan = SimulationPlan {
            sessions: 10,
            config: SessionConfig {
                min_items: 2,
                max_items: 4,
                ..SessionConfig::default()
            },
            parallelism: 2,
            ..SimulationPlan::default()
        };
        let reporter = InFlight::default();
        let report = run_batch(Arc::new(engine()), &plan, &reporter)
            .await
            .unwrap();
        assert_eq!(report.records.len(), 10);
        assert!(reporter.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(reporter.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_inverted_theta_range() {
        let plan = SimulationPlan {
            theta_min: 1.0,
            theta_max: -1.0,
            ..SimulationPlan::default()
        };
        assert!(run_batch(Arc::new(engine()), &plan, &NoopReporter)
            .await
            .is_err());
    }
}
