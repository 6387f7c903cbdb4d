//! The `adaptest simulate` command.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use adaptest_core::config::load_settings_from;
use adaptest_core::engine::AssessmentEngine;
use adaptest_core::parser;
use adaptest_core::simulation::{run_batch, SimulationPlan, SimulationRecord, SimulationReport};
use adaptest_core::traits::ProgressReporter;

/// Progress is printed after this many finished sessions.
const PROGRESS_EVERY: usize = 100;

pub struct SimulateArgs {
    pub bank: PathBuf,
    pub sessions: usize,
    pub seed: u64,
    pub parallelism: usize,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub se_target: Option<f64>,
    pub theta_min: f64,
    pub theta_max: f64,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Console progress reporter.
struct ConsoleReporter {
    total: usize,
    done: AtomicUsize,
}

impl ProgressReporter for ConsoleReporter {
    fn on_session_start(&self, _index: usize, _true_theta: f64) {}

    fn on_session_complete(&self, _index: usize, _record: &SimulationRecord) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % PROGRESS_EVERY == 0 {
            eprintln!("  {done}/{} sessions", self.total);
        }
    }

    fn on_batch_complete(&self, completed: usize) {
        eprintln!("Complete: {completed}/{} sessions", self.total);
    }
}

pub async fn execute(args: SimulateArgs) -> Result<()> {
    anyhow::ensure!(args.sessions >= 1, "sessions must be at least 1");
    anyhow::ensure!(args.parallelism >= 1, "parallelism must be at least 1");
    anyhow::ensure!(
        args.theta_min <= args.theta_max,
        "theta-min must not exceed theta-max"
    );

    let mut settings = load_settings_from(args.config.as_deref())?;
    settings.selector.seed.get_or_insert(args.seed);

    let bank = parser::parse_item_bank(&args.bank)?;

    let mut config = settings.defaults.clone();
    if let Some(min) = args.min_items {
        config.min_items = min;
    }
    if let Some(max) = args.max_items {
        config.max_items = max;
    }
    if let Some(se) = args.se_target {
        config.se_target = se;
    }
    config
        .validate(&bank)
        .context("invalid session configuration")?;

    eprintln!(
        "adaptest v{} - Simulating {} sessions on {} ({} items)",
        env!("CARGO_PKG_VERSION"),
        args.sessions,
        bank.name(),
        bank.len()
    );

    let engine = Arc::new(AssessmentEngine::new(bank, settings)?);
    let plan = SimulationPlan {
        sessions: args.sessions,
        theta_min: args.theta_min,
        theta_max: args.theta_max,
        config,
        seed: args.seed,
        parallelism: args.parallelism,
        ..SimulationPlan::default()
    };
    let reporter = ConsoleReporter {
        total: plan.sessions,
        done: AtomicUsize::new(0),
    };

    let report = run_batch(engine, &plan, &reporter).await?;
    print_summary(&report);

    if let Some(path) = &args.output {
        report.save_json(path)?;
        eprintln!("Results saved to: {}", path.display());
    }

    anyhow::ensure!(
        report.failed == 0,
        "{} simulated session(s) failed",
        report.failed
    );
    Ok(())
}

fn print_summary(report: &SimulationReport) {
    use comfy_table::{Cell, Table};

    let summary = &report.summary;
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    let rows = [
        ("Sessions", summary.sessions.to_string()),
        ("Mean items", format!("{:.1}", summary.mean_items)),
        ("Mean SE", format!("{:.3}", summary.mean_standard_error)),
        ("Bias", format!("{:+.3}", summary.bias)),
        ("MAE", format!("{:.3}", summary.mean_absolute_error)),
        ("RMSE", format!("{:.3}", summary.root_mean_square_error)),
        (
            "Within tolerance",
            format!(
                "{:.1}% (|error| <= {})",
                summary.within_tolerance_rate * 100.0,
                summary.tolerance
            ),
        ),
        ("Duration", format!("{}ms", report.duration_ms)),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    println!("{table}");

    let mut reasons: BTreeMap<String, usize> = BTreeMap::new();
    for record in &report.records {
        *reasons.entry(record.stop_reason.to_string()).or_default() += 1;
    }
    let mut reason_table = Table::new();
    reason_table.set_header(vec!["Stop reason", "Sessions"]);
    for (reason, count) in reasons {
        reason_table.add_row(vec![Cell::new(reason), Cell::new(count)]);
    }
    println!("{reason_table}");
}
