//! The final score report and its JSON persistence.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::PlacementLevel;
use crate::session::{Diagnostic, SessionId, SessionStatus};
use crate::stopping::StopReason;

/// Immutable result of a completed session.
///
/// Field names and types are the serialization contract consumers build on;
/// maps are ordered so the JSON form is byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub raw_theta: f64,
    pub standard_error: f64,
    pub scaled_score: i32,
    /// Normal-model percentile of `raw_theta`, in `[1, 99]`.
    pub percentile: u8,
    pub placement_level: PlacementLevel,
    /// Every bank domain; `None` where no item of the domain was answered.
    pub domain_breakdown: BTreeMap<String, Option<DomainScore>>,
    pub item_count: usize,
    pub elapsed_time_ms: u64,
    pub completed_at: DateTime<Utc>,
    pub stop_reason: StopReason,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainScore {
    pub items_administered: usize,
    pub correct: usize,
    pub proportion_correct: f64,
}

impl ScoreReport {
    /// Save the report as pretty-printed JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("failed to serialize score report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write score report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read score report from {}", path.display()))?;
        let report: ScoreReport =
            serde_json::from_str(&content).context("failed to parse score report JSON")?;
        Ok(report)
    }
}
