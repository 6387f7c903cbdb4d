//! Maximum-information item selection with content balancing and
//! exposure control.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bank::ItemBank;
use crate::error::ConfigError;
use crate::irt;
use crate::model::ItemId;

/// Tuning for item selection (`[selector]` in the settings file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorSettings {
    /// Size of the information-ranked shortlist that content balancing
    /// chooses from.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Items within this fraction of the best information count as ties.
    #[serde(default = "default_information_tolerance")]
    pub information_tolerance: f64,
    /// For the first item: distance from the median difficulty (in theta
    /// units) still considered "near the median".
    #[serde(default = "default_start_window")]
    pub start_window: f64,
    /// Seed for randomized tie-breaks. Unset means a fresh seed per engine.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_top_k() -> usize {
    5
}

fn default_information_tolerance() -> f64 {
    0.05
}

fn default_start_window() -> f64 {
    0.5
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            information_tolerance: default_information_tolerance(),
            start_window: default_start_window(),
            seed: None,
        }
    }
}

impl SelectorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidSelector("top_k must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.information_tolerance) {
            return Err(ConfigError::InvalidSelector(format!(
                "information_tolerance must lie in [0, 1), got {}",
                self.information_tolerance
            )));
        }
        if !self.start_window.is_finite() || self.start_window < 0.0 {
            return Err(ConfigError::InvalidSelector(format!(
                "start_window must be non-negative, got {}",
                self.start_window
            )));
        }
        Ok(())
    }
}

/// Outcome of a selection attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Position of the chosen item in the bank and its information at theta.
    Item { position: usize, information: f64 },
    /// Every item has been administered.
    NoItemAvailable,
}

/// Session state the selector needs.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub theta: f64,
    /// True before the first response: pick near the median difficulty.
    pub first_item: bool,
    pub administered: &'a HashSet<ItemId>,
    pub domain_counts: &'a BTreeMap<String, usize>,
    pub domain_targets: &'a BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    position: usize,
    merit: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ItemSelector {
    settings: SelectorSettings,
}

impl ItemSelector {
    pub fn new(settings: SelectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    /// Choose the next item for a session.
    ///
    /// Candidates are the unadministered items, restricted to domains whose
    /// target is not yet met while any target remains open, then to
    /// untargeted domains once every target is met. They are ranked
    /// by information at theta (by closeness to the median difficulty for
    /// the first item); among the top `k`, the most under-represented domain
    /// wins; within that domain the least exposed of the near-best items is
    /// taken, with remaining ties broken at random.
    pub fn select_next<R: Rng + ?Sized>(
        &self,
        bank: &ItemBank,
        ctx: &SelectionContext<'_>,
        rng: &mut R,
    ) -> Selection {
        let unadministered: Vec<usize> = bank
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| !ctx.administered.contains(item.id()))
            .map(|(pos, _)| pos)
            .collect();
        if unadministered.is_empty() {
            return Selection::NoItemAvailable;
        }

        let eligible = self.apply_quotas(bank, ctx, unadministered);
        let scaling = bank.scaling();
        let median = bank.median_difficulty();

        let mut ranked: Vec<Candidate> = eligible
            .into_iter()
            .map(|position| {
                let params = bank.items()[position].params();
                let merit = if ctx.first_item {
                    -(params.difficulty - median).abs()
                } else {
                    irt::information(ctx.theta, &params, scaling)
                };
                Candidate { position, merit }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.merit
                .partial_cmp(&a.merit)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        ranked.truncate(self.settings.top_k);

        let domain = self.neediest_domain(bank, ctx, &ranked);
        let in_domain: Vec<Candidate> = ranked
            .into_iter()
            .filter(|c| bank.items()[c.position].domain() == domain)
            .collect();

        // Ranked order is kept, so the first entry is the best in the domain.
        let Some(best) = in_domain.first().map(|c| c.merit) else {
            return Selection::NoItemAvailable;
        };
        let floor = if ctx.first_item {
            best - self.settings.start_window
        } else {
            best * (1.0 - self.settings.information_tolerance)
        };
        let near_best: Vec<Candidate> = in_domain
            .into_iter()
            .filter(|c| c.merit >= floor)
            .collect();

        let least_exposure = near_best
            .iter()
            .map(|c| bank.exposure(c.position))
            .min()
            .unwrap_or(0);
        let shortlist: Vec<Candidate> = near_best
            .into_iter()
            .filter(|c| bank.exposure(c.position) == least_exposure)
            .collect();

        let Some(chosen) = shortlist.choose(rng) else {
            return Selection::NoItemAvailable;
        };
        let item = &bank.items()[chosen.position];
        let information = irt::information(ctx.theta, &item.params(), scaling);
        debug!(
            item = %item.id(),
            domain,
            information,
            shortlist = shortlist.len(),
            "item selected"
        );
        Selection::Item {
            position: chosen.position,
            information,
        }
    }

    fn apply_quotas(
        &self,
        bank: &ItemBank,
        ctx: &SelectionContext<'_>,
        candidates: Vec<usize>,
    ) -> Vec<usize> {
        if ctx.domain_targets.is_empty() {
            return candidates;
        }
        let open: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&pos| {
                let domain = bank.items()[pos].domain();
                match ctx.domain_targets.get(domain) {
                    Some(&target) => count(ctx.domain_counts, domain) < target,
                    None => false,
                }
            })
            .collect();
        if !open.is_empty() {
            return open;
        }

        // Every target is met. A met target also caps its domain while items
        // from untargeted domains remain.
        let untargeted: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&pos| !ctx.domain_targets.contains_key(bank.items()[pos].domain()))
            .collect();
        if untargeted.is_empty() {
            candidates
        } else {
            untargeted
        }
    }

    /// Domain among the shortlisted candidates with the largest unmet share
    /// of its target, or the fewest items so far for untargeted domains.
    /// Quota filtering leaves either only targeted or only untargeted
    /// candidates, so the two measures are never compared. Earlier (more
    /// informative) candidates win ties.
    fn neediest_domain<'b>(
        &self,
        bank: &'b ItemBank,
        ctx: &SelectionContext<'_>,
        ranked: &[Candidate],
    ) -> &'b str {
        let mut best: Option<(&'b str, f64)> = None;
        for c in ranked {
            let domain = bank.items()[c.position].domain();
            let administered = count(ctx.domain_counts, domain) as f64;
            let priority = match ctx.domain_targets.get(domain) {
                Some(&target) => (target as f64 - administered) / target as f64,
                None => -administered,
            };
            match best {
                Some((_, p)) if p >= priority => {}
                _ => best = Some((domain, priority)),
            }
        }
        best.map(|(d, _)| d).unwrap_or_default()
    }
}

fn count(counts: &BTreeMap<String, usize>, domain: &str) -> usize {
    counts.get(domain).copied().unwrap_or(0)
}
