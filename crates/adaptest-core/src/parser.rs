//! TOML item bank parser.
//!
//! Loads calibrated item banks from TOML files and directories, and checks
//! them for content problems that do not prevent loading.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::bank::ItemBank;
use crate::error::BankError;
use crate::irt::Metric;
use crate::model::{Item, ItemContent, ItemId, ItemParams};

/// Domains with fewer items than this cannot support a typical domain target.
const MIN_ITEMS_PER_DOMAIN: usize = 3;

/// Intermediate TOML structure for parsing item bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    items: Vec<TomlItem>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default = "default_metric")]
    metric: String,
}

fn default_metric() -> String {
    "logistic".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlItem {
    id: String,
    domain: String,
    difficulty: f64,
    discrimination: f64,
    #[serde(default)]
    guessing: f64,
    #[serde(default)]
    stem: String,
    #[serde(default)]
    options: Vec<String>,
    correct_answer: String,
}

/// Parse a single TOML file into an `ItemBank`.
pub fn parse_item_bank(path: &Path) -> Result<ItemBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item bank file: {}", path.display()))?;

    parse_item_bank_str(&content, path)
}

/// Parse a TOML string into an `ItemBank` (useful for testing).
pub fn parse_item_bank_str(content: &str, source_path: &Path) -> Result<ItemBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let metric: Metric = parsed
        .bank
        .metric
        .parse()
        .map_err(BankError::UnknownMetric)
        .with_context(|| format!("invalid bank header in {}", source_path.display()))?;

    let items = parsed
        .items
        .into_iter()
        .map(|i| {
            Item::new(
                i.id,
                i.domain,
                ItemParams::new(i.discrimination, i.difficulty, i.guessing),
                ItemContent {
                    stem: i.stem,
                    options: i.options,
                },
                i.correct_answer,
            )
        })
        .collect::<Result<Vec<_>, BankError>>()
        .with_context(|| format!("rejected item in {}", source_path.display()))?;

    ItemBank::new(parsed.bank.id, parsed.bank.name, metric, items)
        .with_context(|| format!("rejected item bank {}", source_path.display()))
}

/// Recursively load all `.toml` item bank files from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<ItemBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_item_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    banks.sort_by(|a, b| a.id().cmp(b.id()));
    Ok(banks)
}

/// A non-fatal finding from item bank validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<ItemId>,
    /// Warning message.
    pub message: String,
}

/// Validate a loaded bank for content problems.
pub fn validate_item_bank(bank: &ItemBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if bank.domains().len() == 1 {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "bank covers a single domain, content balancing has no effect".into(),
        });
    }

    for (domain, &count) in bank.domains() {
        if count < MIN_ITEMS_PER_DOMAIN {
            warnings.push(ValidationWarning {
                item_id: None,
                message: format!("domain '{domain}' has only {count} item(s)"),
            });
        }
    }

    for item in bank.items() {
        let p = item.params();
        if p.discrimination > 4.0 {
            warnings.push(ValidationWarning {
                item_id: Some(item.id().clone()),
                message: format!("unusually high discrimination {}", p.discrimination),
            });
        }
        if p.difficulty.abs() > 4.0 {
            warnings.push(ValidationWarning {
                item_id: Some(item.id().clone()),
                message: format!("difficulty {} lies outside [-4, 4]", p.difficulty),
            });
        }
        if p.guessing > 0.35 {
            warnings.push(ValidationWarning {
                item_id: Some(item.id().clone()),
                message: format!("unusually high guessing {}", p.guessing),
            });
        }
        if item.content().stem.trim().is_empty() {
            warnings.push(ValidationWarning {
                item_id: Some(item.id().clone()),
                message: "stem is empty".into(),
            });
        }
    }

    warnings
}
