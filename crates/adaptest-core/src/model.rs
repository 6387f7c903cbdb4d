//! Core data model for calibrated test items.
//!
//! Items are validated once, when they are constructed, and are immutable
//! afterwards. Everything downstream (selection, estimation, scoring) can
//! therefore assume finite parameters and a well-formed answer key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BankError;

/// Opaque, unique item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 3PL item parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemParams {
    /// IRT `a` parameter, strictly positive.
    pub discrimination: f64,
    /// IRT `b` parameter.
    pub difficulty: f64,
    /// IRT `c` parameter, in `[0, 1)`.
    pub guessing: f64,
}

impl ItemParams {
    pub fn new(discrimination: f64, difficulty: f64, guessing: f64) -> Self {
        Self {
            discrimination,
            difficulty,
            guessing,
        }
    }

    /// Check the parameter domain, returning a human-readable reason on failure.
    pub fn check(&self) -> Result<(), String> {
        if !self.difficulty.is_finite() {
            return Err(format!("difficulty must be finite, got {}", self.difficulty));
        }
        if !self.discrimination.is_finite() || self.discrimination <= 0.0 {
            return Err(format!(
                "discrimination must be a positive finite number, got {}",
                self.discrimination
            ));
        }
        if !(0.0..1.0).contains(&self.guessing) {
            return Err(format!(
                "guessing must lie in [0, 1), got {}",
                self.guessing
            ));
        }
        Ok(())
    }
}

/// Item payload. The engine never interprets it beyond answer-key checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemContent {
    /// The question text shown to the examinee.
    pub stem: String,
    /// Answer options for selected-response items; empty for free response.
    #[serde(default)]
    pub options: Vec<String>,
}

/// A calibrated, immutable test item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    id: ItemId,
    domain: String,
    params: ItemParams,
    content: ItemContent,
    correct_answer: String,
}

impl Item {
    /// Build an item, rejecting invalid parameters and malformed answer keys.
    ///
    /// An answer key is well-formed when it is non-empty after normalization
    /// and, for items with options, matches exactly one of them. Options must
    /// be distinct after normalization.
    pub fn new(
        id: impl Into<ItemId>,
        domain: impl Into<String>,
        params: ItemParams,
        content: ItemContent,
        correct_answer: impl Into<String>,
    ) -> Result<Self, BankError> {
        let id = id.into();
        let domain = domain.into();
        let correct_answer = correct_answer.into();

        if id.as_str().trim().is_empty() {
            return Err(BankError::InvalidItem {
                id,
                reason: "id is empty".into(),
            });
        }
        if domain.trim().is_empty() {
            return Err(BankError::InvalidItem {
                id,
                reason: "domain is empty".into(),
            });
        }
        if let Err(reason) = params.check() {
            return Err(BankError::InvalidItem { id, reason });
        }

        let key = normalize_answer(&correct_answer);
        if key.is_empty() {
            return Err(BankError::MalformedAnswerKey {
                id,
                reason: "correct answer is empty".into(),
            });
        }

        if !content.options.is_empty() {
            let normalized: Vec<String> =
                content.options.iter().map(|o| normalize_answer(o)).collect();
            for (i, option) in normalized.iter().enumerate() {
                if option.is_empty() {
                    return Err(BankError::MalformedAnswerKey {
                        id,
                        reason: format!("option {} is empty", i + 1),
                    });
                }
                if normalized[..i].contains(option) {
                    return Err(BankError::MalformedAnswerKey {
                        id,
                        reason: format!("option '{}' is listed twice", content.options[i]),
                    });
                }
            }
            if !normalized.contains(&key) {
                return Err(BankError::MalformedAnswerKey {
                    id,
                    reason: format!(
                        "correct answer '{correct_answer}' does not match any listed option"
                    ),
                });
            }
        }

        Ok(Self {
            id,
            domain,
            params,
            content,
            correct_answer,
        })
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn params(&self) -> ItemParams {
        self.params
    }

    pub fn content(&self) -> &ItemContent {
        &self.content
    }

    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    /// Compare an examinee answer against the key, ignoring case and spacing.
    pub fn is_correct(&self, answer: &str) -> bool {
        normalize_answer(answer) == normalize_answer(&self.correct_answer)
    }
}

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize_answer(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
