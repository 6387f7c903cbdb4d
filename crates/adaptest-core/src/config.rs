//! Engine settings and their loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::estimator::EstimatorSettings;
use crate::scoring::ScoreScale;
use crate::selector::SelectorSettings;
use crate::session::SessionConfig;

/// Top-level adaptest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub estimator: EstimatorSettings,
    #[serde(default)]
    pub selector: SelectorSettings,
    /// The published score scale. Fixed for the lifetime of an engine.
    #[serde(default)]
    pub scale: ScoreScale,
    /// Idle time after which an active session may be expired.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Session configuration used when the caller supplies none.
    #[serde(default)]
    pub defaults: SessionConfig,
}

fn default_session_ttl() -> u64 {
    3600
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            estimator: EstimatorSettings::default(),
            selector: SelectorSettings::default(),
            scale: ScoreScale::default(),
            session_ttl_secs: default_session_ttl(),
            defaults: SessionConfig::default(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.estimator.validate()?;
        self.selector.validate()?;
        self.scale.validate()?;
        Ok(())
    }

    /// Apply `ADAPTEST_SCORE_MIN`, `ADAPTEST_SCORE_MAX` and `ADAPTEST_SEED`
    /// as returned by `lookup`. Unparsable values are an error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ADAPTEST_SCORE_MIN") {
            self.scale.score_min = v
                .trim()
                .parse()
                .with_context(|| format!("ADAPTEST_SCORE_MIN is not an integer: {v}"))?;
        }
        if let Some(v) = lookup("ADAPTEST_SCORE_MAX") {
            self.scale.score_max = v
                .trim()
                .parse()
                .with_context(|| format!("ADAPTEST_SCORE_MAX is not an integer: {v}"))?;
        }
        if let Some(v) = lookup("ADAPTEST_SEED") {
            let seed = v
                .trim()
                .parse()
                .with_context(|| format!("ADAPTEST_SEED is not an unsigned integer: {v}"))?;
            self.selector.seed = Some(seed);
        }
        Ok(())
    }
}

/// Load settings from well-known paths.
///
/// Search order:
/// 1. `adaptest.toml` in the current directory
/// 2. `~/.config/adaptest/config.toml`
///
/// Environment variable overrides: `ADAPTEST_SCORE_MIN`, `ADAPTEST_SCORE_MAX`,
/// `ADAPTEST_SEED`.
pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from(None)
}

/// Load settings from an explicit path, or search the default locations.
pub fn load_settings_from(path: Option<&Path>) -> Result<EngineSettings> {
    let settings_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("settings file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("adaptest.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut settings = match settings_path {
        Some(path) => parse_settings_file(&path)?,
        None => EngineSettings::default(),
    };

    settings.apply_overrides(|key| std::env::var(key).ok())?;
    settings.validate().context("invalid adaptest settings")?;
    Ok(settings)
}

fn parse_settings_file(path: &Path) -> Result<EngineSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings: {}", path.display()))?;
    toml::from_str::<EngineSettings>(&content)
        .with_context(|| format!("failed to parse settings: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("adaptest"))
}
