//! The `rules.yml` document and the components driven by it.
//!
//! Each top-level section may also be spelled with a `_ruby` suffix
//! (`job_filters_ruby`, `scoring_ruby`, ...). The plain key wins when both
//! are present. Missing or malformed files degrade to empty rules.

pub mod engine;
pub mod loader;
pub mod scanner;
pub mod writer;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

pub const DEFAULT_MIN_KEEP_SCORE: f64 = 1.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobFilterRules {
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub require_include_match: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub boosts: BTreeMap<String, f64>,
    pub penalties: BTreeMap<String, f64>,
    pub neutral_or_low: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RankingRules {
    pub min_keep_score: Option<f64>,
    pub require_include_match: Option<bool>,
}

/// Raw `filters` section. Defaults are applied by `loader::FilterSettings`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FiltersSection {
    pub company_blocklist: Option<Vec<String>>,
    pub content_blocklist: Option<Vec<String>>,
    pub require_no_security_clearance: Option<bool>,
    pub allow_background_checks: Option<bool>,
    pub allowed_phrases: Option<Vec<String>>,
    pub excluded_phrases: Option<Vec<String>>,
    pub required_keywords: Option<Vec<String>>,
    pub excluded_keywords: Option<Vec<String>>,
}

/// One entry under `warnings`, `blocking` or `info`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScanRule {
    pub pattern: Option<String>,
    pub patterns: Vec<String>,
    pub message: Option<String>,
    pub note: Option<String>,
    pub severity: Option<String>,
}

impl ScanRule {
    pub fn all_patterns(&self) -> impl Iterator<Item = &str> {
        self.pattern
            .iter()
            .map(String::as_str)
            .chain(self.patterns.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkillVerification {
    pub flag_unverified: bool,
    pub message: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Rules {
    path: Option<PathBuf>,
    pub job_filters: JobFilterRules,
    pub scoring: ScoringRules,
    pub ranking: RankingRules,
    pub ui: Mapping,
    pub filters: FiltersSection,
    pub warnings: BTreeMap<String, ScanRule>,
    pub blocking: BTreeMap<String, ScanRule>,
    pub info: BTreeMap<String, ScanRule>,
    pub skill_verification: SkillVerification,
}

impl Rules {
    /// Loads `path`, logging and falling back to empty rules on any failure.
    pub fn load(path: &Path) -> Self {
        let mut rules = match std::fs::read_to_string(path) {
            Ok(text) => match Self::from_yaml_str(&text) {
                Ok(rules) => rules,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to parse rules file, using defaults");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Rules file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read rules file, using defaults");
                Self::default()
            }
        };
        rules.path = Some(path.to_path_buf());
        rules
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text).context("parsing rules YAML")?;
        let root = match value {
            Value::Mapping(map) => map,
            Value::Null => Mapping::new(),
            _ => return Err(anyhow!("rules YAML must be a mapping at the top level")),
        };

        Ok(Self {
            path: None,
            job_filters: section(&root, "job_filters"),
            scoring: section(&root, "scoring"),
            ranking: section(&root, "ranking"),
            ui: section(&root, "ui"),
            filters: section(&root, "filters"),
            warnings: section(&root, "warnings"),
            blocking: section(&root, "blocking"),
            info: section(&root, "info"),
            skill_verification: section(&root, "skill_verification"),
        })
    }

    /// Re-reads the file this value was loaded from. No-op for in-memory rules.
    pub fn reload(&mut self) {
        if let Some(path) = self.path.clone() {
            *self = Self::load(&path);
        }
    }

    /// `job_filters.require_include_match`, then `ranking.require_include_match`, then true.
    pub fn require_include_match(&self) -> bool {
        self.job_filters
            .require_include_match
            .or(self.ranking.require_include_match)
            .unwrap_or(true)
    }

    pub fn min_keep_score(&self) -> f64 {
        self.ranking.min_keep_score.unwrap_or(DEFAULT_MIN_KEEP_SCORE)
    }
}

/// Reads `key`, falling back to `<key>_ruby`, then to the type's default.
fn section<T: DeserializeOwned + Default>(root: &Mapping, key: &str) -> T {
    let fallback = format!("{key}_ruby");
    let raw = root
        .get(key)
        .filter(|v| !v.is_null())
        .or_else(|| root.get(fallback.as_str()).filter(|v| !v.is_null()));

    match raw {
        Some(value) => serde_yaml::from_value(value.clone()).unwrap_or_else(|e| {
            warn!(section = key, error = %e, "Ignoring malformed rules section");
            T::default()
        }),
        None => T::default(),
    }
}
