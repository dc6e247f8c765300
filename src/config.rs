//! Merge configuration and the optional TOML config file.
//!
//! `MergeConfig` is validated at construction and immutable afterwards.
//! Every `with_*` method returns a fresh, re-validated config.

use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::models::{Field, FieldKind, IDENTITY_FIELDS};
use crate::sources::{SourceCatalog, SourcePriority};

pub const DEFAULT_NAME_MATCH_THRESHOLD: f64 = 0.85;
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.5;

const DEFAULT_PROTECTED: &[Field] = &[Field::SourceId];

const DEFAULT_PREFER_HIGHER: &[Field] = &[
    Field::GeekbenchSingle,
    Field::GeekbenchMulti,
    Field::PassmarkSingle,
    Field::PassmarkMulti,
    Field::CinebenchSingle,
    Field::CinebenchMulti,
];

const DEFAULT_PREFER_RECENT: &[Field] = &[Field::CurrentPrice, Field::IsDiscontinued];

const DEFAULT_TRUE_WINS: &[Field] = &[Field::IsDiscontinued, Field::HasIntegratedGpu];

/// Resolution policy applied to one field when two sources disagree.
/// Variants are listed in precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Always taken from the base record
    Protected,
    /// Numeric maximum
    PreferHigher,
    /// Boolean OR
    TrueWins,
    /// Later observation wins
    PreferRecent,
    /// Higher-priority source wins
    FirstWins,
}

#[derive(Clone, Debug)]
pub struct MergeConfig {
    name_match_threshold: f64,
    review_threshold: f64,
    fuzzy_grouping: bool,
    protected_fields: FxHashSet<Field>,
    prefer_higher_fields: FxHashSet<Field>,
    prefer_recent_fields: FxHashSet<Field>,
    true_wins_fields: FxHashSet<Field>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            name_match_threshold: DEFAULT_NAME_MATCH_THRESHOLD,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            fuzzy_grouping: true,
            protected_fields: DEFAULT_PROTECTED.iter().copied().collect(),
            prefer_higher_fields: DEFAULT_PREFER_HIGHER.iter().copied().collect(),
            prefer_recent_fields: DEFAULT_PREFER_RECENT.iter().copied().collect(),
            true_wins_fields: DEFAULT_TRUE_WINS.iter().copied().collect(),
        }
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange { name, value });
    }
    Ok(value)
}

impl MergeConfig {
    /// Default policies with a custom match threshold.
    pub fn new(name_match_threshold: f64) -> Result<Self, ConfigError> {
        Self::default().with_name_match_threshold(name_match_threshold)
    }

    pub fn with_name_match_threshold(mut self, value: f64) -> Result<Self, ConfigError> {
        self.name_match_threshold = check_unit("name_match_threshold", value)?;
        Ok(self)
    }

    pub fn with_review_threshold(mut self, value: f64) -> Result<Self, ConfigError> {
        self.review_threshold = check_unit("review_threshold", value)?;
        Ok(self)
    }

    pub fn with_fuzzy_grouping(mut self, enabled: bool) -> Self {
        self.fuzzy_grouping = enabled;
        self
    }

    pub fn with_protected_fields(
        mut self,
        fields: impl IntoIterator<Item = Field>,
    ) -> Result<Self, ConfigError> {
        self.protected_fields = fields.into_iter().collect();
        self.validate()
    }

    pub fn with_prefer_higher_fields(
        mut self,
        fields: impl IntoIterator<Item = Field>,
    ) -> Result<Self, ConfigError> {
        self.prefer_higher_fields = fields.into_iter().collect();
        self.validate()
    }

    pub fn with_prefer_recent_fields(
        mut self,
        fields: impl IntoIterator<Item = Field>,
    ) -> Result<Self, ConfigError> {
        self.prefer_recent_fields = fields.into_iter().collect();
        self.validate()
    }

    pub fn with_true_wins_fields(
        mut self,
        fields: impl IntoIterator<Item = Field>,
    ) -> Result<Self, ConfigError> {
        self.true_wins_fields = fields.into_iter().collect();
        self.validate()
    }

    /// Reject policies that cannot apply to a field's kind, and protected
    /// fields that also carry a resolution policy. `true_wins` and
    /// `prefer_recent` may overlap; precedence decides.
    fn validate(self) -> Result<Self, ConfigError> {
        for field in sorted(&self.prefer_higher_fields) {
            if !field.kind().is_numeric() {
                return Err(ConfigError::PolicyKind {
                    field: field.name(),
                    policy: "prefer_higher",
                    kind: field.kind().as_str(),
                });
            }
            if self.prefer_recent_fields.contains(&field) {
                return Err(ConfigError::PolicyOverlap {
                    field: field.name(),
                    first: "prefer_higher",
                    second: "prefer_recent",
                });
            }
        }
        for field in sorted(&self.true_wins_fields) {
            if field.kind() != FieldKind::Bool {
                return Err(ConfigError::PolicyKind {
                    field: field.name(),
                    policy: "true_wins",
                    kind: field.kind().as_str(),
                });
            }
        }
        for field in sorted(&self.protected_fields) {
            let other = if self.prefer_higher_fields.contains(&field) {
                Some("prefer_higher")
            } else if self.true_wins_fields.contains(&field) {
                Some("true_wins")
            } else if self.prefer_recent_fields.contains(&field) {
                Some("prefer_recent")
            } else {
                None
            };
            if let Some(second) = other {
                return Err(ConfigError::PolicyOverlap {
                    field: field.name(),
                    first: "protected",
                    second,
                });
            }
        }
        Ok(self)
    }

    pub fn name_match_threshold(&self) -> f64 {
        self.name_match_threshold
    }

    pub fn review_threshold(&self) -> f64 {
        self.review_threshold
    }

    pub fn fuzzy_grouping(&self) -> bool {
        self.fuzzy_grouping
    }

    pub fn is_protected(&self, field: Field) -> bool {
        self.protected_fields.contains(&field)
    }

    pub fn policy_for(&self, field: Field) -> FieldPolicy {
        if self.protected_fields.contains(&field) {
            FieldPolicy::Protected
        } else if self.prefer_higher_fields.contains(&field) {
            FieldPolicy::PreferHigher
        } else if self.true_wins_fields.contains(&field) {
            FieldPolicy::TrueWins
        } else if self.prefer_recent_fields.contains(&field) {
            FieldPolicy::PreferRecent
        } else {
            FieldPolicy::FirstWins
        }
    }
}

fn sorted(set: &FxHashSet<Field>) -> Vec<Field> {
    let mut fields: Vec<Field> = set.iter().copied().collect();
    fields.sort();
    fields
}

// ============================================================================
// Config File
// ============================================================================

/// On-disk configuration:
///
/// ```toml
/// [merge]
/// name_match_threshold = 0.9
/// prefer_higher_fields = ["passmark_multi"]
///
/// [sources]
/// my_scraper = "secondary"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    merge: MergeSection,
    sources: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MergeSection {
    name_match_threshold: Option<f64>,
    review_threshold: Option<f64>,
    fuzzy_grouping: Option<bool>,
    protected_fields: Option<Vec<String>>,
    prefer_higher_fields: Option<Vec<String>>,
    prefer_recent_fields: Option<Vec<String>>,
    true_wins_fields: Option<Vec<String>>,
}

/// Resolve field names. Identity names are accepted and dropped since they
/// are always protected.
fn parse_fields(names: &[String]) -> Result<Vec<Field>, ConfigError> {
    names
        .iter()
        .filter(|n| !IDENTITY_FIELDS.contains(&n.trim()))
        .map(|n| n.parse::<Field>().map_err(ConfigError::UnknownField))
        .collect()
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn merge_config(&self) -> Result<MergeConfig, ConfigError> {
        let section = &self.merge;
        let mut config = MergeConfig::default();
        if let Some(v) = section.name_match_threshold {
            config = config.with_name_match_threshold(v)?;
        }
        if let Some(v) = section.review_threshold {
            config = config.with_review_threshold(v)?;
        }
        if let Some(v) = section.fuzzy_grouping {
            config = config.with_fuzzy_grouping(v);
        }
        // Policy sets are assigned together, then validated once, so a file
        // may move a field between sets without tripping the overlap check.
        if let Some(names) = &section.protected_fields {
            config.protected_fields = parse_fields(names)?.into_iter().collect();
        }
        if let Some(names) = &section.prefer_higher_fields {
            config.prefer_higher_fields = parse_fields(names)?.into_iter().collect();
        }
        if let Some(names) = &section.prefer_recent_fields {
            config.prefer_recent_fields = parse_fields(names)?.into_iter().collect();
        }
        if let Some(names) = &section.true_wins_fields {
            config.true_wins_fields = parse_fields(names)?.into_iter().collect();
        }
        config.validate()
    }

    /// Default catalog extended with the `[sources]` table.
    pub fn catalog(&self) -> Result<SourceCatalog, ConfigError> {
        let mut catalog = SourceCatalog::default();
        for (name, tier) in &self.sources {
            let priority: SourcePriority =
                tier.parse().map_err(|_| ConfigError::UnknownTier {
                    source_name: name.clone(),
                    tier: tier.clone(),
                })?;
            catalog.insert(name.as_str(), priority);
        }
        Ok(catalog)
    }
}
