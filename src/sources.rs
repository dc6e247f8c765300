//! Source catalog: provider name to priority tier.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trust tier of a data provider. Lower ordinal is more authoritative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePriority {
    /// Vendor pages (Intel ARK, AMD product specs)
    Official = 1,
    /// Curated third-party databases
    Primary = 2,
    /// Retail and review aggregators
    Secondary = 3,
    /// Benchmark charts that only carry scores
    #[default]
    #[serde(alias = "benchmark")]
    BenchmarkOnly = 4,
}

impl SourcePriority {
    pub fn as_str(self) -> &'static str {
        match self {
            SourcePriority::Official => "official",
            SourcePriority::Primary => "primary",
            SourcePriority::Secondary => "secondary",
            SourcePriority::BenchmarkOnly => "benchmark_only",
        }
    }
}

impl fmt::Display for SourcePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourcePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "official" | "1" => Ok(SourcePriority::Official),
            "primary" | "2" => Ok(SourcePriority::Primary),
            "secondary" | "3" => Ok(SourcePriority::Secondary),
            "benchmark_only" | "benchmark" | "4" => Ok(SourcePriority::BenchmarkOnly),
            other => Err(other.to_string()),
        }
    }
}

/// Known collectors and their default tiers.
const DEFAULT_SOURCES: &[(&str, SourcePriority)] = &[
    ("intel_ark", SourcePriority::Official),
    ("amd_specs", SourcePriority::Official),
    ("techpowerup", SourcePriority::Primary),
    ("tomshardware", SourcePriority::Secondary),
    ("pcpartpicker", SourcePriority::Secondary),
    ("nanoreview", SourcePriority::Secondary),
    ("kaggle", SourcePriority::Secondary),
    ("geekbench", SourcePriority::BenchmarkOnly),
    ("passmark", SourcePriority::BenchmarkOnly),
    ("cinebench", SourcePriority::BenchmarkOnly),
];

/// Total mapping from source name to tier. Unknown sources fall to the
/// lowest tier.
#[derive(Clone, Debug)]
pub struct SourceCatalog {
    tiers: FxHashMap<String, SourcePriority>,
}

impl Default for SourceCatalog {
    fn default() -> Self {
        let tiers = DEFAULT_SOURCES
            .iter()
            .map(|(name, tier)| (name.to_string(), *tier))
            .collect();
        Self { tiers }
    }
}

impl SourceCatalog {
    /// Catalog with no known sources; everything resolves to the default tier.
    pub fn empty() -> Self {
        Self {
            tiers: FxHashMap::default(),
        }
    }

    pub fn with_source(mut self, name: impl Into<String>, tier: SourcePriority) -> Self {
        self.insert(name, tier);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, tier: SourcePriority) {
        self.tiers.insert(name.into().to_lowercase(), tier);
    }

    pub fn tier_for(&self, source: &str) -> SourcePriority {
        self.tiers
            .get(&source.trim().to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    pub fn is_known(&self, source: &str) -> bool {
        self.tiers.contains_key(&source.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}
