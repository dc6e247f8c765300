//! Name similarity scoring and candidate matching.
//!
//! Scores are on a 0.0 to 1.0 scale throughout the crate.
//!
//! Order of evaluation:
//! - equal model keys short-circuit to 1.0
//! - equal canonical names short-circuit to 1.0
//! - otherwise a blended string-distance score plus capped bonuses

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use strsim::normalized_levenshtein;

use crate::model_key::{ModelKey, ModelKeyExtractor};
use crate::models::Manufacturer;
use crate::normalize::NameNormalizer;

// ============================================================================
// Weights
// ============================================================================

/// Blend weights for the string-distance score. They sum to 1.0.
pub const CHAR_RATIO_WEIGHT: f64 = 0.3;
pub const TOKEN_SORT_WEIGHT: f64 = 0.4;
pub const TOKEN_SET_WEIGHT: f64 = 0.3;

/// Bonus when both names have keys that are close but not equal
pub const KEY_SIMILARITY_BONUS: f64 = 0.15;
/// Minimum key similarity for the key bonus
pub const KEY_SIMILARITY_MIN: f64 = 0.8;
pub const MANUFACTURER_BONUS: f64 = 0.05;
pub const TIER_BONUS: f64 = 0.05;

// ============================================================================
// Regex Patterns
// ============================================================================

/// Product tier tokens on canonical names: "i7", "ryzen 5", "ultra 9".
static TIER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(i[3579]|ryzen\s*[3579]|ultra\s*[3579])\b").unwrap());

static AMD_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:amd|ryzen|epyc|athlon|threadripper|opteron|phenom)\b").unwrap()
});

static INTEL_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:intel|core|xeon|celeron|pentium|atom)\b").unwrap()
});

// ============================================================================
// String Metrics
// ============================================================================

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

/// Levenshtein ratio after sorting tokens, so word order is ignored.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

/// Best ratio between the shared tokens and each side's full token set,
/// so extra or missing words cost little.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta = sorted_tokens(a);
    let tb = sorted_tokens(b);

    let common: Vec<&str> = ta.iter().filter(|t| tb.contains(t)).copied().collect();
    let rest_a: Vec<&str> = ta.iter().filter(|t| !common.contains(t)).copied().collect();
    let rest_b: Vec<&str> = tb.iter().filter(|t| !common.contains(t)).copied().collect();

    let base = common.join(" ");
    let join = |rest: &[&str]| {
        if base.is_empty() {
            rest.join(" ")
        } else if rest.is_empty() {
            base.clone()
        } else {
            format!("{} {}", base, rest.join(" "))
        }
    };
    let full_a = join(&rest_a);
    let full_b = join(&rest_b);

    let mut best = normalized_levenshtein(&full_a, &full_b);
    if !base.is_empty() {
        best = best
            .max(normalized_levenshtein(&base, &full_a))
            .max(normalized_levenshtein(&base, &full_b));
    }
    best
}

/// Product tier token of a canonical name, whitespace removed ("ryzen 5" → "ryzen5").
pub fn tier_token(canonical: &str) -> Option<String> {
    TIER_TOKEN
        .captures(canonical)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split_whitespace().collect())
}

/// Vendor from family keywords. AMD keywords are checked first.
pub fn detect_manufacturer(name: &str) -> Option<Manufacturer> {
    if AMD_KEYWORDS.is_match(name) {
        Some(Manufacturer::Amd)
    } else if INTEL_KEYWORDS.is_match(name) {
        Some(Manufacturer::Intel)
    } else {
        None
    }
}

// ============================================================================
// Matcher
// ============================================================================

/// Why a score short-circuited to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExactMatch {
    ModelKey,
    CanonicalName,
}

/// Components of one similarity computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreDetail {
    pub exact: Option<ExactMatch>,
    pub char_ratio: f64,
    pub token_sort: f64,
    pub token_set: f64,
    pub blended: f64,
    pub bonus: f64,
    pub total: f64,
}

impl ScoreDetail {
    fn exact(kind: ExactMatch) -> Self {
        Self {
            exact: Some(kind),
            total: 1.0,
            ..Default::default()
        }
    }
}

/// Best candidate for a name.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub candidate: String,
    pub score: f64,
    /// Came from a manual mapping rather than scoring
    pub manual: bool,
}

/// Explicit matcher instance. Owns its normalizer cache and manual overrides.
#[derive(Debug, Default)]
pub struct CpuMatcher {
    normalizer: NameNormalizer,
    extractor: ModelKeyExtractor,
    manual_mappings: FxHashMap<String, String>,
}

impl CpuMatcher {
    pub fn new(normalizer: NameNormalizer, extractor: ModelKeyExtractor) -> Self {
        Self {
            normalizer,
            extractor,
            manual_mappings: FxHashMap::default(),
        }
    }

    pub fn normalize(&self, name: &str) -> String {
        self.normalizer.normalize(name)
    }

    pub fn model_key(&self, name: &str) -> Option<ModelKey> {
        self.extractor.extract(name)
    }

    pub fn extract_model_key(&self, name: &str) -> Option<String> {
        self.extractor.extract_model_key(name)
    }

    /// Similarity in [0, 1]. Empty input scores 0.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        self.score_detail(a, b).total
    }

    pub fn score_detail(&self, a: &str, b: &str) -> ScoreDetail {
        if a.trim().is_empty() || b.trim().is_empty() {
            return ScoreDetail::default();
        }

        let key_a = self.model_key(a).map(|k| k.to_string());
        let key_b = self.model_key(b).map(|k| k.to_string());
        if let (Some(ka), Some(kb)) = (&key_a, &key_b) {
            if ka == kb {
                return ScoreDetail::exact(ExactMatch::ModelKey);
            }
        }

        let norm_a = self.normalize(a);
        let norm_b = self.normalize(b);
        if norm_a.is_empty() || norm_b.is_empty() {
            return ScoreDetail::default();
        }
        if norm_a == norm_b {
            return ScoreDetail::exact(ExactMatch::CanonicalName);
        }

        let char_ratio = normalized_levenshtein(&norm_a, &norm_b);
        let token_sort = token_sort_ratio(&norm_a, &norm_b);
        let token_set = token_set_ratio(&norm_a, &norm_b);
        let blended = CHAR_RATIO_WEIGHT * char_ratio
            + TOKEN_SORT_WEIGHT * token_sort
            + TOKEN_SET_WEIGHT * token_set;

        let mut bonus = 0.0;
        if let (Some(ka), Some(kb)) = (&key_a, &key_b) {
            if normalized_levenshtein(ka, kb) >= KEY_SIMILARITY_MIN {
                bonus += KEY_SIMILARITY_BONUS;
            }
        }
        if let (Some(ma), Some(mb)) = (detect_manufacturer(a), detect_manufacturer(b)) {
            if ma == mb {
                bonus += MANUFACTURER_BONUS;
            }
        }
        if let (Some(ta), Some(tb)) = (tier_token(&norm_a), tier_token(&norm_b)) {
            if ta == tb {
                bonus += TIER_BONUS;
            }
        }

        ScoreDetail {
            exact: None,
            char_ratio,
            token_sort,
            token_set,
            blended,
            bonus,
            total: (blended + bonus).clamp(0.0, 1.0),
        }
    }

    /// Override scoring for a specific source name.
    pub fn add_manual_mapping(
        &mut self,
        source_name: impl Into<String>,
        canonical: impl Into<String>,
    ) {
        self.manual_mappings.insert(source_name.into(), canonical.into());
    }

    /// Highest-scoring candidate at or above `threshold`. Manual mappings win
    /// outright; an exact match stops the scan.
    pub fn find_best_match<S: AsRef<str>>(
        &self,
        target: &str,
        candidates: &[S],
        threshold: f64,
    ) -> Option<NameMatch> {
        if let Some(mapped) = self.manual_mappings.get(target) {
            return Some(NameMatch {
                candidate: mapped.clone(),
                score: 1.0,
                manual: true,
            });
        }

        let mut best: Option<(&str, f64)> = None;
        for candidate in candidates {
            let candidate = candidate.as_ref();
            let score = self.score(target, candidate);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
                if score >= 1.0 {
                    break;
                }
            }
        }

        best.filter(|(_, score)| *score >= threshold)
            .map(|(candidate, score)| NameMatch {
                candidate: candidate.to_string(),
                score,
                manual: false,
            })
    }

    /// Best match for each name, in input order.
    pub fn match_all<S: AsRef<str>, C: AsRef<str>>(
        &self,
        names: &[S],
        candidates: &[C],
        threshold: f64,
    ) -> Vec<(String, Option<NameMatch>)> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), self.find_best_match(name, candidates, threshold))
            })
            .collect()
    }
}
