//! CPU name normalization.
//!
//! Produces the canonical name used for loose matching and as the fallback
//! grouping key. Output contains only `[a-z0-9 ]`, single-spaced.
//!
//! CRITICAL: grouping, scoring and storage keys all depend on this output.
//! Run tests after changes.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Manufacturer prefixes. All are applied, in order.
pub static DEFAULT_PREFIX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^intel(?:®|\(r\))?\s+").unwrap(),
        Regex::new(r"^amd(?:®|\(r\))?\s+").unwrap(),
        Regex::new(r"^apple\s+").unwrap(),
    ]
});

/// Suffix and noise patterns (applied in order, after prefixes).
pub static DEFAULT_SUFFIX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Trademark glyphs, before ASCII folding turns them into letters
        Regex::new(r"[®™©]|\((?:r|tm|c)\)").unwrap(),
        // "with Radeon Graphics", "w/ Wraith Cooler"
        Regex::new(r"\s+with\s+.*$").unwrap(),
        Regex::new(r"\s+w/\s+.*$").unwrap(),
        // "@ 3.60GHz"
        Regex::new(r"\s+@\s*[\d.]+\s*ghz$").unwrap(),
        // "(25M Cache, up to 5.00 GHz)"
        Regex::new(r"\s+\([^)]*\)$").unwrap(),
        // "8-Core Processor"
        Regex::new(r"\s+\d+-core\s+processor$").unwrap(),
        Regex::new(r"\s+(?:processor|cpu)$").unwrap(),
    ]
});

/// Dash variants and underscores become word separators.
static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-‐‑‒–—―_]+").unwrap());

/// Anything left that is not a lowercase alphanumeric or whitespace.
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII (NFKD, drop combining marks, transliterate).
/// e.g., "Ｃｏｒｅ" → "core", "Athlon™" → "athlontm"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Ordered prefix and suffix tables used by [`NameNormalizer`].
#[derive(Clone, Debug)]
pub struct NormalizerPatterns {
    pub prefixes: Vec<Regex>,
    pub suffixes: Vec<Regex>,
}

impl Default for NormalizerPatterns {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_PREFIX_PATTERNS.clone(),
            suffixes: DEFAULT_SUFFIX_PATTERNS.clone(),
        }
    }
}

impl NormalizerPatterns {
    /// Compile pattern tables from strings. Patterns see lowercased input.
    pub fn new(prefixes: &[&str], suffixes: &[&str]) -> Result<Self, regex::Error> {
        Ok(Self {
            prefixes: prefixes.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?,
            suffixes: suffixes.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?,
        })
    }

    /// One strip pass over already-trimmed input.
    fn apply(&self, name: &str) -> String {
        let mut result = name.trim().to_lowercase();

        for pattern in &self.prefixes {
            result = pattern.replace(&result, "").into_owned();
        }
        for pattern in &self.suffixes {
            result = pattern.replace_all(&result, "").into_owned();
        }

        let folded = fold_to_ascii(&result);
        let spaced = DASHES.replace_all(&folded, " ");
        let cleaned = PUNCTUATION.replace_all(&spaced, "");
        MULTI_SPACE.replace_all(&cleaned, " ").trim().to_string()
    }

    /// Repeat strip passes until nothing changes, which makes the result a
    /// fixpoint and therefore idempotent. After the first pass the input is
    /// folded ASCII and a pass can only delete text, so this terminates.
    fn normalize(&self, name: &str) -> String {
        let mut current = self.apply(name);
        loop {
            let next = self.apply(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

/// Canonical-name normalizer with an optional memo cache.
///
/// The cache is owned by the instance. Sharing one normalizer across threads
/// is safe; a poisoned cache lock just disables caching.
#[derive(Debug)]
pub struct NameNormalizer {
    patterns: NormalizerPatterns,
    cache: Option<Mutex<FxHashMap<String, String>>>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(NormalizerPatterns::default())
    }
}

impl NameNormalizer {
    pub fn new(patterns: NormalizerPatterns) -> Self {
        Self {
            patterns,
            cache: Some(Mutex::new(FxHashMap::default())),
        }
    }

    pub fn uncached(patterns: NormalizerPatterns) -> Self {
        Self { patterns, cache: None }
    }

    /// Normalize a CPU name. Empty input gives an empty string.
    pub fn normalize(&self, name: &str) -> String {
        if name.trim().is_empty() {
            return String::new();
        }

        if let Some(cache) = &self.cache {
            if let Ok(map) = cache.lock() {
                if let Some(hit) = map.get(name) {
                    return hit.clone();
                }
            }
        }

        let normalized = self.patterns.normalize(name);

        if let Some(cache) = &self.cache {
            if let Ok(mut map) = cache.lock() {
                map.insert(name.to_string(), normalized.clone());
            }
        }
        normalized
    }

    /// Number of cached names (0 when uncached).
    pub fn cache_len(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|c| c.lock().ok().map(|m| m.len()))
            .unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Ok(mut map) = cache.lock() {
                map.clear();
            }
        }
    }
}

/// Stateless normalization with the default pattern tables.
pub fn normalize_name(name: &str) -> String {
    if name.trim().is_empty() {
        return String::new();
    }
    static DEFAULT_PATTERNS: Lazy<NormalizerPatterns> = Lazy::new(NormalizerPatterns::default);
    DEFAULT_PATTERNS.normalize(name)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_manufacturer_prefix() {
        assert_eq!(normalize_name("Intel Core i9-14900K"), "core i9 14900k");
        assert_eq!(normalize_name("AMD Ryzen 9 9950X3D"), "ryzen 9 9950x3d");
        assert_eq!(normalize_name("Apple M3 Max"), "m3 max");
    }

    #[test]
    fn test_normalize_strips_suffixes() {
        assert_eq!(normalize_name("Core Ultra 9 285K Processor"), "core ultra 9 285k");
        assert_eq!(normalize_name("AMD Ryzen 7 5800X 8-Core Processor"), "ryzen 7 5800x");
        assert_eq!(
            normalize_name("AMD Ryzen 5 5600G with Radeon Graphics"),
            "ryzen 5 5600g"
        );
        assert_eq!(
            normalize_name("Intel Core i7-12700K Processor (25M Cache, up to 5.00 GHz)"),
            "core i7 12700k"
        );
        assert_eq!(normalize_name("Intel Core i5-8400 CPU @ 2.80GHz"), "core i5 8400");
        assert_eq!(normalize_name("AMD Ryzen 7 5700X w/ Wraith Stealth"), "ryzen 7 5700x");
    }

    #[test]
    fn test_normalize_trademark_glyphs() {
        assert_eq!(normalize_name("Intel® Core™ i7-13700K"), "core i7 13700k");
        assert_eq!(normalize_name("Intel(R) Xeon(R) Gold 6338"), "xeon gold 6338");
    }

    #[test]
    fn test_normalize_dashes_and_whitespace() {
        assert_eq!(normalize_name("  Core   i5–12400  "), "core i5 12400");
        assert_eq!(normalize_name("EPYC_9654"), "epyc 9654");
    }

    #[test]
    fn test_normalize_full_width() {
        assert_eq!(normalize_name("Ｒｙｚｅｎ ５ ７６００"), "ryzen 5 7600");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("   "), "");
        assert_eq!(normalize_name("®™"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Intel Core i9-14900K",
            "Intel Intel Core i3 processor",
            "AMD Ryzen Threadripper PRO 7995WX 96-Core Processor",
            "Core Ultra 9 285K (Arrow Lake) Processor",
            "Xeon® Platinum 8480+ CPU",
            "amd   apple  ??? --- ",
            "AMD Ryzen 5 5600G with Radeon Graphics (Boxed)",
            "Ｃｏｒｅ™ i5",
            "(r) intel (tm)",
        ];
        for s in samples {
            let once = normalize_name(s);
            assert_eq!(normalize_name(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_normalize_strips_long_prefix_runs() {
        let name = format!("{}core i5", "intel ".repeat(20));
        let once = normalize_name(&name);
        assert_eq!(once, "core i5");
        assert_eq!(normalize_name(&once), once);

        let suffixed = format!("Ryzen 5 5600X{}", " (Boxed)".repeat(25));
        assert_eq!(normalize_name(&suffixed), "ryzen 5 5600x");
    }

    #[test]
    fn test_cached_normalizer_matches_stateless() {
        let normalizer = NameNormalizer::default();
        let name = "Intel Core Ultra 7 265K Processor";
        assert_eq!(normalizer.normalize(name), normalize_name(name));
        assert_eq!(normalizer.cache_len(), 1);
        assert_eq!(normalizer.normalize(name), "core ultra 7 265k");
        assert_eq!(normalizer.cache_len(), 1);
        normalizer.clear_cache();
        assert_eq!(normalizer.cache_len(), 0);
    }

    #[test]
    fn test_custom_patterns() {
        let patterns = NormalizerPatterns::new(&[r"^qualcomm\s+"], &[r"\s+soc$"]).unwrap();
        let normalizer = NameNormalizer::uncached(patterns);
        assert_eq!(normalizer.normalize("Qualcomm Snapdragon X Elite SoC"), "snapdragon x elite");
        assert_eq!(normalizer.cache_len(), 0);
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Ｃｏｒｅ"), "core");
        assert_eq!(fold_to_ascii("Athlon™"), "athlontm");
    }
}
