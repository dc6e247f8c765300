//! Model-key extraction: a compact family+model token per CPU SKU.
//!
//! Keys look like `ultra9 285k`, `i9 14900k`, `ryzen9 9950x3d`. The family
//! token is always part of a pattern key. Names no family pattern covers fall
//! back to the first isolated 3-5 digit run, which carries no family.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::normalize::fold_to_ascii;

static GLYPHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[®™©]|\((?:r|tm|c)\)").unwrap());

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\D)(\d{3,5})(?:\D|$)").unwrap());

/// Family patterns, most specific first. Patterns run against lowercased,
/// ASCII-folded input and must define a `model` group; `tier`, `series` and
/// `rev` are optional.
const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    // Core Ultra 9 285K, Ultra 7 155H, Core Ultra 9 Processor 285K
    (
        "ultra",
        r"\b(?:core\s+)?ultra\s+(?P<tier>[3579])[-\s]+(?:processor\s+)?(?P<model>\d{3}[a-z0-9]*)",
    ),
    // Core i9-14900K, i7 1165G7, Core i5 Processor 12400
    (
        "i",
        r"\b(?:core\s+)?i(?P<tier>[3579])[-\s]*(?:processor\s+)?(?P<model>\d{3,5}[a-z0-9]*)",
    ),
    // Threadripper PRO 7995WX (before Ryzen, which prefixes it)
    ("threadripper", r"\bthreadripper\s+(?:(?P<series>pro)\s+)?(?P<model>\d{4}[a-z0-9]*)"),
    // Ryzen 9 9950X3D, Ryzen 7 PRO 5850U, Ryzen AI 9 HX 370
    (
        "ryzen",
        r"\bryzen\s+(?:ai\s+)?(?P<tier>\d)\s+(?:(?P<series>pro|hx|ai)\s+)?(?P<model>\d{3,4}[a-z0-9]*)",
    ),
    // EPYC 9654
    ("epyc", r"\bepyc\s+(?P<model>\d{4}[a-z0-9]*)"),
    // Xeon Gold 6338, Xeon E5-2690 v4, Xeon Platinum 8480+
    (
        "xeon",
        r"\bxeon\s+(?:(?P<tier>[a-z]+\d?)[-\s]+)?(?P<model>\d{4,5}[a-z0-9]*\+?)(?:\s+(?P<rev>v\d))?",
    ),
    // Athlon Gold 3150U, Athlon 3000G
    ("athlon", r"\bathlon\s+(?:(?P<series>gold|silver|pro)\s+)?(?P<model>\d{3,4}[a-z0-9]*)"),
    // Pentium Gold G7400, Celeron N5105
    ("pentium", r"\bpentium\s+(?:(?:gold|silver)\s+)?(?P<model>[a-z]?\d{3,5}[a-z0-9]*)"),
    ("celeron", r"\bceleron\s+(?P<model>[a-z]?\d{3,5}[a-z0-9]*)"),
];

/// One family-specific extraction rule.
#[derive(Clone, Debug)]
pub struct ModelPattern {
    family: String,
    regex: Regex,
}

impl ModelPattern {
    pub fn new(family: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            family: family.to_lowercase(),
            regex: Regex::new(pattern)?,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    fn extract(&self, prepared: &str) -> Option<ModelKey> {
        let caps = self.regex.captures(prepared)?;
        let model = caps.name("model")?.as_str();

        let tier = caps.name("tier").map(|m| m.as_str()).unwrap_or("");
        let series = caps.name("series").map(|m| m.as_str()).unwrap_or("");
        let rev = caps.name("rev").map(|m| m.as_str()).unwrap_or("");

        Some(ModelKey {
            family: Some(format!("{}{}", self.family, tier)),
            model: format!("{}{}{}", series, model, rev),
        })
    }
}

/// Extracted key. `family` is None for digit-run fallbacks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub family: Option<String>,
    pub model: String,
}

impl ModelKey {
    pub fn has_family(&self) -> bool {
        self.family.is_some()
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.family {
            Some(family) => write!(f, "{} {}", family, self.model),
            None => f.write_str(&self.model),
        }
    }
}

/// Ordered family patterns plus the digit-run fallback.
#[derive(Clone, Debug)]
pub struct ModelKeyExtractor {
    patterns: Vec<ModelPattern>,
}

impl Default for ModelKeyExtractor {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERN_TABLE.clone(),
        }
    }
}

static DEFAULT_PATTERN_TABLE: Lazy<Vec<ModelPattern>> = Lazy::new(|| {
    DEFAULT_PATTERNS
        .iter()
        .map(|(family, pattern)| ModelPattern::new(family, pattern).unwrap())
        .collect()
});

impl ModelKeyExtractor {
    pub fn new(patterns: Vec<ModelPattern>) -> Self {
        Self { patterns }
    }

    /// Default table with extra patterns tried first.
    pub fn with_patterns_first(mut extra: Vec<ModelPattern>) -> Self {
        extra.extend(DEFAULT_PATTERN_TABLE.iter().cloned());
        Self { patterns: extra }
    }

    pub fn patterns(&self) -> &[ModelPattern] {
        &self.patterns
    }

    pub fn extract(&self, name: &str) -> Option<ModelKey> {
        let prepared = prepare(name);
        if prepared.is_empty() {
            return None;
        }

        for pattern in &self.patterns {
            if let Some(key) = pattern.extract(&prepared) {
                return Some(key);
            }
        }

        DIGIT_RUN.captures(&prepared).and_then(|caps| {
            caps.get(1).map(|m| ModelKey {
                family: None,
                model: m.as_str().to_string(),
            })
        })
    }

    pub fn extract_model_key(&self, name: &str) -> Option<String> {
        self.extract(name).map(|key| key.to_string())
    }
}

/// Lowercase, strip trademark glyphs and fold to ASCII.
fn prepare(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let stripped = GLYPHS.replace_all(&lower, "");
    fold_to_ascii(&stripped)
}

/// Extract a model key with the default pattern table.
pub fn extract_model_key(name: &str) -> Option<String> {
    static DEFAULT: Lazy<ModelKeyExtractor> = Lazy::new(ModelKeyExtractor::default);
    DEFAULT.extract_model_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_ultra_key_is_consistent() {
        let expected = Some("ultra9 285k".to_string());
        assert_eq!(extract_model_key("Intel Core Ultra 9 285K"), expected);
        assert_eq!(extract_model_key("Core Ultra 9 285K"), expected);
        assert_eq!(extract_model_key("Core Ultra 9 285K Processor"), expected);
        assert_eq!(extract_model_key("Intel® Core™ Ultra 9 285K"), expected);
        assert_eq!(extract_model_key("Intel® Core™ Ultra 9 Processor 285K"), expected);
        assert_eq!(
            extract_model_key("Intel® Core™ Ultra 5 Processor 225"),
            Some("ultra5 225".to_string())
        );
    }

    #[test]
    fn test_core_i_keys() {
        assert_eq!(extract_model_key("Intel Core i9-14900K"), Some("i9 14900k".to_string()));
        assert_eq!(extract_model_key("Core i9-14900K"), Some("i9 14900k".to_string()));
        assert_eq!(
            extract_model_key("Intel(R) Core(TM) i7-1165G7 @ 2.80GHz"),
            Some("i7 1165g7".to_string())
        );
        assert_eq!(extract_model_key("i5 12400F"), Some("i5 12400f".to_string()));
        assert_eq!(
            extract_model_key("Intel® Core™ i5 Processor 12400"),
            Some("i5 12400".to_string())
        );
    }

    #[test]
    fn test_suffix_variants_do_not_collide() {
        assert_ne!(extract_model_key("Core i9-14900K"), extract_model_key("Core i9-14900KF"));
        assert_ne!(extract_model_key("Ryzen 9 9950X"), extract_model_key("Ryzen 9 9950X3D"));
    }

    #[test]
    fn test_amd_keys() {
        assert_eq!(extract_model_key("AMD Ryzen 9 9950X3D"), Some("ryzen9 9950x3d".to_string()));
        assert_eq!(
            extract_model_key("AMD Ryzen 7 PRO 5850U"),
            Some("ryzen7 pro5850u".to_string())
        );
        assert_eq!(
            extract_model_key("AMD Ryzen AI 9 HX 370"),
            Some("ryzen9 hx370".to_string())
        );
        assert_eq!(
            extract_model_key("AMD Ryzen Threadripper PRO 7995WX 96-Core Processor"),
            Some("threadripper pro7995wx".to_string())
        );
        assert_eq!(extract_model_key("AMD EPYC 9654"), Some("epyc 9654".to_string()));
        assert_eq!(
            extract_model_key("AMD Athlon Gold 3150U"),
            Some("athlon gold3150u".to_string())
        );
    }

    #[test]
    fn test_xeon_keys() {
        assert_eq!(extract_model_key("Intel Xeon Gold 6338"), Some("xeongold 6338".to_string()));
        assert_eq!(extract_model_key("Intel Xeon E5-2690 v4"), Some("xeone5 2690v4".to_string()));
        assert_eq!(
            extract_model_key("Intel® Xeon® Platinum 8480+ Processor"),
            Some("xeonplatinum 8480+".to_string())
        );
    }

    #[test]
    fn test_fallback_digit_run() {
        let extractor = ModelKeyExtractor::default();
        let key = extractor.extract("Intel Core 2 Duo E8400").unwrap();
        assert_eq!(key.family, None);
        assert_eq!(key.to_string(), "8400");
        assert_eq!(extract_model_key("Phenom II X6 1100T"), Some("1100".to_string()));
    }

    #[test]
    fn test_no_key() {
        assert_eq!(extract_model_key("Apple M3 Max"), None);
        assert_eq!(extract_model_key(""), None);
        // Six digits is not a model number
        assert_eq!(extract_model_key("Part 123456"), None);
    }

    #[test]
    fn test_custom_pattern_first() {
        let extra =
            ModelPattern::new("snapdragon", r"\bsnapdragon\s+x\s+(?P<model>elite|plus)").unwrap();
        let extractor = ModelKeyExtractor::with_patterns_first(vec![extra]);
        assert_eq!(
            extractor.extract_model_key("Qualcomm Snapdragon X Elite"),
            Some("snapdragon elite".to_string())
        );
        assert_eq!(extractor.extract_model_key("Core i5-12400"), Some("i5 12400".to_string()));
    }
}
