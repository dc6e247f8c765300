//! Grouping records from all sources into equivalence groups.
//!
//! Exact bucketing by key is O(n). Only records without any model key fall
//! through to similarity scoring against existing group anchors.

use rustc_hash::FxHashMap;

use crate::config::MergeConfig;
use crate::models::{EquivalenceGroup, SpecificationRecord};
use crate::scoring::CpuMatcher;

/// Prefix marking a bucket keyed by canonical name.
pub const NAME_KEY_PREFIX: &str = "name:";

/// How a record was bucketed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketKey {
    /// Family pattern key, e.g. `i9 14900k`
    Model(String),
    /// Digit-run fallback qualified by manufacturer, e.g. `intel#7400`
    Digits(String),
    /// Canonical name, e.g. `name:m3 max`
    Name(String),
}

impl BucketKey {
    pub fn as_str(&self) -> &str {
        match self {
            BucketKey::Model(k) | BucketKey::Digits(k) | BucketKey::Name(k) => k,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            BucketKey::Model(k) | BucketKey::Digits(k) | BucketKey::Name(k) => k,
        }
    }
}

/// Bucket key for one record.
pub fn bucket_key(matcher: &CpuMatcher, record: &SpecificationRecord) -> BucketKey {
    match matcher.model_key(&record.name) {
        Some(key) if key.has_family() => BucketKey::Model(key.to_string()),
        Some(key) => BucketKey::Digits(format!("{}#{}", record.manufacturer.as_key(), key.model)),
        None => BucketKey::Name(format!("{}{}", NAME_KEY_PREFIX, matcher.normalize(&record.name))),
    }
}

/// Partitions records into equivalence groups.
pub struct Grouper<'a> {
    matcher: &'a CpuMatcher,
    config: &'a MergeConfig,
}

impl<'a> Grouper<'a> {
    pub fn new(matcher: &'a CpuMatcher, config: &'a MergeConfig) -> Self {
        Self { matcher, config }
    }

    /// Every input record ends up in exactly one group. Groups come out in
    /// first-seen order after sorting by `precedence_key`; members keep that
    /// order, so `members[0]` is the most authoritative record.
    pub fn group(&self, mut records: Vec<SpecificationRecord>) -> Vec<EquivalenceGroup> {
        records.sort_by_cached_key(SpecificationRecord::precedence_key);

        let mut groups: Vec<EquivalenceGroup> = Vec::new();
        let mut index: FxHashMap<String, usize> = FxHashMap::default();

        for record in records {
            let key = bucket_key(self.matcher, &record);

            if let Some(&slot) = index.get(key.as_str()) {
                groups[slot].members.push(record);
                continue;
            }

            if matches!(key, BucketKey::Name(_)) && self.config.fuzzy_grouping() {
                if let Some(slot) = self.closest_group(&record, &groups) {
                    tracing::debug!(
                        name = %record.name,
                        group = %groups[slot].key,
                        "joined group by similarity"
                    );
                    index.insert(key.into_string(), slot);
                    groups[slot].members.push(record);
                    continue;
                }
            }

            let key = key.into_string();
            index.insert(key.clone(), groups.len());
            groups.push(EquivalenceGroup {
                key,
                members: vec![record],
            });
        }

        groups
    }

    /// Group whose anchor scores highest against `record`, if any reaches the
    /// match threshold. Ties go to the earlier group.
    fn closest_group(
        &self,
        record: &SpecificationRecord,
        groups: &[EquivalenceGroup],
    ) -> Option<usize> {
        let threshold = self.config.name_match_threshold();
        let mut best: Option<(usize, f64)> = None;

        for (slot, group) in groups.iter().enumerate() {
            let Some(anchor) = group.anchor() else {
                continue;
            };
            let score = self.matcher.score(&record.name, &anchor.name);
            if score >= threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((slot, score));
            }
        }

        best.map(|(slot, _)| slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Manufacturer;
    use crate::sources::SourcePriority;

    fn rec(
        name: &str,
        mfr: Manufacturer,
        source: &str,
        priority: SourcePriority,
    ) -> SpecificationRecord {
        SpecificationRecord::new(name, mfr, source).with_priority(priority)
    }

    fn sample() -> Vec<SpecificationRecord> {
        vec![
            rec("Core i9-14900K", Manufacturer::Intel, "techpowerup", SourcePriority::Primary),
            rec(
                "AMD Ryzen 9 9950X3D",
                Manufacturer::Amd,
                "passmark",
                SourcePriority::BenchmarkOnly,
            ),
            rec("Intel Core i9-14900K", Manufacturer::Intel, "intel_ark", SourcePriority::Official),
            rec("Ryzen 9 9950X3D", Manufacturer::Amd, "amd_specs", SourcePriority::Official),
            rec("Atom 7400", Manufacturer::Intel, "kaggle", SourcePriority::Secondary),
            rec("Opteron 7400", Manufacturer::Amd, "kaggle", SourcePriority::Secondary),
            rec("Apple M3 Max", Manufacturer::Other, "nanoreview", SourcePriority::Secondary),
        ]
    }

    #[test]
    fn test_groups_form_a_partition() {
        let matcher = CpuMatcher::default();
        let config = MergeConfig::default();
        let input = sample();
        let groups = Grouper::new(&matcher, &config).group(input.clone());

        let mut seen: Vec<String> = groups
            .iter()
            .flat_map(|g| g.members.iter().map(|r| format!("{}|{}", r.source, r.name)))
            .collect();
        let mut expected: Vec<String> =
            input.iter().map(|r| format!("{}|{}", r.source, r.name)).collect();
        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);
        assert!(groups.iter().all(|g| !g.is_empty()));
    }

    #[test]
    fn test_anchor_is_highest_priority() {
        let matcher = CpuMatcher::default();
        let config = MergeConfig::default();
        let groups = Grouper::new(&matcher, &config).group(sample());

        let intel = groups.iter().find(|g| g.key == "i9 14900k").unwrap();
        assert_eq!(intel.len(), 2);
        assert_eq!(intel.members[0].source, "intel_ark");

        let amd = groups.iter().find(|g| g.key == "ryzen9 9950x3d").unwrap();
        assert_eq!(amd.members[0].source, "amd_specs");
        assert_eq!(amd.members[1].source, "passmark");
    }

    #[test]
    fn test_digit_keys_are_manufacturer_qualified() {
        let matcher = CpuMatcher::default();
        let config = MergeConfig::default();
        let groups = Grouper::new(&matcher, &config).group(sample());

        // Same digit run, different vendors
        assert!(groups.iter().any(|g| g.key == "intel#7400"));
        assert!(groups.iter().any(|g| g.key == "amd#7400"));
        assert_eq!(groups.len(), 5);
    }

    #[test]
    fn test_group_order_independent_of_input_order() {
        let matcher = CpuMatcher::default();
        let config = MergeConfig::default();
        let grouper = Grouper::new(&matcher, &config);

        let mut reversed = sample();
        reversed.reverse();
        let a: Vec<String> = grouper.group(sample()).into_iter().map(|g| g.key).collect();
        let b: Vec<String> = grouper.group(reversed).into_iter().map(|g| g.key).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_keyless_record_joins_by_similarity() {
        let matcher = CpuMatcher::default();
        let config = MergeConfig::default();
        let records = vec![
            rec("Snapdragon X Elite", Manufacturer::Other, "nanoreview", SourcePriority::Secondary),
            rec(
                "Snapdragon X Elite X1E",
                Manufacturer::Other,
                "geekbench",
                SourcePriority::BenchmarkOnly,
            ),
            rec("Apple M3", Manufacturer::Other, "geekbench", SourcePriority::BenchmarkOnly),
        ];
        let groups = Grouper::new(&matcher, &config).group(records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "name:snapdragon x elite");
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_fuzzy_grouping_can_be_disabled() {
        let matcher = CpuMatcher::default();
        let config = MergeConfig::default().with_fuzzy_grouping(false);
        let records = vec![
            rec("Snapdragon X Elite", Manufacturer::Other, "nanoreview", SourcePriority::Secondary),
            rec(
                "Snapdragon X Elite X1E",
                Manufacturer::Other,
                "geekbench",
                SourcePriority::BenchmarkOnly,
            ),
        ];
        let groups = Grouper::new(&matcher, &config).group(records);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_keyed_records_never_fuzzy_join() {
        let matcher = CpuMatcher::default();
        let config = MergeConfig::default();
        let records = vec![
            rec("Intel Core i9-14900K", Manufacturer::Intel, "intel_ark", SourcePriority::Official),
            rec(
                "Intel Core i9-14900KF",
                Manufacturer::Intel,
                "intel_ark",
                SourcePriority::Official,
            ),
        ];
        let groups = Grouper::new(&matcher, &config).group(records);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let matcher = CpuMatcher::default();
        let config = MergeConfig::default();
        assert!(Grouper::new(&matcher, &config).group(Vec::new()).is_empty());
    }
}
