//! Field-level merging within one equivalence group.
//!
//! The highest-priority member is the base. Lower-priority members fill its
//! null fields and, where they disagree, go through the field's policy.

use rustc_hash::FxHashMap;

use crate::config::{FieldPolicy, MergeConfig};
use crate::error::{MergeError, Result};
use crate::models::{Diagnostic, EquivalenceGroup, Field, FieldValue, SpecificationRecord};

/// Numeric disagreement (relative to the kept value) worth reporting.
pub const SIGNIFICANT_CONFLICT_RATIO: f64 = 0.10;

/// Output of merging one group, before quality scoring.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupMerge {
    pub record: SpecificationRecord,
    /// Distinct sources, most authoritative first.
    pub contributors: Vec<String>,
    pub member_count: usize,
    pub gaps_filled: usize,
    pub conflicts_resolved: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Composite provenance label, e.g. `merged(intel_ark,techpowerup)`.
pub fn merged_source_label(contributors: &[String]) -> String {
    format!("merged({})", contributors.join(","))
}

/// True when an observation at `incoming` is strictly later than one at
/// `current`. A dated observation beats an undated one; undated never wins.
fn observed_later(incoming: Option<i64>, current: Option<i64>) -> bool {
    match (incoming, current) {
        (Some(i), Some(c)) => i > c,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

pub struct FieldMerger<'a> {
    config: &'a MergeConfig,
}

impl<'a> FieldMerger<'a> {
    pub fn new(config: &'a MergeConfig) -> Self {
        Self { config }
    }

    pub fn merge_group(&self, group: &EquivalenceGroup) -> Result<GroupMerge> {
        let mut members: Vec<&SpecificationRecord> = group.members.iter().collect();
        members.sort_by_cached_key(|r| r.precedence_key());

        let (base, rest) = members
            .split_first()
            .ok_or_else(|| MergeError::EmptyGroup(group.key.clone()))?;

        let mut result = (*base).clone();
        let mut contributors = vec![base.source.clone()];

        // Observation time of each field's current value
        let mut observed: FxHashMap<Field, Option<i64>> = FxHashMap::default();
        for field in Field::ALL {
            if result.fields.get(*field).is_some() {
                observed.insert(*field, base.scraped_at);
            }
        }

        let mut gaps_filled = 0;
        let mut conflicts_resolved = 0;
        let mut diagnostics = Vec::new();
        let mut source_of: FxHashMap<Field, &str> = FxHashMap::default();

        for member in rest {
            if !contributors.contains(&member.source) {
                contributors.push(member.source.clone());
            }

            for &field in Field::ALL {
                let Some(incoming) = member.fields.get(field) else {
                    continue;
                };
                let policy = self.config.policy_for(field);
                if policy == FieldPolicy::Protected {
                    continue;
                }

                let Some(current) = result.fields.get(field) else {
                    result.fields.set(field, incoming);
                    observed.insert(field, member.scraped_at);
                    source_of.insert(field, &member.source);
                    gaps_filled += 1;
                    continue;
                };
                if current == incoming {
                    continue;
                }

                conflicts_resolved += 1;
                let kept_source = source_of.get(&field).copied().unwrap_or(base.source.as_str());

                match policy {
                    FieldPolicy::PreferHigher => {
                        if let Some(max) = current.numeric_max(&incoming) {
                            if max != current {
                                result.fields.set(field, max);
                                observed.insert(field, member.scraped_at);
                                source_of.insert(field, &member.source);
                            }
                        }
                    }
                    FieldPolicy::TrueWins => {
                        if let (Some(a), Some(b)) = (current.as_bool(), incoming.as_bool()) {
                            result.fields.set(field, FieldValue::Bool(a || b));
                        }
                    }
                    FieldPolicy::PreferRecent => {
                        let current_seen = observed.get(&field).copied().flatten();
                        if observed_later(member.scraped_at, current_seen) {
                            result.fields.set(field, incoming);
                            observed.insert(field, member.scraped_at);
                            source_of.insert(field, &member.source);
                        }
                    }
                    FieldPolicy::FirstWins | FieldPolicy::Protected => {
                        if let Some(gap) = current.relative_gap(&incoming) {
                            if gap > SIGNIFICANT_CONFLICT_RATIO {
                                tracing::debug!(
                                    key = %group.key,
                                    field = field.name(),
                                    kept = %current,
                                    rejected = %incoming,
                                    kept_source,
                                    rejected_source = %member.source,
                                    "significant conflict"
                                );
                                diagnostics.push(Diagnostic::SignificantConflict {
                                    key: group.key.clone(),
                                    field,
                                    kept: current,
                                    rejected: incoming,
                                    kept_source: kept_source.to_string(),
                                    rejected_source: member.source.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }

        if contributors.len() > 1 {
            result.source = merged_source_label(&contributors);
        }
        result.scraped_at = members.iter().filter_map(|r| r.scraped_at).max();

        Ok(GroupMerge {
            record: result,
            contributors,
            member_count: members.len(),
            gaps_filled,
            conflicts_resolved,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Manufacturer;
    use crate::sources::SourcePriority;

    fn group(members: Vec<SpecificationRecord>) -> EquivalenceGroup {
        EquivalenceGroup {
            key: "test".to_string(),
            members,
        }
    }

    fn intel(name: &str, source: &str, priority: SourcePriority) -> SpecificationRecord {
        SpecificationRecord::new(name, Manufacturer::Intel, source).with_priority(priority)
    }

    #[test]
    fn test_gap_fill_from_lower_priority() {
        let config = MergeConfig::default();
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![
                intel("Intel Core i9-14900K", "intel_ark", SourcePriority::Official)
                    .with(Field::Cores, 24)
                    .with(Field::Tdp, 125),
                intel("Core i9-14900K", "techpowerup", SourcePriority::Primary)
                    .with(Field::Cores, 24)
                    .with(Field::L3Cache, 36864)
                    .with(Field::TransistorsMillion, 8000),
            ]))
            .unwrap();

        let f = &merged.record.fields;
        assert_eq!(f.cores, Some(24));
        assert_eq!(f.tdp, Some(125));
        assert_eq!(f.l3_cache, Some(36864));
        assert_eq!(f.transistors_million, Some(8000));
        assert_eq!(merged.gaps_filled, 2);
        assert_eq!(merged.conflicts_resolved, 0);
        assert_eq!(merged.record.source, "merged(intel_ark,techpowerup)");
    }

    #[test]
    fn test_base_chosen_by_priority_not_position() {
        let config = MergeConfig::default();
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![
                intel("Core i5-12400", "kaggle", SourcePriority::Secondary)
                    .with(Field::SourceId, "k-1")
                    .with(Field::BaseClock, 2600),
                intel("Intel Core i5-12400", "intel_ark", SourcePriority::Official)
                    .with(Field::SourceId, "134586")
                    .with(Field::BaseClock, 2500),
            ]))
            .unwrap();

        assert_eq!(merged.record.name, "Intel Core i5-12400");
        assert_eq!(merged.record.fields.source_id.as_deref(), Some("134586"));
        assert_eq!(merged.record.fields.base_clock, Some(2500));
        assert_eq!(merged.contributors, vec!["intel_ark", "kaggle"]);
        assert_eq!(merged.conflicts_resolved, 1);
    }

    #[test]
    fn test_prefer_higher_takes_max() {
        let config = MergeConfig::default();
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![
                SpecificationRecord::new("AMD Ryzen 9 9950X3D", Manufacturer::Amd, "amd_specs")
                    .with_priority(SourcePriority::Official)
                    .with(Field::PassmarkMulti, 65000),
                SpecificationRecord::new("AMD Ryzen 9 9950X3D", Manufacturer::Amd, "passmark")
                    .with_priority(SourcePriority::BenchmarkOnly)
                    .with(Field::PassmarkMulti, 67000),
            ]))
            .unwrap();

        assert_eq!(merged.record.fields.passmark_multi, Some(67000));
        assert_eq!(merged.conflicts_resolved, 1);
        assert!(merged.diagnostics.is_empty());
    }

    #[test]
    fn test_true_wins_for_flags() {
        let config = MergeConfig::default();
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![
                intel("Core i7-7700K", "intel_ark", SourcePriority::Official)
                    .with(Field::IsDiscontinued, false)
                    .with(Field::HasIntegratedGpu, true),
                intel("Core i7-7700K", "pcpartpicker", SourcePriority::Secondary)
                    .with(Field::IsDiscontinued, true)
                    .with(Field::HasIntegratedGpu, false),
            ]))
            .unwrap();

        assert_eq!(merged.record.fields.is_discontinued, Some(true));
        assert_eq!(merged.record.fields.has_integrated_gpu, Some(true));
        assert_eq!(merged.conflicts_resolved, 2);
    }

    #[test]
    fn test_prefer_recent_uses_observation_time() {
        let config = MergeConfig::default();
        let base = intel("Core i5-13400", "intel_ark", SourcePriority::Official)
            .with_scraped_at(1_700_000_000)
            .with(Field::CurrentPrice, 229.0);

        let newer = intel("Core i5-13400", "pcpartpicker", SourcePriority::Secondary)
            .with_scraped_at(1_710_000_000)
            .with(Field::CurrentPrice, 189.0);
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![base.clone(), newer]))
            .unwrap();
        assert_eq!(merged.record.fields.current_price, Some(189.0));
        assert_eq!(merged.record.scraped_at, Some(1_710_000_000));

        let older = intel("Core i5-13400", "pcpartpicker", SourcePriority::Secondary)
            .with_scraped_at(1_600_000_000)
            .with(Field::CurrentPrice, 259.0);
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![base.clone(), older]))
            .unwrap();
        assert_eq!(merged.record.fields.current_price, Some(229.0));

        let undated = intel("Core i5-13400", "pcpartpicker", SourcePriority::Secondary)
            .with(Field::CurrentPrice, 199.0);
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![base, undated]))
            .unwrap();
        assert_eq!(merged.record.fields.current_price, Some(229.0));
    }

    #[test]
    fn test_significant_conflict_is_reported_not_applied() {
        let config = MergeConfig::default();
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![
                intel("Core i9-13900K", "intel_ark", SourcePriority::Official)
                    .with(Field::Tdp, 125),
                intel("Core i9-13900K", "kaggle", SourcePriority::Secondary).with(Field::Tdp, 253),
                intel("Core i9-13900K", "nanoreview", SourcePriority::Secondary)
                    .with(Field::Tdp, 130),
            ]))
            .unwrap();

        assert_eq!(merged.record.fields.tdp, Some(125));
        assert_eq!(merged.conflicts_resolved, 2);
        assert_eq!(merged.diagnostics.len(), 1);
        match &merged.diagnostics[0] {
            Diagnostic::SignificantConflict { field, kept, rejected, rejected_source, .. } => {
                assert_eq!(*field, Field::Tdp);
                assert_eq!(*kept, FieldValue::Int(125));
                assert_eq!(*rejected, FieldValue::Int(253));
                assert_eq!(rejected_source, "kaggle");
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn test_protected_fields_never_overwritten() {
        let config = MergeConfig::default();
        let merged = FieldMerger::new(&config)
            .merge_group(&group(vec![
                intel("Intel Core i3-12100", "intel_ark", SourcePriority::Official),
                intel("Core i3-12100", "techpowerup", SourcePriority::Primary)
                    .with(Field::SourceId, "tpu-99"),
            ]))
            .unwrap();

        assert_eq!(merged.record.name, "Intel Core i3-12100");
        assert_eq!(merged.record.manufacturer, Manufacturer::Intel);
        assert_eq!(merged.record.fields.source_id, None);
        assert_eq!(merged.gaps_filled, 0);
    }

    #[test]
    fn test_singleton_passes_through() {
        let config = MergeConfig::default();
        let only =
            intel("Core i3-12100", "techpowerup", SourcePriority::Primary).with(Field::Cores, 4);
        let merged = FieldMerger::new(&config).merge_group(&group(vec![only.clone()])).unwrap();
        assert_eq!(merged.record, only);
        assert_eq!(merged.member_count, 1);
    }

    #[test]
    fn test_merge_is_deterministic_and_monotonic() {
        let config = MergeConfig::default();
        let g = group(vec![
            intel("Core Ultra 9 285K", "intel_ark", SourcePriority::Official)
                .with(Field::Cores, 24)
                .with(Field::Tdp, 125),
            intel("Core Ultra 9 285K", "techpowerup", SourcePriority::Primary)
                .with(Field::Cores, 20)
                .with(Field::L2Cache, 40960),
            intel("Core Ultra 9 285K", "geekbench", SourcePriority::BenchmarkOnly)
                .with(Field::GeekbenchSingle, 3200),
        ]);
        let merger = FieldMerger::new(&config);
        let first = merger.merge_group(&g).unwrap();
        let second = merger.merge_group(&g).unwrap();
        assert_eq!(first, second);
        assert!(first.record.fields.populated_count() >= g.members[0].fields.populated_count());
        assert_eq!(first.record.fields.cores, Some(24));
    }

    #[test]
    fn test_same_source_duplicates_merge_the_same_in_any_order() {
        let config = MergeConfig::default();
        let a = intel("Core i5-12400", "kaggle", SourcePriority::Secondary).with(Field::Tdp, 65);
        let b = intel("Core i5-12400", "kaggle", SourcePriority::Secondary).with(Field::Tdp, 117);

        let merger = FieldMerger::new(&config);
        let forward = merger.merge_group(&group(vec![a.clone(), b.clone()])).unwrap();
        let backward = merger.merge_group(&group(vec![b, a])).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.record.fields.tdp, Some(117));
    }

    #[test]
    fn test_empty_group_is_an_error() {
        let config = MergeConfig::default();
        let result = FieldMerger::new(&config).merge_group(&group(Vec::new()));
        assert!(matches!(result, Err(MergeError::EmptyGroup(key)) if key == "test"));
    }
}
