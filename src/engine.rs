//! Merge run orchestration: ingest, validate, group, merge, score.
//!
//! The engine is synchronous and does no I/O. It emits `tracing` events;
//! with no subscriber installed those are free.

use rustc_hash::FxHashMap;

use crate::config::{FieldPolicy, MergeConfig};
use crate::error::Result;
use crate::group::{bucket_key, BucketKey, Grouper, NAME_KEY_PREFIX};
use crate::merge::FieldMerger;
use crate::models::{
    CollectorBatch, Diagnostic, EquivalenceGroup, Field, MergeStats, MergedRecord,
    SpecificationRecord,
};
use crate::quality::QualityScorer;
use crate::scoring::CpuMatcher;
use crate::sources::SourceCatalog;

/// Everything one merge run produces.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub records: Vec<MergedRecord>,
    pub stats: MergeStats,
    pub diagnostics: Vec<Diagnostic>,
}

impl MergeOutcome {
    /// Records scoring below `threshold`.
    pub fn needs_review(&self, threshold: f64) -> impl Iterator<Item = &MergedRecord> {
        self.records.iter().filter(move |r| r.quality_score < threshold)
    }
}

pub struct MergeEngine {
    config: MergeConfig,
    catalog: SourceCatalog,
    matcher: CpuMatcher,
    quality: QualityScorer,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self::with_catalog(config, SourceCatalog::default())
    }

    pub fn with_catalog(config: MergeConfig, catalog: SourceCatalog) -> Self {
        Self {
            config,
            catalog,
            matcher: CpuMatcher::default(),
            quality: QualityScorer::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: CpuMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_quality_scorer(mut self, quality: QualityScorer) -> Self {
        self.quality = quality;
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn matcher(&self) -> &CpuMatcher {
        &self.matcher
    }

    /// Flatten collector batches into one record list. Each record gets the
    /// batch's source when it has none, and the batch's tier (or the catalog
    /// tier for its source).
    pub fn ingest(&self, batches: Vec<CollectorBatch>) -> Vec<SpecificationRecord> {
        let mut records = Vec::new();
        for batch in batches {
            for mut record in batch.records {
                if record.source.trim().is_empty() {
                    record.source = batch.source.clone();
                }
                record.source_priority = batch
                    .priority
                    .unwrap_or_else(|| self.catalog.tier_for(&record.source));
                records.push(record);
            }
        }
        records
    }

    pub fn merge_batches(&self, batches: Vec<CollectorBatch>) -> MergeOutcome {
        self.merge(self.ingest(batches))
    }

    /// Run the full pipeline. Never fails: bad records are skipped and
    /// reported in the outcome.
    pub fn merge(&self, records: Vec<SpecificationRecord>) -> MergeOutcome {
        let mut stats = MergeStats {
            total_input: records.len(),
            ..Default::default()
        };
        let mut diagnostics = Vec::new();

        let mut valid = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match self.rejection_reason(&record) {
                Some(reason) => {
                    tracing::warn!(index, source = %record.source, reason, "skipping record");
                    stats.skipped += 1;
                    diagnostics.push(Diagnostic::MalformedRecord {
                        index,
                        source: record.source,
                        reason: reason.to_string(),
                    });
                }
                None => valid.push(record),
            }
        }

        let groups = self.group(valid);
        let mut merged = Vec::with_capacity(groups.len());

        for group in &groups {
            match self.merge_group_with_diagnostics(group) {
                Ok((record, group_diagnostics)) => {
                    stats.groups += 1;
                    if group.len() > 1 {
                        stats.merged += 1;
                    }
                    stats.gaps_filled += record.gaps_filled;
                    stats.conflicts_resolved += record.conflicts_resolved;
                    if record.quality_score < self.config.review_threshold() {
                        stats.low_quality += 1;
                    }
                    diagnostics.extend(group_diagnostics);
                    merged.push(record);
                }
                Err(e) => tracing::warn!(key = %group.key, error = %e, "group not merged"),
            }
        }

        tracing::info!(
            total_input = stats.total_input,
            skipped = stats.skipped,
            groups = stats.groups,
            merged = stats.merged,
            conflicts_resolved = stats.conflicts_resolved,
            gaps_filled = stats.gaps_filled,
            low_quality = stats.low_quality,
            "merge complete"
        );

        MergeOutcome {
            records: merged,
            stats,
            diagnostics,
        }
    }

    fn rejection_reason(&self, record: &SpecificationRecord) -> Option<&'static str> {
        if record.is_malformed() {
            return Some("missing name");
        }
        if let BucketKey::Name(key) = bucket_key(&self.matcher, record) {
            if key.len() == NAME_KEY_PREFIX.len() {
                return Some("name has no usable characters");
            }
        }
        None
    }

    pub fn group(&self, records: Vec<SpecificationRecord>) -> Vec<EquivalenceGroup> {
        Grouper::new(&self.matcher, &self.config).group(records)
    }

    pub fn merge_group(&self, group: &EquivalenceGroup) -> Result<MergedRecord> {
        self.merge_group_with_diagnostics(group).map(|(record, _)| record)
    }

    fn merge_group_with_diagnostics(
        &self,
        group: &EquivalenceGroup,
    ) -> Result<(MergedRecord, Vec<Diagnostic>)> {
        let merge = FieldMerger::new(&self.config).merge_group(group)?;
        let report = self.quality.assess(&merge.record);

        let record = MergedRecord {
            canonical_key: group.key.clone(),
            record: merge.record,
            contributors: merge.contributors,
            gaps_filled: merge.gaps_filled,
            conflicts_resolved: merge.conflicts_resolved,
            quality_score: report.score,
            missing_fields: report.missing,
        };
        Ok((record, merge.diagnostics))
    }

    /// Fill null fields of `primary` records from `secondary` records with the
    /// same model key. Never overwrites and never touches protected fields.
    /// Returns the filled records and the number of fields filled.
    pub fn fill_gaps(
        &self,
        primary: Vec<SpecificationRecord>,
        secondary: &[SpecificationRecord],
    ) -> (Vec<SpecificationRecord>, usize) {
        let mut by_key: FxHashMap<String, &SpecificationRecord> = FxHashMap::default();
        for record in secondary {
            if let Some(key) = self.matcher.extract_model_key(&record.name) {
                by_key.entry(key).or_insert(record);
            }
        }

        let mut filled = 0;
        let mut result = Vec::with_capacity(primary.len());
        for mut record in primary {
            let donor = self
                .matcher
                .extract_model_key(&record.name)
                .and_then(|key| by_key.get(&key).copied());

            if let Some(donor) = donor {
                for &field in Field::ALL {
                    if self.config.policy_for(field) == FieldPolicy::Protected
                        || record.fields.get(field).is_some()
                    {
                        continue;
                    }
                    if let Some(value) = donor.fields.get(field) {
                        if record.fields.set(field, value) {
                            filled += 1;
                        }
                    }
                }
            }
            result.push(record);
        }

        tracing::debug!(filled, "gap fill complete");
        (result, filled)
    }
}
