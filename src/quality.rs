//! Weighted completeness scoring for merged records.

use crate::models::{Field, SpecificationRecord};

/// A field that contributes to completeness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightedField {
    Name,
    Manufacturer,
    Spec(Field),
}

impl WeightedField {
    pub fn name(self) -> &'static str {
        match self {
            WeightedField::Name => "name",
            WeightedField::Manufacturer => "manufacturer",
            WeightedField::Spec(field) => field.name(),
        }
    }

    fn is_present(self, record: &SpecificationRecord) -> bool {
        match self {
            WeightedField::Name => !record.name.trim().is_empty(),
            // Always set; an unrecognized vendor still identifies the record
            WeightedField::Manufacturer => true,
            WeightedField::Spec(field) => record.fields.get(field).is_some(),
        }
    }
}

/// Identification first, benchmarks last.
pub const DEFAULT_WEIGHTS: &[(WeightedField, u32)] = &[
    (WeightedField::Name, 10),
    (WeightedField::Manufacturer, 10),
    (WeightedField::Spec(Field::Cores), 8),
    (WeightedField::Spec(Field::Threads), 8),
    (WeightedField::Spec(Field::BaseClock), 8),
    (WeightedField::Spec(Field::BoostClock), 7),
    (WeightedField::Spec(Field::Tdp), 7),
    (WeightedField::Spec(Field::L2Cache), 5),
    (WeightedField::Spec(Field::L3Cache), 5),
    (WeightedField::Spec(Field::SocketName), 5),
    (WeightedField::Spec(Field::ProcessNode), 5),
    (WeightedField::Spec(Field::MemoryType), 4),
    (WeightedField::Spec(Field::LaunchDate), 4),
    (WeightedField::Spec(Field::LaunchMsrp), 3),
    (WeightedField::Spec(Field::PcieVersion), 3),
    (WeightedField::Spec(Field::PcieLanes), 2),
    (WeightedField::Spec(Field::TransistorsMillion), 2),
    (WeightedField::Spec(Field::DieSizeMm2), 2),
    (WeightedField::Spec(Field::GeekbenchSingle), 2),
    (WeightedField::Spec(Field::GeekbenchMulti), 2),
    (WeightedField::Spec(Field::PassmarkSingle), 2),
    (WeightedField::Spec(Field::PassmarkMulti), 2),
    (WeightedField::Spec(Field::CinebenchSingle), 2),
    (WeightedField::Spec(Field::CinebenchMulti), 2),
];

#[derive(Clone, Debug, PartialEq)]
pub struct QualityReport {
    /// Weighted completeness in [0, 1]
    pub score: f64,
    /// Missing weighted fields, heaviest first
    pub missing: Vec<&'static str>,
}

#[derive(Clone, Debug)]
pub struct QualityScorer {
    weights: Vec<(WeightedField, u32)>,
    total: u32,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHTS.to_vec())
    }
}

impl QualityScorer {
    pub fn new(weights: Vec<(WeightedField, u32)>) -> Self {
        let total = weights.iter().map(|(_, w)| *w).sum();
        Self { weights, total }
    }

    pub fn weights(&self) -> &[(WeightedField, u32)] {
        &self.weights
    }

    pub fn score(&self, record: &SpecificationRecord) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let present: u32 = self
            .weights
            .iter()
            .filter(|(f, _)| f.is_present(record))
            .map(|(_, w)| *w)
            .sum();
        present as f64 / self.total as f64
    }

    /// Missing fields sorted by weight, descending. Equal weights keep table order.
    pub fn missing_fields(&self, record: &SpecificationRecord) -> Vec<&'static str> {
        let mut missing: Vec<(WeightedField, u32)> = self
            .weights
            .iter()
            .copied()
            .filter(|(f, _)| !f.is_present(record))
            .collect();
        missing.sort_by(|a, b| b.1.cmp(&a.1));
        missing.into_iter().map(|(f, _)| f.name()).collect()
    }

    pub fn assess(&self, record: &SpecificationRecord) -> QualityReport {
        QualityReport {
            score: self.score(record),
            missing: self.missing_fields(record),
        }
    }
}
