//! Core data models for CPU specification merging.
//!
//! This module contains the record types exchanged with collectors and
//! storage, the declarative field table every merge policy iterates over,
//! and the run statistics reported to callers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::Result;
use crate::sources::SourcePriority;

// ============================================================================
// Identity
// ============================================================================

/// CPU vendor as reported by a collector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Manufacturer {
    #[serde(alias = "Intel", alias = "intel")]
    Intel,
    #[serde(alias = "Amd", alias = "amd")]
    Amd,
    #[default]
    #[serde(alias = "Other", alias = "other")]
    Other,
}

impl Manufacturer {
    /// Lowercase token used when qualifying bucket keys.
    pub fn as_key(self) -> &'static str {
        match self {
            Manufacturer::Intel => "intel",
            Manufacturer::Amd => "amd",
            Manufacturer::Other => "other",
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Manufacturer::Intel => "Intel",
            Manufacturer::Amd => "AMD",
            Manufacturer::Other => "Other",
        })
    }
}

// ============================================================================
// Field Values
// ============================================================================

/// Semantic type of a specification field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Text,
    Bool,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Int | FieldKind::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Int => "integer",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::Bool => "boolean",
        }
    }
}

/// A single populated field value, type-erased for policy code.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Larger of two numeric values of the same kind; None for anything else.
    pub fn numeric_max(&self, other: &FieldValue) -> Option<FieldValue> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(FieldValue::Int(*a.max(b))),
            (FieldValue::Float(a), FieldValue::Float(b)) => Some(FieldValue::Float(a.max(*b))),
            _ => None,
        }
    }

    /// Relative disagreement `|kept - other| / |kept|` for numeric values.
    /// None when either side is non-numeric or `kept` is zero.
    pub fn relative_gap(&self, other: &FieldValue) -> Option<f64> {
        let kept = self.as_f64()?;
        let other = other.as_f64()?;
        if kept == 0.0 {
            return None;
        }
        Some((kept - other).abs() / kept.abs())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Rust types allowed in the field table.
pub trait FieldType: Sized {
    const KIND: FieldKind;
    fn into_value(self) -> FieldValue;
    fn from_value(value: FieldValue) -> Option<Self>;
}

impl FieldType for i64 {
    const KIND: FieldKind = FieldKind::Int;
    fn into_value(self) -> FieldValue {
        FieldValue::Int(self)
    }
    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::Float;
    fn into_value(self) -> FieldValue {
        FieldValue::Float(self)
    }
    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(v) => Some(v),
            FieldValue::Int(v) => Some(v as f64),
            _ => None,
        }
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;
    fn into_value(self) -> FieldValue {
        FieldValue::Text(self)
    }
    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;
    fn into_value(self) -> FieldValue {
        FieldValue::Bool(self)
    }
    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

// ============================================================================
// Field Table
// ============================================================================

/// Declares every merge-mutable field once and generates the storage struct,
/// the `Field` descriptor enum and typed accessors from it.
macro_rules! spec_fields {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty => $variant:ident ),* $(,)?) => {
        /// Optional specification fields. Every one of them is merge-mutable.
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        pub struct SpecFields {
            $(
                $(#[$meta])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        /// Descriptor for one entry of [`SpecFields`].
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Field {
            $( $variant, )*
        }

        impl Field {
            /// Every field, in declaration order.
            pub const ALL: &'static [Field] = &[ $( Field::$variant, )* ];

            pub fn name(self) -> &'static str {
                match self {
                    $( Field::$variant => stringify!($field), )*
                }
            }

            pub fn kind(self) -> FieldKind {
                match self {
                    $( Field::$variant => <$ty as FieldType>::KIND, )*
                }
            }
        }

        impl SpecFields {
            pub fn get(&self, field: Field) -> Option<FieldValue> {
                match field {
                    $( Field::$variant => self.$field.clone().map(FieldType::into_value), )*
                }
            }

            /// Store `value` into `field`. Returns false (and leaves the field
            /// untouched) when the value has the wrong kind.
            pub fn set(&mut self, field: Field, value: FieldValue) -> bool {
                match field {
                    $(
                        Field::$variant => match <$ty as FieldType>::from_value(value) {
                            Some(v) => {
                                self.$field = Some(v);
                                true
                            }
                            None => false,
                        },
                    )*
                }
            }
        }
    };
}

spec_fields! {
    /// Unique ID from the source (ARK ID, etc.)
    source_id: String => SourceId,
    source_url: String => SourceUrl,

    // Core configuration
    cores: i64 => Cores,
    threads: i64 => Threads,
    /// Performance cores (hybrid designs)
    p_cores: i64 => PCores,
    /// Efficiency cores (hybrid designs)
    e_cores: i64 => ECores,

    // Clocks (MHz)
    base_clock: i64 => BaseClock,
    boost_clock: i64 => BoostClock,
    p_core_base_clock: i64 => PCoreBaseClock,
    p_core_boost_clock: i64 => PCoreBoostClock,
    e_core_base_clock: i64 => ECoreBaseClock,
    e_core_boost_clock: i64 => ECoreBoostClock,

    // Cache (KB)
    l1_cache: i64 => L1Cache,
    l2_cache: i64 => L2Cache,
    l3_cache: i64 => L3Cache,

    // Power (W)
    tdp: i64 => Tdp,
    base_power: i64 => BasePower,
    max_turbo_power: i64 => MaxTurboPower,

    // Architecture
    codename: String => Codename,
    microarchitecture: String => Microarchitecture,
    generation: String => Generation,
    socket_name: String => SocketName,
    process_node: String => ProcessNode,

    // Physical
    transistors_million: i64 => TransistorsMillion,
    die_size_mm2: f64 => DieSizeMm2,

    // Memory
    memory_type: String => MemoryType,
    memory_channels: i64 => MemoryChannels,
    max_memory_gb: i64 => MaxMemoryGb,
    memory_speed: String => MemorySpeed,

    // Graphics
    has_integrated_gpu: bool => HasIntegratedGpu,
    integrated_gpu_name: String => IntegratedGpuName,

    // PCIe
    pcie_version: String => PcieVersion,
    pcie_lanes: i64 => PcieLanes,

    // Launch and pricing
    launch_date: String => LaunchDate,
    launch_msrp: f64 => LaunchMsrp,
    current_price: f64 => CurrentPrice,

    // Status
    is_released: bool => IsReleased,
    is_discontinued: bool => IsDiscontinued,

    // Benchmarks
    geekbench_single: i64 => GeekbenchSingle,
    geekbench_multi: i64 => GeekbenchMulti,
    passmark_single: i64 => PassmarkSingle,
    passmark_multi: i64 => PassmarkMulti,
    cinebench_single: i64 => CinebenchSingle,
    cinebench_multi: i64 => CinebenchMulti,

    // Media
    image_url: String => ImageUrl,
}

impl SpecFields {
    /// Number of populated fields.
    pub fn populated_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| wanted.to_string())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Names that identify a record rather than describe it. They always come
/// from the highest-priority record and are never part of [`Field`].
pub const IDENTITY_FIELDS: &[&str] = &["name", "manufacturer", "source"];

// ============================================================================
// Records
// ============================================================================

/// `"name": null` from a collector deserializes as an empty name, which the
/// engine then reports as malformed instead of failing the whole batch.
fn nullable_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// One provider's view of one CPU.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecificationRecord {
    /// Name as reported by the source, not canonicalized.
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default)]
    pub manufacturer: Manufacturer,
    /// Identifier of the originating collector.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_priority: SourcePriority,
    /// Observation time (unix seconds), used by the prefer-recent policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<i64>,
    #[serde(flatten)]
    pub fields: SpecFields,
    /// Opaque payload kept for audit. Never read by merge logic.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub raw_data: serde_json::Map<String, serde_json::Value>,
}

impl SpecificationRecord {
    pub fn new(
        name: impl Into<String>,
        manufacturer: Manufacturer,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            manufacturer,
            source: source.into(),
            source_priority: SourcePriority::default(),
            scraped_at: None,
            fields: SpecFields::default(),
            raw_data: serde_json::Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: SourcePriority) -> Self {
        self.source_priority = priority;
        self
    }

    pub fn with_scraped_at(mut self, unix_secs: i64) -> Self {
        self.scraped_at = Some(unix_secs);
        self
    }

    /// Builder-style field setter. Values of the wrong kind are ignored.
    pub fn with(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.fields.set(field, value.into());
        self
    }

    pub fn get(&self, field: Field) -> Option<FieldValue> {
        self.fields.get(field)
    }

    /// Total precedence order among records: tier, source, name, observation
    /// time, then content. Identical keys mean interchangeable records, so
    /// sorting by this never depends on arrival order.
    pub fn precedence_key(&self) -> (SourcePriority, String, String, Option<i64>, String) {
        let content = serde_json::to_string(&(&self.fields, &self.raw_data)).unwrap_or_default();
        (
            self.source_priority,
            self.source.clone(),
            self.name.clone(),
            self.scraped_at,
            content,
        )
    }

    /// A record without a usable name cannot be grouped.
    pub fn is_malformed(&self) -> bool {
        self.name.trim().is_empty()
    }
}

/// Output of one collector run, as handed to the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectorBatch {
    pub source: String,
    /// Tier override. When absent the source catalog decides.
    #[serde(default)]
    pub priority: Option<SourcePriority>,
    #[serde(default)]
    pub records: Vec<SpecificationRecord>,
}

/// Records believed to describe the same physical CPU.
/// Members are ordered by source priority, most authoritative first.
#[derive(Clone, Debug, PartialEq)]
pub struct EquivalenceGroup {
    /// Model key, manufacturer-qualified digit key, or `name:` + canonical name.
    pub key: String,
    pub members: Vec<SpecificationRecord>,
}

impl EquivalenceGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn anchor(&self) -> Option<&SpecificationRecord> {
        self.members.first()
    }
}

/// Result of merging one equivalence group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergedRecord {
    /// Recommended storage identity.
    pub canonical_key: String,
    #[serde(flatten)]
    pub record: SpecificationRecord,
    /// Distinct contributing sources, most authoritative first.
    pub contributors: Vec<String>,
    pub gaps_filled: usize,
    pub conflicts_resolved: usize,
    pub quality_score: f64,
    /// Missing weighted fields, most important first.
    pub missing_fields: Vec<&'static str>,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Non-fatal finding reported back to the caller.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Record dropped before grouping.
    MalformedRecord {
        index: usize,
        source: String,
        reason: String,
    },
    /// Numeric disagreement above 10% of the kept value.
    SignificantConflict {
        key: String,
        field: Field,
        kept: FieldValue,
        rejected: FieldValue,
        kept_source: String,
        rejected_source: String,
    },
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for one merge run.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub total_input: usize,
    /// Malformed records dropped before grouping.
    pub skipped: usize,
    /// Output records (one per equivalence group).
    pub groups: usize,
    /// Groups with more than one contributing record.
    pub merged: usize,
    pub conflicts_resolved: usize,
    pub gaps_filled: usize,
    /// Output records scoring below the review threshold.
    pub low_quality: usize,
}

impl MergeStats {
    /// Share of output records that combine several sources, as a percentage.
    pub fn merge_rate(&self) -> f64 {
        if self.groups == 0 {
            0.0
        } else {
            100.0 * self.merged as f64 / self.groups as f64
        }
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
