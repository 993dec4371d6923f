use std::collections::BTreeMap;
use std::fmt;
use std::io;

use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{Location, ReportError, Result};
use crate::WorkModel;

/// Version key used when a source carries no version column.
pub const DEFAULT_VERSION: &str = "default";

/// Memory-access pattern identifier as written by the benchmark: either a
/// numeric code or a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternId {
    Code(i64),
    Name(String),
}

impl PatternId {
    /// Text that is exactly a canonical integer becomes a code; anything
    /// else, including `"01"` or `"+1"`, stays a name.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.parse::<i64>() {
            Ok(code) if code.to_string() == s => PatternId::Code(code),
            _ => PatternId::Name(s.to_string()),
        }
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternId::Code(c) => write!(f, "{c}"),
            PatternId::Name(n) => f.write_str(n),
        }
    }
}

impl From<&str> for PatternId {
    fn from(s: &str) -> Self {
        PatternId::parse(s)
    }
}

impl From<i64> for PatternId {
    fn from(code: i64) -> Self {
        PatternId::Code(code)
    }
}

/// One timing measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub size: u64,
    pub threads: u32,
    pub pattern: PatternId,
    pub version: String,
    pub elapsed: f64,
    /// `elapsed` exactly as it appeared in the source. Grouping by elapsed
    /// compares this text, never the parsed float.
    pub elapsed_text: String,
}

impl TrialRecord {
    pub fn new(size: u64, threads: u32, pattern: impl Into<PatternId>, elapsed: f64) -> Self {
        Self {
            size,
            threads,
            pattern: pattern.into(),
            version: DEFAULT_VERSION.to_string(),
            elapsed,
            elapsed_text: elapsed.to_string(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Check the per-record invariants: `size > 0`, `threads >= 1`, finite `elapsed > 0`.
    pub fn validate(&self, location: Location) -> Result<()> {
        if self.size == 0 {
            return Err(ReportError::schema(location, "size must be > 0"));
        }
        if self.threads == 0 {
            return Err(ReportError::schema(location, "threads must be >= 1"));
        }
        if !(self.elapsed.is_finite() && self.elapsed > 0.0) {
            return Err(ReportError::InvalidMeasurement {
                location,
                elapsed: self.elapsed,
            });
        }
        Ok(())
    }
}

/// Validate every record, reporting the first offender by index.
pub fn validate_records(records: &[TrialRecord]) -> Result<()> {
    records
        .iter()
        .enumerate()
        .try_for_each(|(i, r)| r.validate(Location::Index(i)))
}

/// A record field usable in grouping and series queries.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Matrix dimension N.
    #[value(alias = "n")]
    Size,
    Threads,
    /// Access pattern code or name.
    #[value(alias = "method")]
    Pattern,
    /// Build variant label.
    Version,
    /// Wall time in seconds.
    #[value(alias = "sec")]
    Elapsed,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Size => "size",
            Field::Threads => "threads",
            Field::Pattern => "pattern",
            Field::Version => "version",
            Field::Elapsed => "elapsed",
        }
    }

    /// Resolve a field from a query or column name, accepting the column
    /// spellings used by the benchmark drivers.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "size" | "n" | "matrixsize" | "matrix_size" => Some(Field::Size),
            "threads" | "thread" | "t" => Some(Field::Threads),
            "pattern" | "method" | "pattern_name" => Some(Field::Pattern),
            "version" => Some(Field::Version),
            "elapsed" | "sec" | "timeseconds" | "time_sec" | "seconds" => Some(Field::Elapsed),
            _ => None,
        }
    }

    pub fn key_value(&self, record: &TrialRecord) -> KeyValue {
        match self {
            Field::Size => KeyValue::Int(record.size),
            Field::Threads => KeyValue::Int(u64::from(record.threads)),
            Field::Pattern => KeyValue::Pattern(record.pattern.clone()),
            Field::Version => KeyValue::Text(record.version.clone()),
            Field::Elapsed => KeyValue::Text(record.elapsed_text.clone()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One component of a group key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(u64),
    Pattern(PatternId),
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{v}"),
            KeyValue::Pattern(p) => write!(f, "{p}"),
            KeyValue::Text(t) => f.write_str(t),
        }
    }
}

/// Tuple of key values, one per grouping field, in query order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupKey(pub Vec<KeyValue>);

impl GroupKey {
    pub fn of(record: &TrialRecord, fields: &[Field]) -> Self {
        GroupKey(fields.iter().map(|f| f.key_value(record)).collect())
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// A chart point: a value, or an explicit gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Present(f64),
    Absent,
}

impl Cell {
    pub fn value(self) -> Option<f64> {
        match self {
            Cell::Present(v) => Some(v),
            Cell::Absent => None,
        }
    }

    pub fn is_absent(self) -> bool {
        matches!(self, Cell::Absent)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Absent, Cell::Present)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Present(v) => serializer.serialize_f64(*v),
            Cell::Absent => serializer.serialize_none(),
        }
    }
}

/// Scaling metrics for one thread count of a (pattern, size) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSet {
    /// Representative (minimum) elapsed seconds.
    pub elapsed: f64,
    pub speedup: f64,
    /// Percent of ideal linear scaling.
    pub efficiency: f64,
    /// GFLOP/s under the selected work model.
    pub throughput: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledSeries {
    pub label: String,
    pub key: GroupKey,
    /// One cell per axis value, positionally aligned.
    pub points: Vec<Cell>,
}

/// Time-vs-axis chart restricted to one thread count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadChart {
    pub threads: u32,
    pub series: Vec<LabeledSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestTimeEntry {
    pub group_key: GroupKey,
    /// Key components rendered for display (patterns resolved to names).
    pub key_labels: Vec<String>,
    pub value: f64,
    /// Version of the winning record.
    pub winner_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsEntry {
    pub pattern: PatternId,
    pub label: String,
    pub size: u64,
    pub by_threads: BTreeMap<u32, MetricSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingBaselineEntry {
    pub pattern: PatternId,
    pub label: String,
    pub size: u64,
}

/// Headline figures for the largest size at the highest thread count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub size: u64,
    pub threads: u32,
    pub best_pattern: String,
    pub metrics: MetricSet,
}

/// Renderer-facing output. Everything a chart, table or text report needs;
/// nothing here refers back to raw records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBundle {
    pub baseline_threads: u32,
    pub work_model: WorkModel,
    pub axis: Vec<u64>,
    pub series: Vec<LabeledSeries>,
    pub thread_charts: Vec<ThreadChart>,
    pub best_time_fields: Vec<Field>,
    pub best_times: Vec<BestTimeEntry>,
    pub metrics: Vec<MetricsEntry>,
    pub missing_baselines: Vec<MissingBaselineEntry>,
    pub summary: Option<Summary>,
}

impl ReportBundle {
    /// Metric sets for a pattern label at one size.
    pub fn metrics_for(&self, label: &str, size: u64) -> Option<&BTreeMap<u32, MetricSet>> {
        self.metrics
            .iter()
            .find(|m| m.label == label && m.size == size)
            .map(|m| &m.by_threads)
    }

    pub fn series_by_label(&self, label: &str) -> Option<&LabeledSeries> {
        self.series.iter().find(|s| s.label == label)
    }

    /// SHA-256 over the canonical JSON encoding, hex encoded.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self).map_err(io::Error::other)?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        let mut s = String::with_capacity(64);
        for b in digest {
            s.push_str(&format!("{:02x}", b));
        }
        Ok(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub tool_version: String,
    pub inputs: Vec<String>,
    pub record_count: usize,
    pub baseline_threads: u32,
    pub work_model: String,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
    pub bundle_sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEnvelope {
    pub run: RunMeta,
    pub bundle: ReportBundle,
}
