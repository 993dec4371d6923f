//! Turns aggregation and metric output into a [`ReportBundle`].
//!
//! Nothing here touches raw records. Ordering is imposed explicitly so the
//! bundle is identical for identical input regardless of how it was computed.

use std::collections::{BTreeMap, BTreeSet};

use crate::aggregate::{AxisSeries, Best};
use crate::error::{Location, ReportError, Result};
use crate::metrics::DerivedMetrics;
use crate::schema::{
    BestTimeEntry, Cell, Field, GroupKey, KeyValue, LabeledSeries, MetricsEntry,
    MissingBaselineEntry, PatternId, ReportBundle, Summary, ThreadChart,
};

/// Display names for pattern identifiers. Unmapped patterns display as
/// themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternLabels {
    names: BTreeMap<PatternId, String>,
}

impl PatternLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: impl Into<PatternId>, name: impl Into<String>) {
        self.names.insert(pattern.into(), name.into());
    }

    pub fn label(&self, pattern: &PatternId) -> String {
        self.names
            .get(pattern)
            .cloned()
            .unwrap_or_else(|| pattern.to_string())
    }

    /// Parse a `CODE=NAME` assignment.
    pub fn parse_assignment(s: &str) -> Result<(PatternId, String)> {
        match s.split_once('=') {
            Some((code, name)) if !code.trim().is_empty() && !name.trim().is_empty() => {
                Ok((PatternId::parse(code), name.trim().to_string()))
            }
            _ => Err(ReportError::schema(
                Location::Query,
                format!("expected CODE=NAME, got '{s}'"),
            )),
        }
    }

    /// Parse a JSON object such as `{"0": "row_major", "1": "col_major"}`.
    pub fn from_json(s: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_str(s).map_err(|e| {
            ReportError::schema(Location::Query, format!("invalid label table: {e}"))
        })?;
        Ok(raw
            .into_iter()
            .map(|(code, name)| (PatternId::parse(&code), name))
            .collect())
    }

    fn key_labels(&self, key: &GroupKey) -> Vec<String> {
        key.values()
            .iter()
            .map(|v| match v {
                KeyValue::Pattern(p) => self.label(p),
                other => other.to_string(),
            })
            .collect()
    }

    fn key_label(&self, key: &GroupKey) -> String {
        self.key_labels(key).join("/")
    }
}

impl FromIterator<(PatternId, String)> for PatternLabels {
    fn from_iter<I: IntoIterator<Item = (PatternId, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

fn merged_axis(axis: &[u64], domain: Option<&[u64]>) -> Vec<u64> {
    let mut all: BTreeSet<u64> = axis.iter().copied().collect();
    if let Some(d) = domain {
        all.extend(d.iter().copied());
    }
    all.into_iter().collect()
}

fn realign(from_axis: &[u64], cells: &[Cell], to_axis: &[u64]) -> Vec<Cell> {
    let by_value: BTreeMap<u64, Cell> = from_axis.iter().copied().zip(cells.iter().copied()).collect();
    to_axis
        .iter()
        .map(|a| by_value.get(a).copied().unwrap_or(Cell::Absent))
        .collect()
}

fn labeled_series(series: &AxisSeries, axis: &[u64], labels: &PatternLabels) -> Vec<LabeledSeries> {
    let mut out: Vec<LabeledSeries> = series
        .series
        .iter()
        .map(|(key, cells)| LabeledSeries {
            label: labels.key_label(key),
            key: key.clone(),
            points: realign(&series.axis, cells, axis),
        })
        .collect();
    out.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key)));
    out
}

/// Package aggregation output for renderers.
///
/// `best_fields` names the components of the `best_times` keys. The bundle
/// axis is the union of the series axis and `axis_domain`.
pub fn assemble(
    series: &AxisSeries,
    best_times: &BTreeMap<GroupKey, Best<'_>>,
    best_fields: &[Field],
    metrics: &DerivedMetrics,
    axis_domain: Option<&[u64]>,
    labels: &PatternLabels,
) -> ReportBundle {
    let axis = merged_axis(&series.axis, axis_domain);

    let mut best: Vec<BestTimeEntry> = best_times
        .iter()
        .map(|(key, b)| BestTimeEntry {
            group_key: key.clone(),
            key_labels: labels.key_labels(key),
            value: b.value,
            winner_label: b.record.version.clone(),
        })
        .collect();
    // Leading key field first, fastest first within it.
    best.sort_by(|a, b| {
        a.group_key
            .values()
            .first()
            .cmp(&b.group_key.values().first())
            .then_with(|| a.value.total_cmp(&b.value))
            .then_with(|| a.group_key.cmp(&b.group_key))
    });

    let mut metric_entries: Vec<MetricsEntry> = metrics
        .sets
        .iter()
        .map(|((pattern, size), sets)| MetricsEntry {
            pattern: pattern.clone(),
            label: labels.label(pattern),
            size: *size,
            by_threads: sets.clone(),
        })
        .collect();
    metric_entries.sort_by(|a, b| {
        (&a.label, &a.pattern, a.size).cmp(&(&b.label, &b.pattern, b.size))
    });

    let mut missing: Vec<MissingBaselineEntry> = metrics
        .missing_baselines
        .iter()
        .map(|m| MissingBaselineEntry {
            pattern: m.pattern.clone(),
            label: labels.label(&m.pattern),
            size: m.size,
        })
        .collect();
    missing.sort_by(|a, b| (&a.label, &a.pattern, a.size).cmp(&(&b.label, &b.pattern, b.size)));

    let summary = summarize(&metric_entries);

    ReportBundle {
        baseline_threads: metrics.baseline_threads,
        work_model: metrics.work,
        series: labeled_series(series, &axis, labels),
        axis,
        thread_charts: Vec::new(),
        best_time_fields: best_fields.to_vec(),
        best_times: best,
        metrics: metric_entries,
        missing_baselines: missing,
        summary,
    }
}

/// One chart per thread count, laid out on the bundle's shared `axis`.
pub fn assemble_thread_charts(
    per_thread: &BTreeMap<u32, AxisSeries>,
    axis: &[u64],
    labels: &PatternLabels,
) -> Vec<ThreadChart> {
    per_thread
        .iter()
        .map(|(&threads, series)| ThreadChart {
            threads,
            series: labeled_series(series, axis, labels),
        })
        .collect()
}

/// Fastest pattern at the largest measured size and highest thread count.
/// Ties on elapsed go to the earlier entry in label order.
pub fn summarize(metrics: &[MetricsEntry]) -> Option<Summary> {
    let size = metrics.iter().map(|m| m.size).max()?;
    let at_size: Vec<&MetricsEntry> = metrics.iter().filter(|m| m.size == size).collect();
    let threads = at_size
        .iter()
        .filter_map(|m| m.by_threads.keys().next_back().copied())
        .max()?;

    let mut best: Option<(&MetricsEntry, f64)> = None;
    for m in at_size {
        if let Some(set) = m.by_threads.get(&threads) {
            if best.map_or(true, |(_, e)| set.elapsed < e) {
                best = Some((m, set.elapsed));
            }
        }
    }

    best.map(|(m, _)| Summary {
        size,
        threads,
        best_pattern: m.label.clone(),
        metrics: m.by_threads[&threads],
    })
}
