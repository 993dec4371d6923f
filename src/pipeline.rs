//! Records in, [`ReportBundle`] out.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::aggregate::{axis_series, best_by, TieBreak};
use crate::assemble::{assemble, assemble_thread_charts, PatternLabels};
use crate::error::{ReportError, Result};
use crate::metrics::compute_metrics;
use crate::schema::{validate_records, Field, ReportBundle, TrialRecord};
use crate::WorkModel;

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub baseline_threads: u32,
    pub work: WorkModel,
    pub tie_break: TieBreak,
    /// Fields identifying one time-vs-size series.
    pub series_fields: Vec<Field>,
    /// Fields identifying one best-time table row.
    pub best_fields: Vec<Field>,
    /// Sizes forced onto the shared axis even if unobserved.
    pub axis_domain: Option<Vec<u64>>,
    pub labels: PatternLabels,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            baseline_threads: 1,
            work: WorkModel::MatMul,
            tie_break: TieBreak::Encounter,
            series_fields: vec![Field::Pattern],
            best_fields: vec![Field::Size, Field::Pattern],
            axis_domain: None,
            labels: PatternLabels::new(),
        }
    }
}

/// Run aggregation, metrics and assembly over `records`.
///
/// The headline series hold the best time per size over all thread counts;
/// `thread_charts` hold one chart per thread count on the same axis.
pub fn build_report(records: &[TrialRecord], opts: &ReportOptions) -> Result<ReportBundle> {
    if records.is_empty() {
        return Err(ReportError::EmptyGroup("no trial records".to_string()));
    }
    validate_records(records)?;

    let domain = opts.axis_domain.as_deref();
    let series = axis_series(
        records,
        Field::Size,
        &opts.series_fields,
        Field::Elapsed,
        domain,
    )?;
    let best = best_by(records, &opts.best_fields, Field::Elapsed, opts.tie_break)?;
    let metrics = compute_metrics(records, opts.baseline_threads, opts.work)?;

    let mut bundle = assemble(
        &series,
        &best,
        &opts.best_fields,
        &metrics,
        domain,
        &opts.labels,
    );

    let thread_counts: BTreeSet<u32> = records.iter().map(|r| r.threads).collect();
    let mut per_thread = BTreeMap::new();
    for threads in thread_counts {
        let subset: Vec<TrialRecord> = records
            .iter()
            .filter(|r| r.threads == threads)
            .cloned()
            .collect();
        let s = axis_series(
            &subset,
            Field::Size,
            &opts.series_fields,
            Field::Elapsed,
            Some(&bundle.axis),
        )?;
        per_thread.insert(threads, s);
    }
    bundle.thread_charts = assemble_thread_charts(&per_thread, &bundle.axis, &opts.labels);

    debug!(
        axis = bundle.axis.len(),
        series = bundle.series.len(),
        charts = bundle.thread_charts.len(),
        best_times = bundle.best_times.len(),
        metrics = bundle.metrics.len(),
        "assembled report"
    );
    Ok(bundle)
}
