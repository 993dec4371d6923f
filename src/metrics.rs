//! Speedup, efficiency and throughput relative to a baseline thread count.

use std::collections::BTreeMap;
use std::fmt;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::aggregate::{best_by, TieBreak};
use crate::error::{Location, ReportError, Result};
use crate::schema::{Field, MetricSet, PatternId, TrialRecord};
use crate::WorkModel;

/// Metric sets are keyed by (pattern, size).
pub type MetricKey = (PatternId, u64);

/// A (pattern, size) pair that had no baseline record and was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBaseline {
    pub pattern: PatternId,
    pub size: u64,
    pub baseline_threads: u32,
}

impl fmt::Display for MissingBaseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pattern {} at size {} has no {}-thread baseline; excluded from metrics",
            self.pattern, self.size, self.baseline_threads
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedMetrics {
    pub baseline_threads: u32,
    pub work: WorkModel,
    pub sets: BTreeMap<MetricKey, BTreeMap<u32, MetricSet>>,
    pub missing_baselines: Vec<MissingBaseline>,
}

fn metric_sets(
    (pattern, size): &MetricKey,
    times: &BTreeMap<u32, f64>,
    baseline_threads: u32,
    work: WorkModel,
) -> Result<Option<BTreeMap<u32, MetricSet>>> {
    let Some(&baseline) = times.get(&baseline_threads) else {
        return Ok(None);
    };
    let flops = work.work(*size);

    times
        .iter()
        .map(|(&threads, &elapsed)| {
            let speedup = baseline / elapsed;
            let efficiency = speedup / f64::from(threads) * 100.0;
            let throughput = flops / elapsed / 1e9;
            if !(speedup.is_finite() && efficiency.is_finite() && throughput.is_finite()) {
                return Err(ReportError::InvalidMeasurement {
                    location: Location::Group(format!(
                        "pattern={pattern} size={size} threads={threads}"
                    )),
                    elapsed,
                });
            }
            Ok((
                threads,
                MetricSet {
                    elapsed,
                    speedup,
                    efficiency,
                    throughput,
                },
            ))
        })
        .collect::<Result<BTreeMap<_, _>>>()
        .map(Some)
}

/// Scaling metrics for every (pattern, size) that has a record at
/// `baseline_threads`.
///
/// Repeated trials are reduced to their minimum elapsed before any ratio is
/// taken. Pairs without a baseline are omitted from `sets` and reported in
/// `missing_baselines`.
pub fn compute_metrics(
    records: &[TrialRecord],
    baseline_threads: u32,
    work: WorkModel,
) -> Result<DerivedMetrics> {
    if baseline_threads == 0 {
        return Err(ReportError::schema(
            Location::Query,
            "baseline thread count must be >= 1",
        ));
    }
    for (i, r) in records.iter().enumerate() {
        if !(r.elapsed.is_finite() && r.elapsed > 0.0) {
            return Err(ReportError::InvalidMeasurement {
                location: Location::Index(i),
                elapsed: r.elapsed,
            });
        }
    }

    let best = best_by(
        records,
        &[Field::Pattern, Field::Size, Field::Threads],
        Field::Elapsed,
        TieBreak::Encounter,
    )?;

    let mut by_pair: BTreeMap<MetricKey, BTreeMap<u32, f64>> = BTreeMap::new();
    for b in best.values() {
        by_pair
            .entry((b.record.pattern.clone(), b.record.size))
            .or_default()
            .insert(b.record.threads, b.value);
    }

    let pairs: Vec<(MetricKey, BTreeMap<u32, f64>)> = by_pair.into_iter().collect();
    let computed: Vec<(MetricKey, Result<Option<BTreeMap<u32, MetricSet>>>)> = pairs
        .into_par_iter()
        .map(|(key, times)| {
            let sets = metric_sets(&key, &times, baseline_threads, work);
            (key, sets)
        })
        .collect();

    let mut out = DerivedMetrics {
        baseline_threads,
        work,
        ..DerivedMetrics::default()
    };
    for (key, sets) in computed {
        match sets? {
            Some(sets) => {
                out.sets.insert(key, sets);
            }
            None => {
                let missing = MissingBaseline {
                    pattern: key.0,
                    size: key.1,
                    baseline_threads,
                };
                warn!("{missing}");
                out.missing_baselines.push(missing);
            }
        }
    }

    debug!(
        pairs = out.sets.len(),
        missing = out.missing_baselines.len(),
        "computed metrics"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{generate_trials, SynthConfig};

    const TOL: f64 = 1e-9;

    fn rec(size: u64, threads: u32, pattern: &str, elapsed: f64) -> TrialRecord {
        TrialRecord::new(size, threads, pattern, elapsed)
    }

    fn key(pattern: &str, size: u64) -> MetricKey {
        (PatternId::from(pattern), size)
    }

    #[test]
    fn test_row_pattern_scaling() {
        let records = vec![
            rec(256, 1, "row", 1.0),
            rec(256, 2, "row", 0.6),
            rec(256, 4, "row", 0.4),
        ];
        let m = compute_metrics(&records, 1, WorkModel::MatMul).unwrap();
        let sets = &m.sets[&key("row", 256)];

        assert!((sets[&2].speedup - 1.0 / 0.6).abs() < TOL);
        assert!((sets[&2].efficiency - 250.0 / 3.0).abs() < TOL);
        assert!((sets[&4].speedup - 2.5).abs() < TOL);
        assert!((sets[&4].efficiency - 62.5).abs() < TOL);

        assert_eq!(sets[&1].speedup, 1.0);
        assert_eq!(sets[&1].efficiency, 100.0);
        assert!(m.missing_baselines.is_empty());
    }

    #[test]
    fn test_throughput_work_models() {
        let records = vec![rec(256, 1, "row", 2.0)];
        let mm = compute_metrics(&records, 1, WorkModel::MatMul).unwrap();
        let ew = compute_metrics(&records, 1, WorkModel::ElementWise).unwrap();

        let expected_mm = 2.0 * 256f64.powi(3) / 2.0 / 1e9;
        let expected_ew = 256f64.powi(2) / 2.0 / 1e9;
        assert!((mm.sets[&key("row", 256)][&1].throughput - expected_mm).abs() < TOL);
        assert!((ew.sets[&key("row", 256)][&1].throughput - expected_ew).abs() < TOL);
    }

    #[test]
    fn test_missing_baseline_is_excluded() {
        let records = vec![
            rec(512, 2, "col", 0.8),
            rec(512, 4, "col", 0.5),
            rec(512, 1, "row", 1.0),
            rec(512, 2, "row", 0.5),
        ];
        let m = compute_metrics(&records, 1, WorkModel::MatMul).unwrap();

        assert!(!m.sets.contains_key(&key("col", 512)));
        assert!(m.sets.contains_key(&key("row", 512)));
        assert_eq!(
            m.missing_baselines,
            vec![MissingBaseline {
                pattern: PatternId::from("col"),
                size: 512,
                baseline_threads: 1,
            }]
        );
    }

    #[test]
    fn test_repeated_trials_use_minimum() {
        let records = vec![
            rec(128, 1, "row", 1.2),
            rec(128, 1, "row", 1.0),
            rec(128, 4, "row", 0.5),
            rec(128, 4, "row", 0.25),
            rec(128, 4, "row", 0.4),
        ];
        let m = compute_metrics(&records, 1, WorkModel::MatMul).unwrap();
        let s = m.sets[&key("row", 128)][&4];
        assert_eq!(s.elapsed, 0.25);
        assert!((s.speedup - 4.0).abs() < TOL);
    }

    #[test]
    fn test_non_default_baseline() {
        let records = vec![rec(64, 2, "row", 1.0), rec(64, 8, "row", 0.5)];
        let m = compute_metrics(&records, 2, WorkModel::MatMul).unwrap();
        let s = m.sets[&key("row", 64)][&8];
        assert!((s.speedup - 2.0).abs() < TOL);
        assert!((s.efficiency - 25.0).abs() < TOL);
    }

    #[test]
    fn test_zero_elapsed_is_rejected() {
        let records = vec![rec(64, 1, "row", 1.0), rec(64, 2, "row", 0.0)];
        let err = compute_metrics(&records, 1, WorkModel::MatMul).unwrap_err();
        assert!(matches!(
            err,
            ReportError::InvalidMeasurement {
                location: Location::Index(1),
                ..
            }
        ));
    }

    #[test]
    fn test_overflowing_ratio_is_rejected() {
        let records = vec![rec(64, 1, "row", f64::MAX), rec(64, 2, "row", 1e-300)];
        assert!(matches!(
            compute_metrics(&records, 1, WorkModel::MatMul),
            Err(ReportError::InvalidMeasurement {
                location: Location::Group(_),
                ..
            })
        ));
    }

    #[test]
    fn test_speedup_matches_ratio_on_synthetic_data() {
        let cfg = SynthConfig {
            drop_rate: 0.2,
            ..SynthConfig::default()
        };
        let records = generate_trials(&cfg);
        let m = compute_metrics(&records, 1, WorkModel::MatMul).unwrap();

        for ((pattern, size), sets) in &m.sets {
            let min_at = |t: u32| {
                records
                    .iter()
                    .filter(|r| &r.pattern == pattern && r.size == *size && r.threads == t)
                    .map(|r| r.elapsed)
                    .fold(f64::INFINITY, f64::min)
            };
            let base = min_at(1);
            for (&t, s) in sets {
                let e = min_at(t);
                assert!((s.speedup - base / e).abs() < TOL);
                assert!((s.efficiency - base / e / f64::from(t) * 100.0).abs() < TOL);
            }
        }
        for missing in &m.missing_baselines {
            assert!(!m.sets.contains_key(&(missing.pattern.clone(), missing.size)));
        }
    }
}
