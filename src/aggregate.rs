//! Grouping, best-value selection and axis-aligned series.
//!
//! Every map returned here is ordered by [`GroupKey`], so results do not
//! depend on the order records arrive in. Within a group, records keep
//! their input order; that order is what the default tie-breaker uses.

use std::collections::{BTreeMap, BTreeSet};

use clap::ValueEnum;
use tracing::debug;

use crate::error::{Location, ReportError, Result};
use crate::schema::{Cell, Field, GroupKey, TrialRecord};

/// Records per key, in input order.
pub type Groups<'a> = BTreeMap<GroupKey, Vec<&'a TrialRecord>>;

/// How to pick a winner between records with bit-identical minimal values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TieBreak {
    /// First record encountered wins.
    #[default]
    Encounter,
    /// Lexicographically smallest version wins; equal versions fall back to encounter order.
    Version,
}

impl TieBreak {
    /// `candidate` always comes after `incumbent` in traversal order.
    fn prefers(&self, candidate: &TrialRecord, incumbent: &TrialRecord) -> bool {
        match self {
            TieBreak::Encounter => false,
            TieBreak::Version => candidate.version < incumbent.version,
        }
    }
}

/// Winning record of a group and the value it won with.
#[derive(Debug, Clone, Copy)]
pub struct Best<'a> {
    pub value: f64,
    pub record: &'a TrialRecord,
}

/// Values on a shared axis, one row of cells per series key.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSeries {
    pub axis_field: Field,
    pub axis: Vec<u64>,
    pub series: BTreeMap<GroupKey, Vec<Cell>>,
}

fn numeric_accessor(field: Field) -> Result<fn(&TrialRecord) -> f64> {
    let f: fn(&TrialRecord) -> f64 = match field {
        Field::Size => |r: &TrialRecord| r.size as f64,
        Field::Threads => |r: &TrialRecord| f64::from(r.threads),
        Field::Elapsed => |r: &TrialRecord| r.elapsed,
        other => {
            return Err(ReportError::schema(
                Location::Query,
                format!("field '{other}' is not numeric"),
            ))
        }
    };
    Ok(f)
}

fn axis_accessor(field: Field) -> Result<fn(&TrialRecord) -> u64> {
    let f: fn(&TrialRecord) -> u64 = match field {
        Field::Size => |r: &TrialRecord| r.size,
        Field::Threads => |r: &TrialRecord| u64::from(r.threads),
        other => {
            return Err(ReportError::schema(
                Location::Query,
                format!("field '{other}' cannot be used as an axis"),
            ))
        }
    };
    Ok(f)
}

/// Partition `records` by the values of `key_fields`.
pub fn group_by<'a>(records: &'a [TrialRecord], key_fields: &[Field]) -> Result<Groups<'a>> {
    if key_fields.is_empty() {
        return Err(ReportError::schema(
            Location::Query,
            "at least one key field is required",
        ));
    }
    if records.is_empty() {
        return Err(ReportError::EmptyGroup("no records to group".to_string()));
    }

    let mut groups: Groups<'a> = BTreeMap::new();
    for r in records {
        groups.entry(GroupKey::of(r, key_fields)).or_default().push(r);
    }

    debug!(
        records = records.len(),
        groups = groups.len(),
        "grouped records"
    );
    Ok(groups)
}

/// Per group, the record with the smallest `value_field`.
pub fn best_by<'a>(
    records: &'a [TrialRecord],
    group_fields: &[Field],
    value_field: Field,
    tie_breaker: TieBreak,
) -> Result<BTreeMap<GroupKey, Best<'a>>> {
    let value = numeric_accessor(value_field)?;
    let groups = group_by(records, group_fields)?;

    let mut out = BTreeMap::new();
    for (key, members) in groups {
        let mut best: Option<Best<'a>> = None;
        for r in members {
            let v = value(r);
            let replace = match &best {
                None => true,
                Some(b) => {
                    v < b.value || (v.to_bits() == b.value.to_bits() && tie_breaker.prefers(r, b.record))
                }
            };
            if replace {
                best = Some(Best {
                    value: v,
                    record: r,
                });
            }
        }
        if let Some(b) = best {
            out.insert(key, b);
        }
    }

    if out.is_empty() {
        return Err(ReportError::EmptyGroup(format!(
            "best_by over {} records",
            records.len()
        )));
    }
    Ok(out)
}

/// One series per distinct `series_fields` key, each laid out over the same
/// ascending axis. The axis is the union of observed `axis_field` values and
/// `axis_domain`. Repeated points keep their minimum; missing points are
/// [`Cell::Absent`].
pub fn axis_series(
    records: &[TrialRecord],
    axis_field: Field,
    series_fields: &[Field],
    value_field: Field,
    axis_domain: Option<&[u64]>,
) -> Result<AxisSeries> {
    let axis_of = axis_accessor(axis_field)?;
    let value = numeric_accessor(value_field)?;
    if series_fields.is_empty() {
        return Err(ReportError::schema(
            Location::Query,
            "at least one series field is required",
        ));
    }

    let mut axis: BTreeSet<u64> = records.iter().map(axis_of).collect();
    if let Some(domain) = axis_domain {
        axis.extend(domain.iter().copied());
    }
    let axis: Vec<u64> = axis.into_iter().collect();

    let mut points: BTreeMap<GroupKey, BTreeMap<u64, f64>> = BTreeMap::new();
    for r in records {
        let v = value(r);
        points
            .entry(GroupKey::of(r, series_fields))
            .or_default()
            .entry(axis_of(r))
            .and_modify(|cur| {
                if v < *cur {
                    *cur = v;
                }
            })
            .or_insert(v);
    }

    let series = points
        .into_iter()
        .map(|(key, pts)| {
            let cells = axis
                .iter()
                .map(|a| Cell::from(pts.get(a).copied()))
                .collect();
            (key, cells)
        })
        .collect();

    Ok(AxisSeries {
        axis_field,
        axis,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyValue, PatternId};
    use crate::synth::{generate_trials, SynthConfig};
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rec(size: u64, threads: u32, pattern: &str, elapsed: f64) -> TrialRecord {
        TrialRecord::new(size, threads, pattern, elapsed)
    }

    #[test]
    fn test_group_by_preserves_multiset_and_order() {
        let mut records = generate_trials(&SynthConfig::default());
        for (i, r) in records.iter_mut().enumerate() {
            r.elapsed_text = format!("trial-{i}");
        }

        let groups = group_by(&records, &[Field::Size, Field::Pattern]).unwrap();

        let mut flat: Vec<&str> = groups
            .values()
            .flatten()
            .map(|r| r.elapsed_text.as_str())
            .collect();
        flat.sort_unstable();
        let mut original: Vec<&str> = records.iter().map(|r| r.elapsed_text.as_str()).collect();
        original.sort_unstable();
        assert_eq!(flat, original);

        for (key, members) in &groups {
            for r in members {
                assert_eq!(&GroupKey::of(r, &[Field::Size, Field::Pattern]), key);
            }
            let idx: Vec<usize> = members
                .iter()
                .map(|r| r.elapsed_text["trial-".len()..].parse().unwrap())
                .collect();
            assert!(idx.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_group_keys_independent_of_input_order() {
        let records = generate_trials(&SynthConfig::default());
        let mut shuffled = records.clone();
        shuffled.shuffle(&mut ChaCha8Rng::seed_from_u64(7));

        let a: Vec<GroupKey> = group_by(&records, &[Field::Threads, Field::Pattern])
            .unwrap()
            .into_keys()
            .collect();
        let b: Vec<GroupKey> = group_by(&shuffled, &[Field::Threads, Field::Pattern])
            .unwrap()
            .into_keys()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_group_by_rejects_empty_input() {
        assert!(matches!(
            group_by(&[], &[Field::Size]),
            Err(ReportError::EmptyGroup(_))
        ));
        let records = vec![rec(8, 1, "row", 1.0)];
        assert!(matches!(
            group_by(&records, &[]),
            Err(ReportError::Schema { .. })
        ));
    }

    #[test]
    fn test_best_by_tie_keeps_first_encountered() {
        let records = vec![
            rec(256, 1, "row", 0.5).with_version("unoptimized"),
            rec(256, 1, "row", 0.5).with_version("optimized"),
        ];
        let best = best_by(&records, &[Field::Size], Field::Elapsed, TieBreak::Encounter).unwrap();
        let b = &best[&GroupKey(vec![KeyValue::Int(256)])];
        assert_eq!(b.value, 0.5);
        assert!(std::ptr::eq(b.record, &records[0]));
        assert_eq!(b.record.version, "unoptimized");
    }

    #[test]
    fn test_best_by_version_tie_break() {
        let records = vec![
            rec(256, 1, "row", 0.5).with_version("unoptimized"),
            rec(256, 1, "row", 0.5).with_version("optimized"),
            rec(256, 1, "row", 0.7).with_version("aaa"),
        ];
        let best = best_by(&records, &[Field::Size], Field::Elapsed, TieBreak::Version).unwrap();
        let b = best.values().next().unwrap();
        assert_eq!(b.record.version, "optimized");
    }

    #[test]
    fn test_best_by_minimal_and_member() {
        let records = generate_trials(&SynthConfig::default());
        let fields = [Field::Size, Field::Pattern];
        let groups = group_by(&records, &fields).unwrap();
        let best = best_by(&records, &fields, Field::Elapsed, TieBreak::default()).unwrap();

        assert_eq!(groups.len(), best.len());
        for (key, b) in &best {
            let members = &groups[key];
            assert!(members.iter().any(|r| std::ptr::eq(*r, b.record)));
            assert!(members.iter().all(|r| b.value <= r.elapsed));
            assert_eq!(b.value, b.record.elapsed);
        }
    }

    #[test]
    fn test_best_by_rejects_label_value_field() {
        let records = vec![rec(8, 1, "row", 1.0)];
        assert!(matches!(
            best_by(&records, &[Field::Size], Field::Version, TieBreak::Encounter),
            Err(ReportError::Schema { .. })
        ));
    }

    #[test]
    fn test_axis_series_aligned_with_gaps() {
        let records = vec![
            rec(256, 1, "row", 1.0),
            rec(512, 1, "row", 4.0),
            rec(512, 1, "row", 3.5),
            rec(1024, 1, "col", 9.0),
        ];
        let s = axis_series(&records, Field::Size, &[Field::Pattern], Field::Elapsed, None).unwrap();

        assert_eq!(s.axis, vec![256, 512, 1024]);
        let row = &s.series[&GroupKey(vec![KeyValue::Pattern(PatternId::from("row"))])];
        assert_eq!(row, &vec![Cell::Present(1.0), Cell::Present(3.5), Cell::Absent]);
        let col = &s.series[&GroupKey(vec![KeyValue::Pattern(PatternId::from("col"))])];
        assert_eq!(col, &vec![Cell::Absent, Cell::Absent, Cell::Present(9.0)]);
    }

    #[test]
    fn test_axis_domain_extends_axis() {
        let records = vec![rec(512, 1, "row", 1.0)];
        let s = axis_series(
            &records,
            Field::Size,
            &[Field::Pattern],
            Field::Elapsed,
            Some(&[2048, 256]),
        )
        .unwrap();
        assert_eq!(s.axis, vec![256, 512, 2048]);
        for cells in s.series.values() {
            assert_eq!(cells.len(), s.axis.len());
            assert!(cells[0].is_absent() && cells[2].is_absent());
        }
    }

    #[test]
    fn test_axis_series_equal_lengths_on_synthetic_data() {
        let cfg = SynthConfig {
            drop_rate: 0.3,
            ..SynthConfig::default()
        };
        let records = generate_trials(&cfg);
        let s = axis_series(
            &records,
            Field::Size,
            &[Field::Pattern, Field::Version],
            Field::Elapsed,
            None,
        )
        .unwrap();
        assert!(s.series.values().all(|c| c.len() == s.axis.len()));
        assert!(s.axis.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_axis_field_must_be_integral() {
        let records = vec![rec(512, 1, "row", 1.0)];
        assert!(axis_series(&records, Field::Pattern, &[Field::Size], Field::Elapsed, None).is_err());
    }
}
