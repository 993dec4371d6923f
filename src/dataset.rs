//! CSV loading and writing of trial records.
//!
//! # Input format
//!
//! A header row followed by one row per trial. Columns are matched by name,
//! case-insensitively, accepting the spellings the benchmark drivers emit:
//!
//! ```text
//! size:     N | size | MatrixSize
//! threads:  threads | Threads
//! pattern:  pattern | Method | pattern_name
//! version:  version              (optional)
//! elapsed:  sec | elapsed | TimeSeconds | time_sec
//! ```
//!
//! Other columns (checksums, precomputed GFLOPS, ...) are ignored.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Location, ReportError, Result};
use crate::schema::{Field, PatternId, TrialRecord, DEFAULT_VERSION};

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Version for sources without a version column.
    pub version: Option<String>,
    /// Keep only these sizes.
    pub only_sizes: Option<Vec<u64>>,
}

/// A file or directory to load, optionally tagged `VERSION=PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub version: Option<String>,
    pub path: PathBuf,
}

impl FromStr for InputSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty input".to_string());
        }
        match s.split_once('=') {
            Some((tag, path)) if !tag.is_empty() && !tag.contains(['/', '\\']) => {
                if path.is_empty() {
                    return Err(format!("missing path after '{tag}='"));
                }
                Ok(InputSpec {
                    version: Some(tag.to_string()),
                    path: PathBuf::from(path),
                })
            }
            _ => Ok(InputSpec {
                version: None,
                path: PathBuf::from(s),
            }),
        }
    }
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{v}={}", self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

struct Columns {
    size: usize,
    threads: usize,
    pattern: usize,
    version: Option<usize>,
    elapsed: usize,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord, source: &str) -> Result<Self> {
        let mut found: BTreeMap<Field, usize> = BTreeMap::new();
        for (i, h) in headers.iter().enumerate() {
            if let Some(field) = Field::from_name(h) {
                found.entry(field).or_insert(i);
            }
        }

        let require = |field: Field| {
            found.get(&field).copied().ok_or_else(|| {
                ReportError::schema(
                    Location::Line {
                        source: source.to_string(),
                        line: 1,
                    },
                    format!(
                        "missing required column '{field}' (have: {})",
                        headers.iter().collect::<Vec<_>>().join(",")
                    ),
                )
            })
        };

        Ok(Columns {
            size: require(Field::Size)?,
            threads: require(Field::Threads)?,
            pattern: require(Field::Pattern)?,
            version: found.get(&Field::Version).copied(),
            elapsed: require(Field::Elapsed)?,
        })
    }
}

fn cell<'r>(row: &'r csv::StringRecord, idx: usize, field: Field, at: &Location) -> Result<&'r str> {
    match row.get(idx).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ReportError::schema(
            at.clone(),
            format!("missing value for '{field}'"),
        )),
    }
}

fn parse_cell<T: FromStr>(raw: &str, field: Field, at: &Location) -> Result<T> {
    raw.parse().map_err(|_| {
        ReportError::schema(at.clone(), format!("cannot parse {field} from '{raw}'"))
    })
}

/// Parse trial records from any CSV reader. `source` names the input in errors.
pub fn load_reader<R: Read>(reader: R, source: &str, opts: &LoadOptions) -> Result<Vec<TrialRecord>> {
    let csv_err = |e: csv::Error| ReportError::Csv {
        path: PathBuf::from(source),
        source: e,
    };

    // Ragged rows reach `cell` and fail as schema errors with their line.
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let cols = Columns::resolve(&headers, source)?;

    let mut out = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row.map_err(csv_err)?;
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(i + 2);
        let at = Location::Line {
            source: source.to_string(),
            line,
        };

        let elapsed_text = cell(&row, cols.elapsed, Field::Elapsed, &at)?;
        let version = match cols.version.and_then(|idx| row.get(idx)).map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => opts
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        };

        let record = TrialRecord {
            size: parse_cell(cell(&row, cols.size, Field::Size, &at)?, Field::Size, &at)?,
            threads: parse_cell(
                cell(&row, cols.threads, Field::Threads, &at)?,
                Field::Threads,
                &at,
            )?,
            pattern: PatternId::parse(cell(&row, cols.pattern, Field::Pattern, &at)?),
            version,
            elapsed: parse_cell(elapsed_text, Field::Elapsed, &at)?,
            elapsed_text: elapsed_text.to_string(),
        };
        record.validate(at)?;

        if let Some(sizes) = &opts.only_sizes {
            if !sizes.contains(&record.size) {
                continue;
            }
        }
        out.push(record);
    }

    debug!(source, records = out.len(), "loaded csv");
    Ok(out)
}

pub fn load_csv<P: AsRef<Path>>(path: P, opts: &LoadOptions) -> Result<Vec<TrialRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    load_reader(file, &path.display().to_string(), opts)
}

/// All `*.csv` files under `root` (or `root` itself if it is a file), sorted.
pub fn collect_csv_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let is_csv = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if entry.file_type().is_file() && is_csv {
            out.push(entry.path().to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

/// Load every input in order. A tagged input's version overrides `opts.version`.
pub fn load_inputs(inputs: &[InputSpec], opts: &LoadOptions) -> Result<Vec<TrialRecord>> {
    let mut records = Vec::new();
    for input in inputs {
        let files = collect_csv_files(&input.path)?;
        if files.is_empty() {
            warn!("no csv files found under {}", input.path.display());
        }

        let file_opts = LoadOptions {
            version: input.version.clone().or_else(|| opts.version.clone()),
            only_sizes: opts.only_sizes.clone(),
        };
        for file in files {
            records.extend(load_csv(&file, &file_opts)?);
        }
    }
    Ok(records)
}

/// Write records with a canonical `size,threads,pattern,version,elapsed` header.
/// Elapsed is written from its source text.
pub fn write_records<W: Write>(writer: W, records: &[TrialRecord], dest: &str) -> Result<()> {
    let csv_err = |e: csv::Error| ReportError::Csv {
        path: PathBuf::from(dest),
        source: e,
    };

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["size", "threads", "pattern", "version", "elapsed"])
        .map_err(csv_err)?;
    for r in records {
        wtr.write_record([
            r.size.to_string(),
            r.threads.to_string(),
            r.pattern.to_string(),
            r.version.clone(),
            r.elapsed_text.clone(),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Distinct values and elapsed range of a loaded record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub records: usize,
    pub sizes: Vec<u64>,
    pub threads: Vec<u32>,
    pub patterns: Vec<PatternId>,
    pub versions: Vec<String>,
    pub elapsed_min: Option<f64>,
    pub elapsed_max: Option<f64>,
}

pub fn describe(records: &[TrialRecord]) -> DatasetInfo {
    let sizes: BTreeSet<u64> = records.iter().map(|r| r.size).collect();
    let threads: BTreeSet<u32> = records.iter().map(|r| r.threads).collect();
    let patterns: BTreeSet<&PatternId> = records.iter().map(|r| &r.pattern).collect();
    let versions: BTreeSet<&str> = records.iter().map(|r| r.version.as_str()).collect();

    DatasetInfo {
        records: records.len(),
        sizes: sizes.into_iter().collect(),
        threads: threads.into_iter().collect(),
        patterns: patterns.into_iter().cloned().collect(),
        versions: versions.into_iter().map(str::to_string).collect(),
        elapsed_min: records.iter().map(|r| r.elapsed).reduce(f64::min),
        elapsed_max: records.iter().map(|r| r.elapsed).reduce(f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{generate_trials, SynthConfig};
    use std::fs;
    use tempfile::tempdir;

    fn load_str(data: &str, opts: &LoadOptions) -> Result<Vec<TrialRecord>> {
        load_reader(data.as_bytes(), "mem.csv", opts)
    }

    #[test]
    fn test_loads_matadd_layout() {
        let data = "N,threads,pattern,sec,checksum\n\
                    256,1,0,0.001234567,12.5\n\
                    256,2,blocked_32,0.000700000,12.5\n";
        let records = load_str(data, &LoadOptions::default()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pattern, PatternId::Code(0));
        assert_eq!(records[1].pattern, PatternId::Name("blocked_32".to_string()));
        assert_eq!(records[0].version, DEFAULT_VERSION);
        assert_eq!(records[1].elapsed_text, "0.000700000");
        assert_eq!(records[1].elapsed, 0.0007);
    }

    #[test]
    fn test_loads_matmul_layout_ignoring_derived_columns() {
        let data = "MatrixSize,Threads,Method,TimeSeconds,GFLOPS,Speedup,Efficiency\n\
                    512,4,Blocked,0.25,1.07,3.2,80\n";
        let records = load_str(data, &LoadOptions::default()).unwrap();
        assert_eq!(records[0].size, 512);
        assert_eq!(records[0].threads, 4);
        assert_eq!(records[0].elapsed, 0.25);
    }

    #[test]
    fn test_version_column_and_fallback() {
        let opts = LoadOptions {
            version: Some("optimized".to_string()),
            ..Default::default()
        };
        let with_col = "N,threads,pattern,sec,version\n8,1,0,1.0,baseline\n8,1,0,1.0,\n";
        let records = load_str(with_col, &opts).unwrap();
        assert_eq!(records[0].version, "baseline");
        assert_eq!(records[1].version, "optimized");

        let without = "N,threads,pattern,sec\n8,1,0,1.0\n";
        assert_eq!(load_str(without, &opts).unwrap()[0].version, "optimized");
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let err = load_str("N,pattern,sec\n8,0,1.0\n", &LoadOptions::default()).unwrap_err();
        match err {
            ReportError::Schema { location, message } => {
                assert_eq!(
                    location,
                    Location::Line {
                        source: "mem.csv".to_string(),
                        line: 1
                    }
                );
                assert!(message.contains("threads"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_value_reports_line() {
        let data = "N,threads,pattern,sec\n8,1,0,1.0\n8,two,0,1.0\n";
        let err = load_str(data, &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ReportError::Schema {
                location: Location::Line { line: 3, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_short_row_is_schema_error() {
        let data = "N,threads,pattern,sec\n8,1,0,1.0\n16,1,0\n";
        let err = load_str(data, &LoadOptions::default()).unwrap_err();
        match err {
            ReportError::Schema {
                location: Location::Line { line, .. },
                message,
            } => {
                assert_eq!(line, 3);
                assert!(message.contains("elapsed"), "{message}");
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_pattern_codes_keep_source_text() {
        let data = "N,threads,pattern,sec\n8,1,01,1.0\n8,1,1,1.0\n";
        let records = load_str(data, &LoadOptions::default()).unwrap();
        assert_eq!(records[0].pattern, PatternId::Name("01".to_string()));
        assert_eq!(records[1].pattern, PatternId::Code(1));
        assert_ne!(
            Field::Pattern.key_value(&records[0]),
            Field::Pattern.key_value(&records[1])
        );
    }

    #[test]
    fn test_non_positive_elapsed_is_invalid_measurement() {
        let data = "N,threads,pattern,sec\n8,1,0,0\n";
        assert!(matches!(
            load_str(data, &LoadOptions::default()),
            Err(ReportError::InvalidMeasurement {
                location: Location::Line { line: 2, .. },
                ..
            })
        ));
    }

    #[test]
    fn test_only_sizes_filter() {
        let data = "N,threads,pattern,sec\n8,1,0,1.0\n16,1,0,2.0\n32,1,0,3.0\n";
        let opts = LoadOptions {
            only_sizes: Some(vec![8, 32]),
            ..Default::default()
        };
        let sizes: Vec<u64> = load_str(data, &opts).unwrap().iter().map(|r| r.size).collect();
        assert_eq!(sizes, vec![8, 32]);
    }

    #[test]
    fn test_input_spec_parsing() {
        let tagged: InputSpec = "optimized=results_optimized.csv".parse().unwrap();
        assert_eq!(tagged.version.as_deref(), Some("optimized"));
        assert_eq!(tagged.path, PathBuf::from("results_optimized.csv"));

        let plain: InputSpec = "data/results.csv".parse().unwrap();
        assert_eq!(plain.version, None);

        let pathy: InputSpec = "runs/a=b.csv".parse().unwrap();
        assert_eq!(pathy.version, None);
        assert_eq!(pathy.path, PathBuf::from("runs/a=b.csv"));

        assert!("opt=".parse::<InputSpec>().is_err());
    }

    #[test]
    fn test_write_and_load_directory() {
        let dir = tempdir().unwrap();
        let records = generate_trials(&SynthConfig::default());

        let mut buf = Vec::new();
        write_records(&mut buf, &records, "buf").unwrap();
        fs::write(dir.path().join("b.csv"), &buf).unwrap();
        fs::write(dir.path().join("a.csv"), "N,threads,pattern,sec\n8,1,9,1.5\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_csv_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.csv"));

        let inputs = vec![InputSpec {
            version: Some("tagged".to_string()),
            path: dir.path().to_path_buf(),
        }];
        let loaded = load_inputs(&inputs, &LoadOptions::default()).unwrap();
        assert_eq!(loaded.len(), records.len() + 1);
        assert_eq!(loaded[0].size, 8);
        assert_eq!(loaded[0].version, "tagged");
        // b.csv carries its own version column.
        assert_eq!(&loaded[1..], &records[..]);
    }

    #[test]
    fn test_describe() {
        let data = "N,threads,pattern,sec,version\n\
                    512,4,1,0.5,optimized\n\
                    256,1,0,2.0,unoptimized\n\
                    256,4,0,0.75,optimized\n";
        let info = describe(&load_str(data, &LoadOptions::default()).unwrap());

        assert_eq!(info.records, 3);
        assert_eq!(info.sizes, vec![256, 512]);
        assert_eq!(info.threads, vec![1, 4]);
        assert_eq!(info.patterns, vec![PatternId::Code(0), PatternId::Code(1)]);
        assert_eq!(info.versions, vec!["optimized", "unoptimized"]);
        assert_eq!(info.elapsed_min, Some(0.5));
        assert_eq!(info.elapsed_max, Some(2.0));
        assert_eq!(describe(&[]).elapsed_min, None);
    }
}
