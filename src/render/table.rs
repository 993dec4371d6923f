//! CSV tables: best observed times and derived metrics.

use std::io::Write;
use std::path::PathBuf;

use crate::error::{ReportError, Result};
use crate::schema::ReportBundle;

fn csv_err(dest: &str) -> impl Fn(csv::Error) -> ReportError + '_ {
    move |e| ReportError::Csv {
        path: PathBuf::from(dest),
        source: e,
    }
}

/// One row per best-time entry: `<key fields>,best_time_sec,best_version`.
/// Pattern key columns carry display labels.
pub fn write_best_times<W: Write>(writer: W, bundle: &ReportBundle, dest: &str) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = bundle.best_time_fields.iter().map(|f| f.name()).collect();
    header.extend(["best_time_sec", "best_version"]);
    wtr.write_record(&header).map_err(csv_err(dest))?;

    for e in &bundle.best_times {
        let mut row = e.key_labels.clone();
        row.push(e.value.to_string());
        row.push(e.winner_label.clone());
        wtr.write_record(&row).map_err(csv_err(dest))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Long-format metrics: `size,pattern,threads,elapsed,speedup,efficiency,throughput`.
pub fn write_metrics<W: Write>(writer: W, bundle: &ReportBundle, dest: &str) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "size",
        "pattern",
        "threads",
        "elapsed",
        "speedup",
        "efficiency",
        "throughput",
    ])
    .map_err(csv_err(dest))?;

    for m in &bundle.metrics {
        for (threads, set) in &m.by_threads {
            wtr.write_record([
                m.size.to_string(),
                m.label.clone(),
                threads.to_string(),
                set.elapsed.to_string(),
                set.speedup.to_string(),
                set.efficiency.to_string(),
                set.throughput.to_string(),
            ])
            .map_err(csv_err(dest))?;
        }
    }
    wtr.flush()?;
    Ok(())
}
