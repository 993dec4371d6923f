//! Plain-text comparison report.

use std::io::{self, Write};

use crate::schema::{MetricsEntry, ReportBundle};
use crate::WorkModel;

const WIDTH: usize = 70;

fn threads_label(threads: u32) -> String {
    if threads == 1 {
        "1 Thread".to_string()
    } else {
        format!("{threads} Threads")
    }
}

fn section<W: Write>(w: &mut W, title: &str) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{}", "-".repeat(WIDTH))?;
    writeln!(w, "  {title}")?;
    writeln!(w, "{}", "-".repeat(WIDTH))
}

fn write_best_times<W: Write>(w: &mut W, bundle: &ReportBundle) -> io::Result<()> {
    if bundle.best_times.is_empty() {
        return Ok(());
    }
    section(w, "BEST OBSERVED TIME (lower is better)")?;
    let key_header = bundle
        .best_time_fields
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join("/");
    writeln!(w, "  {:<40} {:<14} {}", key_header, "Best (s)", "Version")?;
    writeln!(w, "  {}", "-".repeat(64))?;
    for e in &bundle.best_times {
        writeln!(
            w,
            "  {:<40} {:<14.6} {}",
            e.key_labels.join("/"),
            e.value,
            e.winner_label
        )?;
    }
    Ok(())
}

fn write_missing<W: Write>(w: &mut W, bundle: &ReportBundle) -> io::Result<()> {
    if bundle.missing_baselines.is_empty() {
        return Ok(());
    }
    section(w, "EXCLUDED (no baseline measurement)")?;
    for m in &bundle.missing_baselines {
        writeln!(
            w,
            "  {:<28} size {} has no {} run",
            m.label,
            m.size,
            threads_label(bundle.baseline_threads)
        )?;
    }
    Ok(())
}

/// Write the execution time / speedup / efficiency / throughput comparison
/// for the largest size that has metrics, at its highest thread count.
pub fn write_comparison<W: Write>(w: &mut W, bundle: &ReportBundle) -> io::Result<()> {
    writeln!(w, "{}", "=".repeat(WIDTH))?;
    writeln!(w, "  MULTITHREADING PERFORMANCE COMPARISON REPORT")?;
    writeln!(w, "{}", "=".repeat(WIDTH))?;
    writeln!(w)?;

    let Some(summary) = &bundle.summary else {
        writeln!(
            w,
            "No pattern has a {} measurement; scaling metrics unavailable.",
            threads_label(bundle.baseline_threads)
        )?;
        write_best_times(w, bundle)?;
        write_missing(w, bundle)?;
        return writeln!(w, "\n{}", "=".repeat(WIDTH));
    };

    let size = summary.size;
    let base = bundle.baseline_threads;
    let top = summary.threads;
    let tested: Vec<u32> = bundle.thread_charts.iter().map(|c| c.threads).collect();
    let rows: Vec<&MetricsEntry> = bundle.metrics.iter().filter(|m| m.size == size).collect();

    writeln!(w, "Matrix Size: {size} x {size}")?;
    writeln!(w, "Thread Counts Tested: {tested:?}")?;

    section(w, "COMPARISON METHOD 1: EXECUTION TIME")?;
    writeln!(w, "  Lower time = Better performance\n")?;
    writeln!(
        w,
        "  {:<28} {:<12} {:<12} {}",
        "Pattern",
        threads_label(base),
        threads_label(top),
        "Improvement"
    )?;
    writeln!(w, "  {}", "-".repeat(64))?;
    for m in &rows {
        let Some(t1) = m.by_threads.get(&base).map(|s| s.elapsed) else {
            continue;
        };
        match m.by_threads.get(&top) {
            Some(s) => writeln!(
                w,
                "  {:<28} {:<12.4} {:<12.4} {:.1}%",
                m.label,
                t1,
                s.elapsed,
                (t1 - s.elapsed) / t1 * 100.0
            )?,
            None => writeln!(w, "  {:<28} {:<12.4} {:<12} n/a", m.label, t1, "n/a")?,
        }
    }

    section(w, "COMPARISON METHOD 2: SPEEDUP")?;
    writeln!(w, "  Speedup = Time({}) / Time(N threads)", threads_label(base))?;
    writeln!(w, "  Ideal speedup with {top} threads = {top}x\n")?;
    writeln!(w, "  {:<28} {:<12} {}", "Pattern", "Speedup", "vs Ideal")?;
    writeln!(w, "  {}", "-".repeat(52))?;
    for m in &rows {
        if let Some(s) = m.by_threads.get(&top) {
            writeln!(
                w,
                "  {:<28} {:<12} {:.1}%",
                m.label,
                format!("{:.2}x", s.speedup),
                s.efficiency
            )?;
        }
    }

    section(w, "COMPARISON METHOD 3: EFFICIENCY")?;
    writeln!(w, "  Efficiency = (Speedup / N) x 100%")?;
    writeln!(w, "  100% = perfect thread utilization\n")?;
    writeln!(w, "  {:<28} {}", "Pattern", "Efficiency")?;
    writeln!(w, "  {}", "-".repeat(40))?;
    for m in &rows {
        if let Some(s) = m.by_threads.get(&top) {
            writeln!(w, "  {:<28} {:.1}%", m.label, s.efficiency)?;
        }
    }

    section(w, "COMPARISON METHOD 4: GFLOPS")?;
    match bundle.work_model {
        WorkModel::MatMul => writeln!(w, "  GFLOPS = 2 x N^3 / Time / 10^9")?,
        WorkModel::ElementWise => writeln!(w, "  GFLOPS = N^2 / Time / 10^9")?,
    }
    writeln!(w, "  Higher GFLOPS = Better computational throughput\n")?;
    writeln!(w, "  {:<28} {}", "Pattern", "GFLOPS")?;
    writeln!(w, "  {}", "-".repeat(40))?;
    for m in &rows {
        if let Some(s) = m.by_threads.get(&top) {
            writeln!(w, "  {:<28} {:.2}", m.label, s.throughput)?;
        }
    }

    write_best_times(w, bundle)?;
    write_missing(w, bundle)?;

    section(w, "SUMMARY")?;
    writeln!(w, "  Best Access Pattern: {}", summary.best_pattern)?;
    writeln!(w, "  Threads: {top}")?;
    writeln!(w, "  Execution Time: {:.4} s", summary.metrics.elapsed)?;
    writeln!(w, "  Speedup: {:.2}x", summary.metrics.speedup)?;
    writeln!(w, "  Efficiency: {:.1}%", summary.metrics.efficiency)?;
    writeln!(w, "  Performance: {:.2} GFLOPS", summary.metrics.throughput)?;
    writeln!(w, "\n{}", "=".repeat(WIDTH))
}
