use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use matbench_report::aggregate::TieBreak;
use matbench_report::assemble::PatternLabels;
use matbench_report::dataset::{self, InputSpec, LoadOptions};
use matbench_report::pipeline::{build_report, ReportOptions};
use matbench_report::render::{table, text};
use matbench_report::schema::{Field, ReportEnvelope, RunMeta, TrialRecord};
use matbench_report::synth::{generate_trials, Profile, SynthConfig};
use matbench_report::WorkModel;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(ClapArgs, Debug)]
struct LoadArgs {
    /// CSV file or directory of CSV files. Can be provided multiple times.
    ///
    /// Prefix with `VERSION=` to label files that have no version column.
    #[arg(short, long, value_name = "[VERSION=]PATH", required = true, num_args = 1.., action = clap::ArgAction::Append)]
    input: Vec<InputSpec>,

    /// Keep only these matrix sizes.
    #[arg(long, value_name = "N,...", value_delimiter = ',')]
    only_sizes: Option<Vec<u64>>,
}

#[derive(ClapArgs, Debug)]
struct ReportArgs {
    #[command(flatten)]
    load: LoadArgs,

    /// Thread count that speedup is measured against.
    #[arg(long, default_value_t = 1)]
    baseline_threads: u32,

    /// Operation count model for GFLOPS.
    #[arg(long, value_enum, default_value_t = WorkModel::MatMul)]
    work: WorkModel,

    #[arg(long, value_enum, default_value_t = TieBreak::Encounter)]
    tie_break: TieBreak,

    /// Fields identifying one time-vs-size series.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Field::Pattern])]
    series_by: Vec<Field>,

    /// Fields identifying one best-time row.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Field::Size, Field::Pattern])]
    best_by: Vec<Field>,

    /// Sizes to place on the chart axis even when no trial ran at them.
    #[arg(long, value_name = "N,...", value_delimiter = ',')]
    axis_domain: Option<Vec<u64>>,

    /// Pattern display name. Can be provided multiple times.
    #[arg(long, value_name = "CODE=NAME", action = clap::ArgAction::Append)]
    label: Vec<String>,

    /// JSON object of pattern display names, e.g. {"0": "row_major"}.
    #[arg(long, value_name = "FILE")]
    labels: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full report bundle with run metadata (JSON).
    Report(ReportArgs),

    /// Human-readable comparison report.
    Text(ReportArgs),

    /// Best observed time per group (CSV).
    BestTimes(ReportArgs),

    /// Speedup, efficiency and GFLOPS per pattern, size and thread count (CSV).
    Metrics(ReportArgs),

    /// Summarize the loaded trials (JSON).
    Info(LoadArgs),

    /// Write a deterministic synthetic trial set (CSV).
    ///
    /// Sizes, thread counts, patterns and versions follow `--profile`;
    /// output depends only on the profile, seed and flags below.
    Generate {
        /// Probability of leaving out a whole (size, pattern, version, threads) cell.
        #[arg(long, default_value_t = 0.0)]
        drop_rate: f64,

        /// Operation count model shaping the synthetic timings.
        #[arg(long, value_enum, default_value_t = WorkModel::MatMul)]
        work: WorkModel,
    },
}

#[derive(Parser, Debug)]
#[command(name = "matbench-report")]
#[command(about = "Aggregate matrix benchmark trials into speedup/efficiency reports")]
struct Args {
    #[arg(long, value_enum, default_value_t = ProfileArg::Quick, global = true)]
    profile: ProfileArg,

    #[arg(long, default_value_t = 0, global = true)]
    seed: u64,

    /// Where to write output. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn now_unix_stamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn output(out: Option<&Path>) -> Result<(Box<dyn Write>, String)> {
    match out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            Ok((Box::new(BufWriter::new(file)), path.display().to_string()))
        }
        None => Ok((Box::new(io::stdout().lock()), "<stdout>".to_string())),
    }
}

fn write_json<T: serde::Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(out) = out {
        fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
    } else {
        println!("{json}");
    }
    Ok(())
}

fn load(args: &LoadArgs) -> Result<Vec<TrialRecord>> {
    let opts = LoadOptions {
        version: None,
        only_sizes: args.only_sizes.clone(),
    };
    let records = dataset::load_inputs(&args.input, &opts).context("loading trial records")?;
    info!(
        inputs = args.input.len(),
        records = records.len(),
        "loaded trials"
    );
    Ok(records)
}

fn report_options(args: &ReportArgs) -> Result<ReportOptions> {
    let mut labels = match &args.labels {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            PatternLabels::from_json(&raw)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => PatternLabels::new(),
    };
    for assignment in &args.label {
        let (pattern, name) = PatternLabels::parse_assignment(assignment)?;
        labels.insert(pattern, name);
    }

    Ok(ReportOptions {
        baseline_threads: args.baseline_threads,
        work: args.work,
        tie_break: args.tie_break,
        series_fields: args.series_by.clone(),
        best_fields: args.best_by.clone(),
        axis_domain: args.axis_domain.clone(),
        labels,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let out = args.out.as_deref();

    match &args.cmd {
        Command::Report(r) => {
            let records = load(&r.load)?;
            let opts = report_options(r)?;
            let bundle = build_report(&records, &opts)?;
            let envelope = ReportEnvelope {
                run: RunMeta {
                    schema_version: 1,
                    tool_version: env!("CARGO_PKG_VERSION").to_string(),
                    inputs: r.load.input.iter().map(ToString::to_string).collect(),
                    record_count: records.len(),
                    baseline_threads: opts.baseline_threads,
                    work_model: opts.work.as_str().to_string(),
                    timestamp_utc: now_unix_stamp(),
                    git_sha: git_sha_short(),
                    bundle_sha256: bundle.fingerprint()?,
                },
                bundle,
            };
            write_json(&envelope, out)?;
        }
        Command::Text(r) => {
            let bundle = build_report(&load(&r.load)?, &report_options(r)?)?;
            let (mut w, _) = output(out)?;
            text::write_comparison(&mut w, &bundle)?;
            w.flush()?;
        }
        Command::BestTimes(r) => {
            let bundle = build_report(&load(&r.load)?, &report_options(r)?)?;
            let (w, dest) = output(out)?;
            table::write_best_times(w, &bundle, &dest)?;
        }
        Command::Metrics(r) => {
            let bundle = build_report(&load(&r.load)?, &report_options(r)?)?;
            if !bundle.missing_baselines.is_empty() {
                info!(
                    excluded = bundle.missing_baselines.len(),
                    "pairs without a baseline are left out of the metrics table"
                );
            }
            let (w, dest) = output(out)?;
            table::write_metrics(w, &bundle, &dest)?;
        }
        Command::Info(l) => {
            let records = load(l)?;
            write_json(&dataset::describe(&records), out)?;
        }
        Command::Generate { drop_rate, work } => {
            let profile: Profile = args.profile.into();
            let cfg = SynthConfig {
                drop_rate: *drop_rate,
                work: *work,
                ..SynthConfig::for_profile(profile, args.seed)
            };
            let records = generate_trials(&cfg);
            info!(
                profile = profile.as_str(),
                seed = cfg.seed,
                records = records.len(),
                "generated synthetic trials"
            );
            let (w, dest) = output(out)?;
            dataset::write_records(w, &records, &dest)?;
        }
    }

    Ok(())
}
