//! Deterministic synthetic trial sets.
//!
//! Produces plausible timing tables (sub-linear thread scaling, per-pattern
//! cost factors, bounded jitter) for demos, benches and tests. Output depends
//! only on the config, never on thread scheduling.

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::schema::{PatternId, TrialRecord, DEFAULT_VERSION};
use crate::WorkModel;

#[derive(Clone, Copy, Debug)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SynthConfig {
    pub sizes: Vec<u64>,
    pub threads: Vec<u32>,
    pub patterns: Vec<PatternId>,
    pub versions: Vec<String>,
    /// Repeated trials per (size, pattern, version, threads).
    pub trials: usize,
    pub seed: u64,
    /// Probability that a whole (size, pattern, version, threads) cell is left out.
    pub drop_rate: f64,
    pub work: WorkModel,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sizes: vec![64, 128, 256, 512],
            threads: vec![1, 2, 4, 8],
            patterns: (0..4).map(PatternId::Code).collect(),
            versions: vec![DEFAULT_VERSION.to_string()],
            trials: 3,
            seed: 42,
            drop_rate: 0.0,
            work: WorkModel::MatMul,
        }
    }
}

impl SynthConfig {
    pub fn for_profile(profile: Profile, seed: u64) -> Self {
        match profile {
            Profile::Quick => Self {
                seed,
                ..Self::default()
            },
            Profile::Full => Self {
                sizes: vec![256, 512, 1024, 2048],
                threads: vec![1, 2, 4, 8, 16],
                patterns: (0..6).map(PatternId::Code).collect(),
                versions: vec!["unoptimized".to_string(), "optimized".to_string()],
                trials: 10,
                seed,
                ..Self::default()
            },
        }
    }

    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

fn per_cell_seed(master_seed: u64, index: usize) -> u64 {
    master_seed
        .wrapping_add(index as u64)
        .wrapping_mul(0x517cc1b727220a95)
}

struct TrialCell {
    size: u64,
    pattern_idx: usize,
    version_idx: usize,
    threads: u32,
}

fn generate_cell(cfg: &SynthConfig, index: usize, cell: &TrialCell) -> Vec<TrialRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(per_cell_seed(cfg.seed, index));
    if cfg.drop_rate > 0.0 && rng.gen::<f64>() < cfg.drop_rate {
        return Vec::new();
    }

    // ~1 GFLOP/s single thread, patterns progressively slower, later versions faster.
    let gflops = 1.0 / (1.0 + 0.35 * cell.pattern_idx as f64);
    let version_factor = 0.6f64.powi(cell.version_idx as i32);
    let single = cfg.work.work(cell.size) / (gflops * 1e9) * version_factor;

    let t = f64::from(cell.threads);
    let efficiency = 1.0 / (1.0 + 0.08 * (t - 1.0));
    let scaled = single / (t * efficiency);

    (0..cfg.trials)
        .map(|_| {
            let jitter = rng.gen_range(0.0..0.08);
            let elapsed = (scaled * (1.0 + jitter)).max(1e-9);
            let text = format!("{elapsed:.9}");
            TrialRecord {
                size: cell.size,
                threads: cell.threads,
                pattern: cfg.patterns[cell.pattern_idx].clone(),
                version: cfg.versions[cell.version_idx].clone(),
                elapsed: text.parse().unwrap_or(elapsed),
                elapsed_text: text,
            }
        })
        .collect()
}

/// Generate records in (size, pattern, version, threads, trial) order.
pub fn generate_trials(cfg: &SynthConfig) -> Vec<TrialRecord> {
    let mut cells = Vec::new();
    for &size in &cfg.sizes {
        for pattern_idx in 0..cfg.patterns.len() {
            for version_idx in 0..cfg.versions.len() {
                for &threads in &cfg.threads {
                    cells.push(TrialCell {
                        size,
                        pattern_idx,
                        version_idx,
                        threads,
                    });
                }
            }
        }
    }

    // Indexed parallel map; collect preserves order.
    let per_cell: Vec<Vec<TrialRecord>> = cells
        .par_iter()
        .enumerate()
        .map(|(i, cell)| generate_cell(cfg, i, cell))
        .collect();

    per_cell.into_iter().flatten().collect()
}
