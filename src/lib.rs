use clap::ValueEnum;
use serde::Serialize;

pub mod aggregate;
pub mod assemble;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod render;
pub mod schema;
pub mod synth;

pub use error::{ReportError, Result};

/// Operation count model used for throughput.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkModel {
    /// Dense matrix multiply: 2 * N^3 floating point operations.
    #[default]
    #[value(name = "matmul")]
    MatMul,
    /// Element-wise kernels such as matrix addition: N^2 operations.
    #[value(name = "elementwise")]
    ElementWise,
}

impl WorkModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkModel::MatMul => "matmul",
            WorkModel::ElementWise => "elementwise",
        }
    }

    /// Operations performed for one N x N run.
    pub fn work(&self, size: u64) -> f64 {
        let n = size as f64;
        match self {
            WorkModel::MatMul => 2.0 * n * n * n,
            WorkModel::ElementWise => n * n,
        }
    }
}
