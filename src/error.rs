//! Error types for loading and aggregating trial records.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Where an offending record lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Line of a loaded file (1-based, header is line 1).
    Line { source: String, line: usize },
    /// Index into an in-memory record slice.
    Index(usize),
    /// A derived group of records, described by its key.
    Group(String),
    /// Not tied to a single record (e.g. a bad field name).
    Query,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Line { source, line } => write!(f, "{source}:{line}"),
            Location::Index(i) => write!(f, "records[{i}]"),
            Location::Group(key) => write!(f, "group {key}"),
            Location::Query => f.write_str("query"),
        }
    }
}

/// Errors produced while building a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("schema error at {location}: {message}")]
    Schema { location: Location, message: String },

    #[error("invalid measurement at {location}: elapsed={elapsed} (must be finite and > 0)")]
    InvalidMeasurement { location: Location, elapsed: f64 },

    #[error("grouping produced no groups: {0}")]
    EmptyGroup(String),

    #[error("csv error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ReportError {
    pub(crate) fn schema(location: Location, message: impl Into<String>) -> Self {
        ReportError::Schema {
            location,
            message: message.into(),
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, ReportError>;
