//! Library side of the `dg` command-line tool.
//!
//! The binary parses arguments and renders output; the reports it prints
//! are built here so they can be tested without spawning a process.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::DgError;

mod report;

pub use report::{batch_reports, coarsen_to_csv, stats_report, BatchReport, CoarsenReport, StatsReport};

/// Errors surfaced by the command-line tool.
#[derive(Debug, Error)]
pub enum CliError {
    /// Failure inside the graph library.
    #[error(transparent)]
    Graph(#[from] DgError),
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Config file is not valid TOML for the expected layout.
    #[error("failed to parse config {path}: {source}")]
    ParseConfig {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// JSON rendering failed.
    #[error("failed to render json: {0}")]
    Json(#[from] serde_json::Error),
    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Invalid combination of arguments.
    #[error("{0}")]
    Message(String),
}
