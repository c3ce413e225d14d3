//! Core types, configuration, and error handling for vcchunt.
//!
//! This crate provides the shared foundation used by all other vcchunt crates:
//! - [`VccError`]: unified error type using `thiserror` and `miette`
//! - [`VccConfig`]: run settings and vulnerability entries from `vcchunt.toml`
//! - Shared types: [`VulnerabilityEntry`], [`CommitMeta`], [`StatisticsReport`],
//!   [`ProvenanceRecord`], [`BatchReport`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{BlameMode, ConflictPolicy, RunConfig, ShortHistoryPolicy, VccConfig};
pub use error::VccError;
pub use types::{
    Affected, BatchReport, CommitMeta, DeveloperStats, EntryFailure, FileStats, Interval,
    LineCounts, Modification, OutputFormat, ProvenanceRecord, StatisticsReport, VccFinding,
    VulnerabilityEntry,
};

/// A convenience `Result` type for vcchunt operations.
pub type Result<T> = std::result::Result<T, VccError>;
