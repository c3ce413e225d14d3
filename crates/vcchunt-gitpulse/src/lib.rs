//! Git history mining: blame-based VCC nomination and commit statistics.
//!
//! The engines talk to the repository only through the [`History`] trait.
//! [`GitHistory`] implements it over git2; [`MemoryHistory`] is a scripted
//! implementation for tests and dry runs.

pub mod blame;
pub mod cache;
pub mod memory;
pub mod repo;
pub mod stats;

pub use blame::{vcc_heuristic, Attribution, BlameConflict, BlameOptions, VccOutcome, VoteTally};
pub use cache::LocalCopies;
pub use memory::MemoryHistory;
pub use repo::{BlameHit, GitHistory, History};
pub use stats::{commit_stats, StatOptions};
