//! Per-entry provenance records and batch orchestration.
//!
//! [`analyze_entry`] runs the blame heuristic and the statistics engine for
//! one vulnerability. [`run_batch`] does it for a whole configuration on a
//! worker pool, and [`output`] renders the result.

pub mod batch;
pub mod output;
pub mod record;

pub use batch::run_batch;
pub use output::render;
pub use record::{analyze_entry, AnalysisOptions};
