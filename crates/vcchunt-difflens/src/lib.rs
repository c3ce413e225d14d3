//! Unified diff parsing and line classification.
//!
//! Turns `git diff` text into an ordered file / hunk / line model with
//! 1-based source and target line numbers that can be handed straight to
//! blame, and decides which diff lines are comment or blank noise.

pub mod classify;
pub mod parser;

pub use classify::{is_noise, is_significant};
pub use parser::{parse_patch, FilePatch, Hunk, Line, LineRole, NULL_PATH};
