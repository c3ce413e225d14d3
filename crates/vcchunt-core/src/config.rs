use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VccError;
use crate::types::VulnerabilityEntry;

/// Top-level configuration loaded from `vcchunt.toml`.
///
/// Entries are validated when the file is loaded, so the engines never see
/// a malformed entry.
///
/// # Examples
///
/// ```
/// use vcchunt_core::VccConfig;
///
/// let config = VccConfig::default();
/// assert_eq!(config.run.workers, 4);
/// assert!(config.entries.is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VccConfig {
    /// Run behavior.
    #[serde(default)]
    pub run: RunConfig,
    /// Vulnerabilities to analyze, in report order.
    #[serde(default)]
    pub entries: Vec<VulnerabilityEntry>,
}

impl VccConfig {
    /// Load and validate configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VccError::FileNotFound`] if the file does not exist,
    /// [`VccError::Toml`] if the content is not valid TOML, or
    /// [`VccError::Config`] if an entry is malformed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vcchunt_core::VccConfig;
    /// use std::path::Path;
    ///
    /// let config = VccConfig::from_file(Path::new("vcchunt.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, VccError> {
        if !path.exists() {
            return Err(VccError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`VccError::Toml`] if parsing fails or [`VccError::Config`]
    /// if validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use vcchunt_core::VccConfig;
    ///
    /// let toml = r#"
    /// [[entries]]
    /// cve_id = "CVE-2020-0001"
    /// repo = "owner/name"
    /// fix = "abc123"
    /// files = ["src/a.c"]
    /// "#;
    /// let config = VccConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.entries.len(), 1);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, VccError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every entry for the shape the engines rely on.
    ///
    /// # Errors
    ///
    /// Returns [`VccError::Config`] naming the first offending entry.
    pub fn validate(&self) -> Result<(), VccError> {
        for (index, entry) in self.entries.iter().enumerate() {
            validate_entry(entry).map_err(|reason| {
                VccError::Config(format!("entry {index} ({}): {reason}", entry.cve_id))
            })?;
        }
        Ok(())
    }
}

fn validate_entry(entry: &VulnerabilityEntry) -> Result<(), String> {
    if entry.cve_id.trim().is_empty() {
        return Err("cve_id is empty".into());
    }
    if entry.fix.trim().is_empty() {
        return Err("fix is empty".into());
    }
    match entry.repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
        _ => return Err(format!("repo must be owner/name, got {:?}", entry.repo)),
    }
    if entry.files.is_empty() {
        return Err("files is empty".into());
    }
    let mut seen = HashSet::new();
    for file in &entry.files {
        if file.trim().is_empty() {
            return Err("files contains an empty path".into());
        }
        if !seen.insert(file.as_str()) {
            return Err(format!("file {file} is listed twice"));
        }
    }
    Ok(())
}

/// Batch run settings.
///
/// # Examples
///
/// ```
/// use vcchunt_core::{BlameMode, RunConfig, ShortHistoryPolicy};
///
/// let run = RunConfig::default();
/// assert_eq!(run.blame_mode, BlameMode::Independent);
/// assert_eq!(run.short_history, ShortHistoryPolicy::Error);
/// assert!(!run.force_reset);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding local clones (default: `.repo`).
    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,
    /// Remote prefix to clone `owner/name` from (default: `https://github.com`).
    #[serde(default = "default_remote_base")]
    pub remote_base: String,
    /// Worker threads; 0 means one per CPU (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Discard and re-clone local copies that fail to open.
    #[serde(default)]
    pub force_reset: bool,
    /// How merge fixes are blamed.
    #[serde(default)]
    pub blame_mode: BlameMode,
    /// What to do when parents disagree in unanimous mode.
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
    /// What to do with files that have a single historical commit.
    #[serde(default)]
    pub short_history: ShortHistoryPolicy,
}

fn default_repo_dir() -> PathBuf {
    PathBuf::from(".repo")
}

fn default_remote_base() -> String {
    "https://github.com".into()
}

fn default_workers() -> usize {
    4
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            repo_dir: default_repo_dir(),
            remote_base: default_remote_base(),
            workers: default_workers(),
            force_reset: false,
            blame_mode: BlameMode::default(),
            on_conflict: ConflictPolicy::default(),
            short_history: ShortHistoryPolicy::default(),
        }
    }
}

/// Strategy for blaming a fix commit against its parents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlameMode {
    /// Diff and blame each parent separately, summing votes.
    #[default]
    Independent,
    /// Diff against the first parent; every parent must agree per line.
    Unanimous,
}

/// Reaction to parents disagreeing on a line in unanimous mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Abort the entry.
    #[default]
    Abort,
    /// Log the conflict and leave the line without a vote.
    Skip,
}

/// Reaction to an affected file with fewer than two historical commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortHistoryPolicy {
    /// Abort the statistics of the entry.
    #[default]
    Error,
    /// Leave the file out of the interval average.
    Skip,
}

macro_rules! lowercase_enum_str {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($name),)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(format!("unknown value: {s}")),
                }
            }
        }
    };
}

lowercase_enum_str!(BlameMode { Independent => "independent", Unanimous => "unanimous" });
lowercase_enum_str!(ConflictPolicy { Abort => "abort", Skip => "skip" });
lowercase_enum_str!(ShortHistoryPolicy { Error => "error", Skip => "skip" });
