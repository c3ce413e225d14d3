use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// One vulnerability to analyze: a fix commit and the files it repairs.
///
/// # Examples
///
/// ```
/// use vcchunt_core::VulnerabilityEntry;
///
/// let entry = VulnerabilityEntry {
///     cve_id: "CVE-2020-0001".into(),
///     repo: "owner/project".into(),
///     fix: "deadbeef".into(),
///     files: vec!["src/parse.c".into()],
/// };
/// assert_eq!(entry.to_string(), "owner/project@deadbeef(CVE-2020-0001)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityEntry {
    /// Advisory identifier.
    pub cve_id: String,
    /// Repository identifier in `owner/name` form.
    pub repo: String,
    /// Revision of the fixing commit.
    pub fix: String,
    /// Repository-relative paths touched by the fix, in diff order.
    pub files: Vec<String>,
}

impl fmt::Display for VulnerabilityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}({})", self.repo, self.fix, self.cve_id)
    }
}

/// Commit metadata as resolved from the repository.
///
/// # Examples
///
/// ```
/// use vcchunt_core::CommitMeta;
///
/// let c = CommitMeta {
///     id: "abc123".into(),
///     author_name: "alice".into(),
///     author_email: "alice@example.com".into(),
///     message: "fix overflow\n".into(),
///     parents: vec!["def456".into()],
///     timestamp: 1_700_000_000,
/// };
/// assert!(!c.is_root());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMeta {
    /// Full commit id.
    pub id: String,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// Full commit message.
    pub message: String,
    /// Parent commit ids, first parent first.
    pub parents: Vec<String>,
    /// Committer time, seconds since the Unix epoch.
    pub timestamp: i64,
}

impl CommitMeta {
    /// Whether this commit has no parent.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Committer time as a UTC datetime.
    pub fn committed_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }

    /// Time elapsed from `earlier` to this commit.
    ///
    /// # Examples
    ///
    /// ```
    /// use vcchunt_core::CommitMeta;
    ///
    /// let mk = |id: &str, ts| CommitMeta {
    ///     id: id.into(),
    ///     author_name: String::new(),
    ///     author_email: String::new(),
    ///     message: String::new(),
    ///     parents: vec![],
    ///     timestamp: ts,
    /// };
    /// assert_eq!(mk("b", 3_600).since(&mk("a", 0)).seconds, 3_600);
    /// ```
    pub fn since(&self, earlier: &CommitMeta) -> Interval {
        Interval::from(self.committed_at() - earlier.committed_at())
    }
}

/// A signed span of time, reported both in seconds and in readable form.
///
/// # Examples
///
/// ```
/// use vcchunt_core::Interval;
///
/// let i = Interval::from_seconds(90_061);
/// assert_eq!(i.human, "1d 01:01:01");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Whole seconds.
    pub seconds: i64,
    /// `[-]Nd HH:MM:SS`.
    pub human: String,
}

impl Interval {
    /// Build an interval from whole seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        let sign = if seconds < 0 { "-" } else { "" };
        let abs = seconds.unsigned_abs();
        let (days, rem) = (abs / 86_400, abs % 86_400);
        let human = format!(
            "{sign}{days}d {:02}:{:02}:{:02}",
            rem / 3_600,
            (rem % 3_600) / 60,
            rem % 60
        );
        Self { seconds, human }
    }
}

impl From<TimeDelta> for Interval {
    fn from(delta: TimeDelta) -> Self {
        Self::from_seconds(delta.num_seconds())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.human)
    }
}

/// Added/deleted line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounts {
    /// Lines added.
    pub added: u64,
    /// Lines deleted.
    pub deleted: u64,
}

/// Patch size of a commit, raw and with comment/blank lines excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modification {
    /// Every added/removed line.
    pub total: LineCounts,
    /// Only significant lines.
    pub no_comment_blank: LineCounts,
}

/// Developers that historically touched the affected files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperStats {
    /// Distinct authors across all affected files.
    pub total: usize,
    /// `total / affected files`.
    pub average: f64,
    /// Largest first-parent commit count among those authors.
    pub max_commits: usize,
    /// Smallest first-parent commit count among those authors.
    pub min_commits: usize,
}

/// File-level history statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    /// Number of affected files.
    pub total: usize,
    /// Mean gap between the two most recent commits of each file.
    pub average_interval: Interval,
    /// Mean history length of the affected files.
    pub average_times: f64,
    /// Developer diversity.
    pub developers: DeveloperStats,
}

/// Scope of a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affected {
    /// Distinct parent directories of the affected files.
    pub dirs: usize,
    /// Per-file history statistics.
    pub files: FileStats,
}

/// Description of one commit's footprint and the history around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsReport {
    /// Commit id.
    pub commit: String,
    /// Author email.
    pub author: String,
    /// Full commit message.
    pub message: String,
    /// Parent commit ids.
    pub parents: Vec<String>,
    /// Patch size metrics.
    pub modification: Modification,
    /// Affected scope.
    pub affected: Affected,
}

/// A candidate vulnerability-contributing commit with its statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VccFinding {
    /// Candidate commit id.
    pub commit: String,
    /// Votes the candidate received.
    pub votes: u32,
    /// Time from the candidate to the fix.
    pub interval: Interval,
    /// Statistics of the candidate.
    pub stat: StatisticsReport,
}

/// Result of analyzing one [`VulnerabilityEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRecord {
    /// Repository identifier.
    pub repo: String,
    /// Full id of the fix commit.
    pub fix_commit: String,
    /// Email of the fix author.
    pub fix_author: String,
    /// Advisory identifier.
    pub cve_id: String,
    /// Candidates tied for the most votes; empty when none was found.
    pub vcc: Vec<VccFinding>,
}

/// An entry whose analysis was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFailure {
    /// Position of the entry in the configuration.
    pub index: usize,
    /// Advisory identifier.
    pub cve_id: String,
    /// Repository identifier.
    pub repo: String,
    /// Configured fix revision.
    pub fix: String,
    /// Error class, see `VccError::kind`.
    pub kind: String,
    /// Rendered error message.
    pub message: String,
}

/// Output of a batch run, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Successfully analyzed entries.
    pub records: Vec<ProvenanceRecord>,
    /// Entries that failed.
    pub failures: Vec<EntryFailure>,
}

impl BatchReport {
    /// Whether every entry succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Output format for reports.
///
/// # Examples
///
/// ```
/// use vcchunt_core::OutputFormat;
///
/// let fmt: OutputFormat = "markdown".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// Pretty-printed JSON with camelCase keys.
    Json,
    /// GitHub-flavored Markdown.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {s}")),
        }
    }
}
