use std::path::PathBuf;

/// Errors raised while mining vulnerability-contributing commits.
///
/// Every variant is scoped to the entry being analyzed: the batch runner
/// records it against that entry and keeps processing the others. Library
/// crates return this type directly; the binary renders it through `miette`.
///
/// # Examples
///
/// ```
/// use vcchunt_core::VccError;
///
/// let err = VccError::FileMismatch {
///     expected: "src/a.go".into(),
///     source_path: "a/src/b.go".into(),
///     target_path: "b/src/b.go".into(),
/// };
/// assert!(err.to_string().contains("src/a.go"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum VccError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(vcchunt::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(vcchunt::config), help("check the [[entries]] table of the config file"))]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    #[diagnostic(code(vcchunt::git))]
    Git(String),

    /// The local copy of a repository could not be opened or cloned.
    #[error("cannot access repository {repo}: {reason}")]
    #[diagnostic(
        code(vcchunt::repo_access),
        help("pass --force-reset to discard the local copy and clone it again")
    )]
    RepoAccess {
        /// `owner/name` identifier or local path.
        repo: String,
        /// Underlying failure.
        reason: String,
    },

    /// Unified diff text could not be parsed.
    #[error("parse error: {0}")]
    #[diagnostic(code(vcchunt::parse))]
    Parse(String),

    /// A patch does not describe the file the entry declares.
    #[error("inconsistent file names in patch: expected {expected}, got {source_path} -> {target_path}")]
    #[diagnostic(
        code(vcchunt::file_mismatch),
        help("the files list must name every touched path, in diff order")
    )]
    FileMismatch {
        /// Configured repository-relative path.
        expected: String,
        /// `---` side of the patch as printed by the diff.
        source_path: String,
        /// `+++` side of the patch as printed by the diff.
        target_path: String,
    },

    /// A single-line blame returned something other than one attribution.
    #[error("blaming {path}:{line} at {commit} yields {hits} results")]
    #[diagnostic(code(vcchunt::blame_ambiguous))]
    BlameAmbiguous {
        /// Revision the blame ran against.
        commit: String,
        /// File being blamed.
        path: String,
        /// 1-based line number.
        line: u32,
        /// Number of attributions returned.
        hits: usize,
    },

    /// Parents of a merge fix disagree on the origin of a line.
    #[error("inconsistent blame across parents for {path}:{line}")]
    #[diagnostic(code(vcchunt::blame_conflict))]
    BlameConflict {
        /// File being blamed.
        path: String,
        /// 1-based line number.
        line: u32,
    },

    /// An input the statistics or heuristic rely on is missing.
    #[error("precondition violated: {0}")]
    #[diagnostic(code(vcchunt::precondition))]
    Precondition(String),

    /// JSON serialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(vcchunt::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(vcchunt::toml))]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(vcchunt::file_not_found))]
    FileNotFound(PathBuf),
}

impl VccError {
    /// Short machine-readable name of the error class, used in reports.
    ///
    /// # Examples
    ///
    /// ```
    /// use vcchunt_core::VccError;
    ///
    /// assert_eq!(VccError::Precondition("x".into()).kind(), "precondition");
    /// ```
    pub fn kind(&self) -> &'static str {
        match self {
            VccError::Io(_) => "io",
            VccError::Config(_) => "config",
            VccError::Git(_) => "git",
            VccError::RepoAccess { .. } => "repo-access",
            VccError::Parse(_) => "parse",
            VccError::FileMismatch { .. } => "file-mismatch",
            VccError::BlameAmbiguous { .. } => "blame-ambiguous",
            VccError::BlameConflict { .. } => "blame-conflict",
            VccError::Precondition(_) => "precondition",
            VccError::Serialization(_) => "serialization",
            VccError::Toml(_) => "toml",
            VccError::FileNotFound(_) => "file-not-found",
        }
    }
}
