//! Blame-based nomination of vulnerability-contributing commits.
//!
//! Every significant line the fix removes is blamed in the parent. So is an
//! unchanged line directly before or after an added line: a check that was
//! missing next to that code points at whoever wrote the code. Each blamed
//! line is one vote for the commit that last changed it, and the commits
//! with the most votes are the candidates.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};
use vcchunt_core::{BlameMode, ConflictPolicy, VccError};
use vcchunt_difflens::{is_significant, parse_patch, FilePatch, Hunk, Line, LineRole};

use crate::repo::History;

/// Knobs of the heuristic.
///
/// # Examples
///
/// ```
/// use vcchunt_core::{BlameMode, ConflictPolicy};
/// use vcchunt_gitpulse::BlameOptions;
///
/// let opts = BlameOptions::default();
/// assert_eq!(opts.mode, BlameMode::Independent);
/// assert_eq!(opts.on_conflict, ConflictPolicy::Abort);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BlameOptions {
    /// How merge fixes are handled.
    pub mode: BlameMode,
    /// Reaction to disagreeing parents in unanimous mode.
    pub on_conflict: ConflictPolicy,
}

/// Per-entry vote accumulator.
///
/// # Examples
///
/// ```
/// use vcchunt_gitpulse::VoteTally;
///
/// let mut tally = VoteTally::default();
/// tally.record("a");
/// tally.record("b");
/// tally.record("a");
/// assert_eq!(tally.candidates(), vec!["a".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    votes: BTreeMap<String, u32>,
}

impl VoteTally {
    /// Add one vote for `commit`.
    pub fn record(&mut self, commit: &str) {
        *self.votes.entry(commit.to_string()).or_default() += 1;
    }

    /// Votes of `commit`.
    pub fn get(&self, commit: &str) -> u32 {
        self.votes.get(commit).copied().unwrap_or(0)
    }

    /// Whether no vote was cast.
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Every commit tied for the highest count, in id order.
    pub fn candidates(&self) -> Vec<String> {
        let Some(max) = self.votes.values().copied().max() else {
            return Vec::new();
        };
        self.votes
            .iter()
            .filter(|(_, count)| **count == max)
            .map(|(commit, _)| commit.clone())
            .collect()
    }

    /// Consume the tally.
    pub fn into_votes(self) -> BTreeMap<String, u32> {
        self.votes
    }
}

/// Parents of a merge fix attributing one line to different commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlameConflict {
    /// Blamed file.
    pub path: String,
    /// 1-based line in the first parent.
    pub line: u32,
    /// `(parent, attributed commit)` for every parent.
    pub attributions: Vec<(String, String)>,
}

impl From<BlameConflict> for VccError {
    fn from(conflict: BlameConflict) -> Self {
        VccError::BlameConflict {
            path: conflict.path,
            line: conflict.line,
        }
    }
}

/// Origin of a line as seen from every parent of the fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// All parents agree on this commit.
    Resolved(String),
    /// Parents disagree.
    Conflict(BlameConflict),
}

/// Result of [`vcc_heuristic`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VccOutcome {
    /// Commits tied for the most votes; empty when nothing could be blamed.
    pub candidates: Vec<String>,
    /// Votes per blamed commit.
    pub votes: BTreeMap<String, u32>,
    /// Lines skipped because parents disagreed.
    pub conflicts: Vec<BlameConflict>,
}

/// Pre-image line numbers of `hunk` that should be blamed.
///
/// # Examples
///
/// ```
/// use vcchunt_difflens::parse_patch;
/// use vcchunt_gitpulse::blame::blamed_lines;
///
/// let diff = "--- a/f.c\n+++ b/f.c\n@@ -4,1 +4,2 @@\n if (p)\n+    check(p);\n";
/// let files = parse_patch(diff).unwrap();
/// let lines = blamed_lines(&files[0].hunks[0]);
/// assert_eq!(lines.into_iter().collect::<Vec<_>>(), vec![4]);
/// ```
pub fn blamed_lines(hunk: &Hunk) -> BTreeSet<u32> {
    let mut blamed = BTreeSet::new();
    let mut prev: Option<&Line> = None;

    for line in &hunk.lines {
        if is_significant(&line.value) {
            let target = match line.role {
                LineRole::Removed => line.source_line_no,
                LineRole::Added => prev.filter(|p| p.is_context()).and_then(|p| p.source_line_no),
                LineRole::Context => prev
                    .filter(|p| p.is_added())
                    .and(line.source_line_no),
            };
            blamed.extend(target);
        }
        prev = Some(line);
    }

    blamed
}

/// Require the `i`-th patch to describe the `i`-th configured file on both sides.
///
/// # Errors
///
/// Returns [`VccError::FileMismatch`] on the first disagreement, including a
/// missing or extra patch.
pub fn check_paths(patches: &[FilePatch], files: &[String]) -> Result<(), VccError> {
    for idx in 0..patches.len().max(files.len()) {
        let expected = files.get(idx).map_or("<none>", String::as_str);
        let (source_path, target_path) = patches
            .get(idx)
            .map_or(("<missing>", "<missing>"), |p| {
                (p.source_file.as_str(), p.target_file.as_str())
            });
        if source_path != format!("a/{expected}") || target_path != format!("b/{expected}") {
            return Err(VccError::FileMismatch {
                expected: expected.to_string(),
                source_path: source_path.to_string(),
                target_path: target_path.to_string(),
            });
        }
    }
    Ok(())
}

/// Blame one line and require exactly one attribution.
///
/// # Errors
///
/// Returns [`VccError::BlameAmbiguous`] when the blame does not yield exactly
/// one commit, or the repository error.
pub fn blame_single_line<H: History + ?Sized>(
    history: &H,
    commit: &str,
    path: &str,
    line: u32,
) -> Result<String, VccError> {
    let mut hits = history.blame(commit, path, line..=line)?;
    if hits.len() != 1 {
        return Err(VccError::BlameAmbiguous {
            commit: commit.to_string(),
            path: path.to_string(),
            line,
            hits: hits.len(),
        });
    }
    Ok(hits.remove(0).commit)
}

/// Blame `path:line` in every parent and report whether they agree.
///
/// # Errors
///
/// Returns [`VccError::Precondition`] for an empty parent list and
/// propagates blame failures.
pub fn attribute_line<H: History + ?Sized>(
    history: &H,
    parents: &[String],
    path: &str,
    line: u32,
) -> Result<Attribution, VccError> {
    if parents.is_empty() {
        return Err(VccError::Precondition("invalid empty parent commits list".into()));
    }
    let mut attributions = Vec::with_capacity(parents.len());
    for parent in parents {
        let origin = blame_single_line(history, parent, path, line)?;
        attributions.push((parent.clone(), origin));
    }

    let first = &attributions[0].1;
    if attributions.iter().all(|(_, origin)| origin == first) {
        Ok(Attribution::Resolved(first.clone()))
    } else {
        Ok(Attribution::Conflict(BlameConflict {
            path: path.to_string(),
            line,
            attributions,
        }))
    }
}

fn patches_for<H: History + ?Sized>(
    history: &H,
    parent: &str,
    fix: &str,
    files: &[String],
) -> Result<Vec<FilePatch>, VccError> {
    let text = history.diff(Some(parent), fix, Some(files))?;
    let patches = parse_patch(&text)?;
    check_paths(&patches, files)?;
    Ok(patches)
}

/// Nominate the commits most likely to have introduced what `fix` repairs.
///
/// Only `files` are examined; they must appear in the diff in the given
/// order, unrenamed. Ties are kept, so the result is a candidate set.
///
/// # Errors
///
/// - [`VccError::Precondition`] if the fix has no parent.
/// - [`VccError::FileMismatch`] if a patch path differs from `files`.
/// - [`VccError::BlameAmbiguous`] if a single-line blame is not unique.
/// - [`VccError::BlameConflict`] in unanimous mode with
///   [`ConflictPolicy::Abort`] when parents disagree.
///
/// # Examples
///
/// ```
/// use vcchunt_gitpulse::{vcc_heuristic, BlameOptions, MemoryHistory};
///
/// let diff = "diff --git a/a.c b/a.c\n--- a/a.c\n+++ b/a.c\n@@ -10 +10 @@\n-x = 1;\n+x = 2;\n";
/// let repo = MemoryHistory::new()
///     .commit("p", &[], "a@x.org", 1)
///     .commit("fix", &["p"], "b@x.org", 2)
///     .diff_text(Some("p"), "fix", diff)
///     .blame("p", "a.c", 10, &["origin"]);
/// let outcome = vcc_heuristic(&repo, "fix", &["a.c".to_string()], &BlameOptions::default()).unwrap();
/// assert_eq!(outcome.candidates, vec!["origin".to_string()]);
/// ```
pub fn vcc_heuristic<H: History + ?Sized>(
    history: &H,
    fix: &str,
    files: &[String],
    opts: &BlameOptions,
) -> Result<VccOutcome, VccError> {
    let commit = history.resolve_commit(fix)?;
    if commit.is_root() {
        return Err(VccError::Precondition(format!(
            "fix commit {} has no parent to blame",
            commit.id
        )));
    }

    let mut tally = VoteTally::default();
    let mut conflicts = Vec::new();

    match opts.mode {
        BlameMode::Independent => {
            for parent in &commit.parents {
                let patches = patches_for(history, parent, &commit.id, files)?;
                for (patch, file) in patches.iter().zip(files) {
                    for hunk in &patch.hunks {
                        for line in blamed_lines(hunk) {
                            let origin = blame_single_line(history, parent, file, line)?;
                            debug!(%parent, file = %file, line, %origin, "blamed line");
                            tally.record(&origin);
                        }
                    }
                }
            }
        }
        BlameMode::Unanimous => {
            let patches = patches_for(history, &commit.parents[0], &commit.id, files)?;
            for (patch, file) in patches.iter().zip(files) {
                for hunk in &patch.hunks {
                    for line in blamed_lines(hunk) {
                        match attribute_line(history, &commit.parents, file, line)? {
                            Attribution::Resolved(origin) => {
                                debug!(file = %file, line, %origin, "blamed line");
                                tally.record(&origin);
                            }
                            Attribution::Conflict(conflict) => match opts.on_conflict {
                                ConflictPolicy::Abort => return Err(conflict.into()),
                                ConflictPolicy::Skip => {
                                    warn!(file = %file, line, "parents disagree, line skipped");
                                    conflicts.push(conflict);
                                }
                            },
                        }
                    }
                }
            }
        }
    }

    let candidates = tally.candidates();
    let votes = tally.into_votes();
    info!(
        fix = %commit.id,
        blamed_commits = votes.len(),
        candidates = candidates.len(),
        conflicts = conflicts.len(),
        "vcc heuristic finished"
    );

    Ok(VccOutcome {
        candidates,
        votes,
        conflicts,
    })
}
