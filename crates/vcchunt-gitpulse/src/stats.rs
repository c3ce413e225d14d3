//! Footprint and history statistics of a single commit.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};
use vcchunt_core::{
    Affected, DeveloperStats, FileStats, Interval, Modification, ShortHistoryPolicy, StatisticsReport,
    VccError,
};
use vcchunt_difflens::{is_significant, parse_patch, FilePatch, NULL_PATH};

use crate::repo::History;

/// Knobs of [`commit_stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatOptions {
    /// Reaction to an affected file with fewer than two commits of history.
    pub short_history: ShortHistoryPolicy,
}

fn strip_side<'a>(raw: &'a str, prefix: &str) -> Result<Option<&'a str>, VccError> {
    if raw == NULL_PATH {
        return Ok(None);
    }
    raw.strip_prefix(prefix)
        .map(Some)
        .ok_or_else(|| VccError::Parse(format!("invalid git diff patch: {raw}")))
}

fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir,
        _ => ".",
    }
}

fn modification(patches: &[FilePatch]) -> Modification {
    let mut m = Modification::default();
    for line in patches.iter().flat_map(FilePatch::lines) {
        let significant = is_significant(&line.value);
        if line.is_added() {
            m.total.added += 1;
            if significant {
                m.no_comment_blank.added += 1;
            }
        } else if line.is_removed() {
            m.total.deleted += 1;
            if significant {
                m.no_comment_blank.deleted += 1;
            }
        }
    }
    m
}

fn affected_files(patches: &[FilePatch]) -> Result<BTreeSet<String>, VccError> {
    let mut files = BTreeSet::new();
    for patch in patches {
        if let Some(source) = strip_side(&patch.source_file, "a/")? {
            files.insert(source.to_string());
        }
        if let Some(target) = strip_side(&patch.target_file, "b/")? {
            files.insert(target.to_string());
        }
    }
    Ok(files)
}

/// Describe `commit`: its patch size, the files and directories it touches,
/// and how those files evolved up to `upto`.
///
/// The patch is taken against the first parent (the empty tree for a root
/// commit) with rename detection. Per-file history follows every parent from
/// `upto`; author commit counts follow first parents only.
///
/// # Errors
///
/// - [`VccError::Parse`] if a patch path lacks its `a/` or `b/` prefix.
/// - [`VccError::Precondition`] if the commit touches no file, an affected
///   file has fewer than two commits of history under
///   [`ShortHistoryPolicy::Error`], or no author could be counted.
///
/// # Examples
///
/// ```
/// use vcchunt_gitpulse::{commit_stats, MemoryHistory, StatOptions};
///
/// let diff = "diff --git a/src/a.c b/src/a.c\n--- a/src/a.c\n+++ b/src/a.c\n@@ -1 +1,2 @@\n x;\n+// note\n";
/// let repo = MemoryHistory::new()
///     .commit("c0", &[], "old@x.org", 0)
///     .commit("c1", &["c0"], "dev@x.org", 3_600)
///     .diff_text(Some("c0"), "c1", diff)
///     .history("src/a.c", &["c1", "c0"])
///     .commit_total("dev@x.org", 1)
///     .commit_total("old@x.org", 1);
/// let report = commit_stats(&repo, "c1", "c1", &StatOptions::default()).unwrap();
/// assert_eq!(report.modification.total.added, 1);
/// assert_eq!(report.modification.no_comment_blank.added, 0);
/// assert_eq!(report.affected.files.average_interval.seconds, 3_600);
/// ```
pub fn commit_stats<H: History + ?Sized>(
    history: &H,
    commit: &str,
    upto: &str,
    opts: &StatOptions,
) -> Result<StatisticsReport, VccError> {
    let meta = history.resolve_commit(commit)?;
    let text = history.diff(meta.parents.first().map(String::as_str), &meta.id, None)?;
    let patches = parse_patch(&text)?;

    let modification = modification(&patches);
    let files = affected_files(&patches)?;
    if files.is_empty() {
        return Err(VccError::Precondition(format!(
            "commit {} does not affect any file",
            meta.id
        )));
    }
    let dirs: BTreeSet<&str> = files.iter().map(|f| parent_dir(f)).collect();

    let mut interval_total = 0i64;
    let mut interval_files = 0i64;
    let mut times_total = 0usize;
    // (name, email) -> email, one entry per distinct developer
    let mut developers: BTreeMap<(String, String), String> = BTreeMap::new();

    for file in &files {
        let file_history = history.commit_history(upto, file, false)?;
        debug!(file = %file, commits = file_history.len(), "file history");
        times_total += file_history.len();
        for c in &file_history {
            developers
                .entry((c.author_name.clone(), c.author_email.clone()))
                .or_insert_with(|| c.author_email.clone());
        }

        match file_history.as_slice() {
            [newest, previous, ..] => {
                interval_total += newest.timestamp - previous.timestamp;
                interval_files += 1;
            }
            _ => match opts.short_history {
                ShortHistoryPolicy::Error => {
                    return Err(VccError::Precondition(format!(
                        "{file} has {} commit(s) of history up to {upto}, need at least 2",
                        file_history.len()
                    )))
                }
                ShortHistoryPolicy::Skip => {
                    warn!(file = %file, "history too short, left out of the average interval");
                }
            },
        }
    }

    let mut counts = Vec::with_capacity(developers.len());
    for email in developers.values() {
        counts.push(history.commit_count(upto, email, true)?);
    }
    let max_commits = counts.iter().copied().max().unwrap_or(0);
    let min_commits = counts.iter().copied().min().unwrap_or(0);
    if max_commits == 0 {
        return Err(VccError::Precondition("invalid developers list".into()));
    }

    let file_total = files.len();
    let average_interval = if interval_files == 0 {
        Interval::from_seconds(0)
    } else {
        Interval::from_seconds(interval_total / interval_files)
    };

    Ok(StatisticsReport {
        commit: meta.id,
        author: meta.author_email,
        message: meta.message,
        parents: meta.parents,
        modification,
        affected: Affected {
            dirs: dirs.len(),
            files: FileStats {
                total: file_total,
                average_interval,
                average_times: times_total as f64 / file_total as f64,
                developers: DeveloperStats {
                    total: developers.len(),
                    average: developers.len() as f64 / file_total as f64,
                    max_commits,
                    min_commits,
                },
            },
        },
    })
}
