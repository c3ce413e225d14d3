//! Repository access used by the mining engines.
//!
//! [`History`] lists the five queries the engines need. [`GitHistory`]
//! answers them with git2 against a local clone.

use std::collections::{BinaryHeap, HashSet};
use std::ops::RangeInclusive;
use std::path::Path;

use git2::{DiffFindOptions, DiffFormat, DiffOptions, Oid, Repository, Sort};
use vcchunt_core::{CommitMeta, VccError};

/// One attribution returned by a blame query.
///
/// # Examples
///
/// ```
/// use vcchunt_gitpulse::BlameHit;
///
/// let hit = BlameHit { commit: "abc123".into(), line_text: "x = 1;".into() };
/// assert_eq!(hit.commit, "abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameHit {
    /// Commit that last changed the lines.
    pub commit: String,
    /// Text of the attributed lines.
    pub line_text: String,
}

/// Read-only queries against a version-controlled repository.
///
/// Implementations are not required to be `Sync`; each analyzed entry owns
/// its own handle.
pub trait History {
    /// Resolve a revision (`sha`, `HEAD~2`, tag...) to commit metadata.
    fn resolve_commit(&self, rev: &str) -> Result<CommitMeta, VccError>;

    /// Unified diff text from `from` (or the empty tree) to `to`, limited to
    /// `paths` when given. Paths carry `a/` and `b/` prefixes and the diff
    /// is uncolored with three lines of context.
    fn diff(&self, from: Option<&str>, to: &str, paths: Option<&[String]>)
        -> Result<String, VccError>;

    /// Attribute `lines` (1-based, inclusive) of `path` as of `commit`.
    fn blame(
        &self,
        commit: &str,
        path: &str,
        lines: RangeInclusive<u32>,
    ) -> Result<Vec<BlameHit>, VccError>;

    /// Commits reachable from `upto` that changed `path`, newest first.
    ///
    /// Merges are simplified as `git log -- <path>` does: history follows a
    /// parent the merge kept `path` from, and drops the other sides.
    fn commit_history(
        &self,
        upto: &str,
        path: &str,
        first_parent_only: bool,
    ) -> Result<Vec<CommitMeta>, VccError>;

    /// Number of commits reachable from `upto` authored by `author_email`.
    fn commit_count(
        &self,
        upto: &str,
        author_email: &str,
        first_parent_only: bool,
    ) -> Result<usize, VccError>;
}

fn git_err(context: &'static str) -> impl Fn(git2::Error) -> VccError {
    move |e| VccError::Git(format!("{context}: {}", e.message()))
}

/// [`History`] backed by a git2 repository handle.
pub struct GitHistory {
    repo: Repository,
}

impl GitHistory {
    /// Open the repository at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VccError::RepoAccess`] if `path` is not a readable repository.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use vcchunt_gitpulse::{GitHistory, History};
    ///
    /// let history = GitHistory::open(Path::new(".")).unwrap();
    /// let head = history.resolve_commit("HEAD").unwrap();
    /// println!("{} by {}", head.id, head.author_email);
    /// ```
    pub fn open(path: &Path) -> Result<Self, VccError> {
        let repo = Repository::open(path).map_err(|e| VccError::RepoAccess {
            repo: path.display().to_string(),
            reason: e.message().to_string(),
        })?;
        Ok(Self { repo })
    }

    /// Wrap an already opened repository.
    pub fn from_repository(repo: Repository) -> Self {
        Self { repo }
    }

    fn find_commit(&self, rev: &str) -> Result<git2::Commit<'_>, VccError> {
        self.repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| VccError::Git(format!("cannot resolve {rev}: {}", e.message())))
    }

    fn entry_id(commit: &git2::Commit<'_>, path: &Path) -> Result<Option<Oid>, VccError> {
        let tree = commit.tree().map_err(git_err("failed to get commit tree"))?;
        Ok(tree.get_path(path).ok().map(|entry| entry.id()))
    }

    fn walk_from(&self, upto: &str, first_parent_only: bool) -> Result<git2::Revwalk<'_>, VccError> {
        let start = self.find_commit(upto)?.id();
        let mut revwalk = self.repo.revwalk().map_err(git_err("failed to create revwalk"))?;
        revwalk
            .set_sorting(Sort::TIME)
            .map_err(git_err("failed to sort revwalk"))?;
        revwalk.push(start).map_err(git_err("failed to push oid"))?;
        if first_parent_only {
            revwalk
                .simplify_first_parent()
                .map_err(git_err("failed to simplify revwalk"))?;
        }
        Ok(revwalk)
    }
}

fn meta(commit: &git2::Commit<'_>) -> CommitMeta {
    let author = commit.author();
    CommitMeta {
        id: commit.id().to_string(),
        author_name: author.name().unwrap_or("unknown").to_string(),
        author_email: author.email().unwrap_or("unknown").to_string(),
        message: commit.message().unwrap_or("").to_string(),
        parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        timestamp: commit.time().seconds(),
    }
}

impl History for GitHistory {
    fn resolve_commit(&self, rev: &str) -> Result<CommitMeta, VccError> {
        Ok(meta(&self.find_commit(rev)?))
    }

    fn diff(
        &self,
        from: Option<&str>,
        to: &str,
        paths: Option<&[String]>,
    ) -> Result<String, VccError> {
        let new_tree = self
            .find_commit(to)?
            .tree()
            .map_err(git_err("failed to get commit tree"))?;
        let old_tree = match from {
            Some(rev) => Some(
                self.find_commit(rev)?
                    .tree()
                    .map_err(git_err("failed to get parent tree"))?,
            ),
            None => None,
        };

        let mut diff_opts = DiffOptions::new();
        diff_opts.context_lines(3);
        if let Some(paths) = paths {
            diff_opts.disable_pathspec_match(true);
            for path in paths {
                diff_opts.pathspec(path.as_str());
            }
        }

        let mut diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut diff_opts))
            .map_err(git_err("failed to compute diff"))?;

        if paths.is_none() {
            let mut find_opts = DiffFindOptions::new();
            find_opts.renames(true);
            diff.find_similar(Some(&mut find_opts))
                .map_err(git_err("failed to find renames"))?;
        }

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                text.push(line.origin());
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })
        .map_err(git_err("failed to print diff"))?;

        Ok(text)
    }

    fn blame(
        &self,
        commit: &str,
        path: &str,
        lines: RangeInclusive<u32>,
    ) -> Result<Vec<BlameHit>, VccError> {
        let newest = self.find_commit(commit)?;
        let mut opts = git2::BlameOptions::new();
        opts.newest_commit(newest.id())
            .min_line(*lines.start() as usize)
            .max_line(*lines.end() as usize)
            .ignore_whitespace(true);

        let blame = self
            .repo
            .blame_file(Path::new(path), Some(&mut opts))
            .map_err(|e| {
                VccError::Git(format!("failed to blame {path}:{lines:?} at {commit}: {}", e.message()))
            })?;

        let blob = newest
            .tree()
            .and_then(|tree| tree.get_path(Path::new(path)))
            .and_then(|entry| entry.to_object(&self.repo))
            .and_then(|obj| obj.peel_to_blob())
            .map_err(git_err("failed to read blamed file"))?;
        let content = String::from_utf8_lossy(blob.content());
        let file_lines: Vec<&str> = content.lines().collect();

        let hits = blame
            .iter()
            .map(|hunk| {
                let first = hunk.final_start_line().saturating_sub(1);
                let last = (first + hunk.lines_in_hunk()).min(file_lines.len());
                BlameHit {
                    commit: hunk.final_commit_id().to_string(),
                    line_text: file_lines
                        .get(first.min(last)..last)
                        .map(|l| l.join("\n"))
                        .unwrap_or_default(),
                }
            })
            .collect();
        Ok(hits)
    }

    fn commit_history(
        &self,
        upto: &str,
        path: &str,
        first_parent_only: bool,
    ) -> Result<Vec<CommitMeta>, VccError> {
        let path = Path::new(path);
        let start = self.find_commit(upto)?;
        let mut history = Vec::new();

        // Newest first by commit time. A commit whose entry matches one of
        // its parents did not change the path; like `git log -- <path>`,
        // only that parent is followed, so side branches whose changes the
        // merge discarded are not counted.
        let mut queue = BinaryHeap::from([(start.time().seconds(), start.id())]);
        let mut seen = HashSet::from([start.id()]);

        while let Some((_, oid)) = queue.pop() {
            let commit = self.repo.find_commit(oid).map_err(git_err("failed to find commit"))?;
            let entry = Self::entry_id(&commit, path)?;

            let parent_count = if first_parent_only {
                commit.parent_count().min(1)
            } else {
                commit.parent_count()
            };
            let mut parents = Vec::with_capacity(parent_count);
            for idx in 0..parent_count {
                parents.push(commit.parent(idx).map_err(git_err("failed to get parent"))?);
            }

            let mut same_as = None;
            for (idx, parent) in parents.iter().enumerate() {
                if Self::entry_id(parent, path)? == entry {
                    same_as = Some(idx);
                    break;
                }
            }

            let follow: Vec<&git2::Commit<'_>> = match same_as {
                Some(idx) => vec![&parents[idx]],
                None => {
                    if parent_count > 0 || entry.is_some() {
                        history.push(meta(&commit));
                    }
                    parents.iter().collect()
                }
            };
            for parent in follow {
                if seen.insert(parent.id()) {
                    queue.push((parent.time().seconds(), parent.id()));
                }
            }
        }

        Ok(history)
    }

    fn commit_count(
        &self,
        upto: &str,
        author_email: &str,
        first_parent_only: bool,
    ) -> Result<usize, VccError> {
        let mut count = 0;
        for oid in self.walk_from(upto, first_parent_only)? {
            let oid = oid.map_err(git_err("revwalk error"))?;
            let commit = self.repo.find_commit(oid).map_err(git_err("failed to find commit"))?;
            if commit.author().email() == Some(author_email) {
                count += 1;
            }
        }
        Ok(count)
    }
}
