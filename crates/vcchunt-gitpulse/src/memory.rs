//! Scripted [`History`] for tests and dry runs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::RangeInclusive;

use vcchunt_core::{CommitMeta, VccError};

use crate::repo::{BlameHit, History};

/// In-memory repository whose answers are registered up front.
///
/// Diffs are keyed by `(from, to)` and returned as registered, whatever the
/// path filter. Histories are keyed by path and commit counts by email.
/// Every blame query is recorded and can be inspected with
/// [`MemoryHistory::blame_queries`].
///
/// # Examples
///
/// ```
/// use vcchunt_gitpulse::{History, MemoryHistory};
///
/// let repo = MemoryHistory::new()
///     .commit("p", &[], "old@example.com", 100)
///     .commit("fix", &["p"], "dev@example.com", 200)
///     .blame("p", "a.c", 3, &["origin"]);
/// let hits = repo.blame("p", "a.c", 3..=3).unwrap();
/// assert_eq!(hits[0].commit, "origin");
/// assert_eq!(repo.blame_queries(), vec![("p".to_string(), "a.c".to_string(), 3)]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryHistory {
    commits: HashMap<String, CommitMeta>,
    diffs: HashMap<(Option<String>, String), String>,
    blames: HashMap<(String, String, u32), Vec<String>>,
    histories: HashMap<String, Vec<String>>,
    counts: HashMap<String, usize>,
    queries: RefCell<Vec<(String, String, u32)>>,
}

impl MemoryHistory {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a commit authored by `email` at `timestamp`.
    pub fn commit(mut self, id: &str, parents: &[&str], email: &str, timestamp: i64) -> Self {
        let name = email.split('@').next().unwrap_or(email).to_string();
        self.commits.insert(
            id.to_string(),
            CommitMeta {
                id: id.to_string(),
                author_name: name,
                author_email: email.to_string(),
                message: format!("commit {id}\n"),
                parents: parents.iter().map(|p| p.to_string()).collect(),
                timestamp,
            },
        );
        self
    }

    /// Register the diff text from `from` (or the empty tree) to `to`.
    pub fn diff_text(mut self, from: Option<&str>, to: &str, text: &str) -> Self {
        self.diffs
            .insert((from.map(str::to_string), to.to_string()), text.to_string());
        self
    }

    /// Register the attribution(s) of `path:line` as of `commit`.
    pub fn blame(mut self, commit: &str, path: &str, line: u32, origins: &[&str]) -> Self {
        self.blames.insert(
            (commit.to_string(), path.to_string(), line),
            origins.iter().map(|o| o.to_string()).collect(),
        );
        self
    }

    /// Register the history of `path`, newest first.
    pub fn history(mut self, path: &str, ids: &[&str]) -> Self {
        self.histories
            .insert(path.to_string(), ids.iter().map(|i| i.to_string()).collect());
        self
    }

    /// Register how many commits `email` authored.
    pub fn commit_total(mut self, email: &str, count: usize) -> Self {
        self.counts.insert(email.to_string(), count);
        self
    }

    /// `(commit, path, line)` of every single-line blame issued so far.
    pub fn blame_queries(&self) -> Vec<(String, String, u32)> {
        self.queries.borrow().clone()
    }

    fn lookup(&self, id: &str) -> Result<CommitMeta, VccError> {
        self.commits
            .get(id)
            .cloned()
            .ok_or_else(|| VccError::Git(format!("cannot resolve {id}")))
    }
}

impl History for MemoryHistory {
    fn resolve_commit(&self, rev: &str) -> Result<CommitMeta, VccError> {
        self.lookup(rev)
    }

    fn diff(
        &self,
        from: Option<&str>,
        to: &str,
        _paths: Option<&[String]>,
    ) -> Result<String, VccError> {
        self.diffs
            .get(&(from.map(str::to_string), to.to_string()))
            .cloned()
            .ok_or_else(|| VccError::Git(format!("no diff registered for {from:?}..{to}")))
    }

    fn blame(
        &self,
        commit: &str,
        path: &str,
        lines: RangeInclusive<u32>,
    ) -> Result<Vec<BlameHit>, VccError> {
        let mut hits = Vec::new();
        for line in lines {
            self.queries
                .borrow_mut()
                .push((commit.to_string(), path.to_string(), line));
            let origins = self
                .blames
                .get(&(commit.to_string(), path.to_string(), line))
                .ok_or_else(|| VccError::Git(format!("no blame registered for {path}:{line}")))?;
            hits.extend(origins.iter().map(|origin| BlameHit {
                commit: origin.clone(),
                line_text: String::new(),
            }));
        }
        Ok(hits)
    }

    fn commit_history(
        &self,
        _upto: &str,
        path: &str,
        _first_parent_only: bool,
    ) -> Result<Vec<CommitMeta>, VccError> {
        self.histories
            .get(path)
            .map(|ids| ids.iter().map(|id| self.lookup(id)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn commit_count(
        &self,
        _upto: &str,
        author_email: &str,
        _first_parent_only: bool,
    ) -> Result<usize, VccError> {
        Ok(self.counts.get(author_email).copied().unwrap_or(0))
    }
}
