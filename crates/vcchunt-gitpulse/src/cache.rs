//! Local copies of the analyzed repositories.
//!
//! A repository `owner/name` lives under `<repo_dir>/<owner>/<name>` and is
//! cloned from `<remote_base>/<owner>/<name>.git` the first time it is needed.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};
use vcchunt_core::VccError;

use crate::repo::GitHistory;

/// Directory of local clones.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use vcchunt_gitpulse::LocalCopies;
///
/// let copies = LocalCopies::new(".repo", "https://github.com", false);
/// let path = copies.path_for("curl/curl").unwrap();
/// assert_eq!(path, Path::new(".repo/curl/curl"));
/// assert_eq!(copies.remote_url("curl/curl"), "https://github.com/curl/curl.git");
/// ```
#[derive(Debug, Clone)]
pub struct LocalCopies {
    repo_dir: PathBuf,
    remote_base: String,
    force_reset: bool,
}

impl LocalCopies {
    /// Cache rooted at `repo_dir`, cloning from `<remote_base>/<owner>/<name>.git`.
    pub fn new(repo_dir: impl Into<PathBuf>, remote_base: impl Into<String>, force_reset: bool) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote_base: remote_base.into(),
            force_reset,
        }
    }

    /// Where the clone of `repo` lives.
    ///
    /// # Errors
    ///
    /// Returns [`VccError::Config`] unless `repo` has the form `owner/name`.
    pub fn path_for(&self, repo: &str) -> Result<PathBuf, VccError> {
        match repo.split_once('/') {
            Some((owner, name))
                if !owner.is_empty()
                    && !name.is_empty()
                    && !name.contains('/')
                    && owner != ".."
                    && name != ".." =>
            {
                Ok(self.repo_dir.join(owner).join(name))
            }
            _ => Err(VccError::Config(format!(
                "repository must look like owner/name, got {repo:?}"
            ))),
        }
    }

    /// Clone URL of `repo`.
    pub fn remote_url(&self, repo: &str) -> String {
        format!("{}/{repo}.git", self.remote_base.trim_end_matches('/'))
    }

    /// Make sure a usable clone of `repo` exists and return its path.
    ///
    /// An existing directory that is not a readable repository is deleted and
    /// cloned again when `force_reset` is set.
    ///
    /// # Errors
    ///
    /// Returns [`VccError::RepoAccess`] when the clone is unusable and cannot
    /// be (re)created.
    pub fn prepare(&self, repo: &str) -> Result<PathBuf, VccError> {
        let path = self.path_for(repo)?;

        if path.exists() {
            match git2::Repository::open(&path) {
                Ok(_) => {
                    debug!(repo, path = %path.display(), "using existing clone");
                    return Ok(path);
                }
                Err(e) if self.force_reset => {
                    warn!(repo, reason = e.message(), "local copy unusable, cloning again");
                    std::fs::remove_dir_all(&path)?;
                }
                Err(e) => {
                    return Err(VccError::RepoAccess {
                        repo: repo.to_string(),
                        reason: e.message().to_string(),
                    })
                }
            }
        }

        self.clone_into(repo, &path)?;
        Ok(path)
    }

    /// Prepare `repo` and open it.
    pub fn open(&self, repo: &str) -> Result<GitHistory, VccError> {
        GitHistory::open(&self.prepare(repo)?)
    }

    fn clone_into(&self, repo: &str, path: &Path) -> Result<(), VccError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let url = self.remote_url(repo);
        info!(repo, %url, "cloning");

        let output = Command::new("git")
            .arg("clone")
            .arg("--quiet")
            .arg(&url)
            .arg(path)
            .output()
            .map_err(|e| VccError::RepoAccess {
                repo: repo.to_string(),
                reason: format!("failed to run git clone: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VccError::RepoAccess {
                repo: repo.to_string(),
                reason: format!("git clone {url} failed: {}", stderr.trim()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_repository_names() {
        let copies = LocalCopies::new("/tmp/r", "https://example.org", false);
        for bad in ["curl", "/curl", "curl/", "a/b/c", "../x", "x/.."] {
            assert!(
                matches!(copies.path_for(bad), Err(VccError::Config(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn remote_url_ignores_trailing_slash() {
        let copies = LocalCopies::new("r", "https://example.org/", false);
        assert_eq!(copies.remote_url("o/n"), "https://example.org/o/n.git");
    }

    #[test]
    fn existing_clone_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner").join("name");
        git2::Repository::init(&path).unwrap();

        let copies = LocalCopies::new(dir.path(), "file:///nonexistent", false);
        assert_eq!(copies.prepare("owner/name").unwrap(), path);
    }

    #[test]
    fn broken_clone_without_reset_is_an_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner").join("name");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("junk"), "not a repository").unwrap();

        let copies = LocalCopies::new(dir.path(), "file:///nonexistent", false);
        let err = copies.prepare("owner/name").unwrap_err();
        assert!(matches!(err, VccError::RepoAccess { .. }));
        assert!(path.join("junk").exists());
    }

    #[test]
    fn broken_clone_with_reset_is_removed_before_cloning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner").join("name");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("junk"), "not a repository").unwrap();

        let missing = dir.path().join("no-such-remote");
        let copies = LocalCopies::new(dir.path(), missing.display().to_string(), true);
        // the clone itself fails, but the junk directory is gone
        assert!(copies.prepare("owner/name").is_err());
        assert!(!path.join("junk").exists());
    }
}
