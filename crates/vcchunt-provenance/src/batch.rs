//! Batch orchestration over a worker pool.
//!
//! Distinct repositories are prepared once, sequentially, before any entry
//! runs. Entries are then analyzed in parallel, each with its own repository
//! handle, and collected back in configuration order.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{error, info, info_span, warn};
use vcchunt_core::{
    BatchReport, EntryFailure, ProvenanceRecord, VccConfig, VccError, VulnerabilityEntry,
};
use vcchunt_gitpulse::{GitHistory, LocalCopies};

use crate::record::{analyze_entry, AnalysisOptions};

/// Why a repository could not be prepared, shared by all its entries.
#[derive(Debug, Clone)]
struct PrepareFailure {
    kind: &'static str,
    message: String,
}

fn prepare_all(
    copies: &LocalCopies,
    entries: &[VulnerabilityEntry],
) -> BTreeMap<String, Result<PathBuf, PrepareFailure>> {
    let mut prepared = BTreeMap::new();
    for entry in entries {
        if prepared.contains_key(&entry.repo) {
            continue;
        }
        let result = copies.prepare(&entry.repo).map_err(|e| {
            warn!(repo = %entry.repo, error = %e, "repository unavailable");
            PrepareFailure {
                kind: e.kind(),
                message: e.to_string(),
            }
        });
        prepared.insert(entry.repo.clone(), result);
    }
    prepared
}

fn failure(index: usize, entry: &VulnerabilityEntry, kind: &str, message: String) -> EntryFailure {
    EntryFailure {
        index,
        cve_id: entry.cve_id.clone(),
        repo: entry.repo.clone(),
        fix: entry.fix.clone(),
        kind: kind.to_string(),
        message,
    }
}

/// Analyze every entry of `config`.
///
/// `on_entry_done` is called from the worker threads once per entry, in
/// completion order, with whether the entry succeeded. The report itself is
/// in configuration order.
///
/// # Errors
///
/// Returns [`VccError::Config`] if the worker pool cannot be started. Entry
/// failures are reported in [`BatchReport::failures`], never as `Err`.
pub fn run_batch<F>(config: &VccConfig, on_entry_done: F) -> Result<BatchReport, VccError>
where
    F: Fn(&VulnerabilityEntry, bool) + Sync,
{
    let run = &config.run;
    let copies = LocalCopies::new(&run.repo_dir, &run.remote_base, run.force_reset);
    let opts = AnalysisOptions::from(run);

    std::fs::create_dir_all(&run.repo_dir)?;
    let prepared = prepare_all(&copies, &config.entries);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(run.workers)
        .thread_name(|i| format!("vcchunt-worker-{i}"))
        .build()
        .map_err(|e| VccError::Config(format!("failed to start worker pool: {e}")))?;

    info!(
        entries = config.entries.len(),
        repos = prepared.len(),
        workers = pool.current_num_threads(),
        "starting batch"
    );

    let results: Vec<Result<ProvenanceRecord, EntryFailure>> = pool.install(|| {
        config
            .entries
            .par_iter()
            .enumerate()
            .map(|(index, entry)| {
                let span = info_span!("entry", index, cve_id = %entry.cve_id, repo = %entry.repo);
                let _guard = span.enter();
                info!(fix = %entry.fix, files = entry.files.len(), "analyzing entry");

                let result = match prepared.get(&entry.repo) {
                    Some(Ok(path)) => GitHistory::open(path)
                        .and_then(|history| analyze_entry(&history, entry, &opts))
                        .map_err(|e| failure(index, entry, e.kind(), e.to_string())),
                    Some(Err(prep)) => Err(failure(index, entry, prep.kind, prep.message.clone())),
                    None => Err(failure(
                        index,
                        entry,
                        "repo-access",
                        "repository was not prepared".into(),
                    )),
                };

                if let Err(f) = &result {
                    error!(kind = %f.kind, "{}", f.message);
                }
                on_entry_done(entry, result.is_ok());
                result
            })
            .collect()
    });

    let mut report = BatchReport::default();
    for result in results {
        match result {
            Ok(record) => report.records.push(record),
            Err(failure) => report.failures.push(failure),
        }
    }

    info!(
        succeeded = report.records.len(),
        failed = report.failures.len(),
        "batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vcchunt_core::RunConfig;

    fn entry(cve: &str, repo: &str) -> VulnerabilityEntry {
        VulnerabilityEntry {
            cve_id: cve.into(),
            repo: repo.into(),
            fix: "HEAD".into(),
            files: vec!["a.c".into()],
        }
    }

    #[test]
    fn unreachable_repositories_fail_only_their_entries() {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("nowhere");
        let config = VccConfig {
            run: RunConfig {
                repo_dir: dir.path().join("cache"),
                remote_base: remote.display().to_string(),
                workers: 2,
                ..RunConfig::default()
            },
            entries: vec![
                entry("CVE-1", "acme/one"),
                entry("CVE-2", "acme/two"),
                entry("CVE-3", "acme/one"),
            ],
        };

        let done = AtomicUsize::new(0);
        let report = run_batch(&config, |_, ok| {
            assert!(!ok);
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(report.records.is_empty());
        let order: Vec<_> = report.failures.iter().map(|f| (f.index, f.cve_id.as_str())).collect();
        assert_eq!(order, vec![(0, "CVE-1"), (1, "CVE-2"), (2, "CVE-3")]);
        assert!(report.failures.iter().all(|f| f.kind == "repo-access"));
    }

    #[test]
    fn empty_batch_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let config = VccConfig {
            run: RunConfig {
                repo_dir: dir.path().to_path_buf(),
                ..RunConfig::default()
            },
            entries: Vec::new(),
        };
        let report = run_batch(&config, |_, _| {}).unwrap();
        assert!(report.is_clean());
        assert!(report.records.is_empty());
    }
}
