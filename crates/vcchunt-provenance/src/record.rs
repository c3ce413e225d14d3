//! One vulnerability entry in, one provenance record out.

use tracing::{debug, info};
use vcchunt_core::{ProvenanceRecord, RunConfig, VccError, VccFinding, VulnerabilityEntry};
use vcchunt_gitpulse::{commit_stats, vcc_heuristic, BlameOptions, History, StatOptions};

/// Engine options derived from the `[run]` table.
///
/// # Examples
///
/// ```
/// use vcchunt_core::{BlameMode, RunConfig};
/// use vcchunt_provenance::AnalysisOptions;
///
/// let mut run = RunConfig::default();
/// run.blame_mode = BlameMode::Unanimous;
/// let opts = AnalysisOptions::from(&run);
/// assert_eq!(opts.blame.mode, BlameMode::Unanimous);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisOptions {
    /// Blame mode and merge conflict policy for the heuristic.
    pub blame: BlameOptions,
    /// Short-history policy for candidate statistics.
    pub stat: StatOptions,
}

impl From<&RunConfig> for AnalysisOptions {
    fn from(run: &RunConfig) -> Self {
        Self {
            blame: BlameOptions {
                mode: run.blame_mode,
                on_conflict: run.on_conflict,
            },
            stat: StatOptions {
                short_history: run.short_history,
            },
        }
    }
}

/// Run the heuristic on `entry` and describe every candidate it nominates.
///
/// Candidate statistics use the fix revision as history bound. An entry
/// whose fix only touches noise lines yields a record with no findings.
///
/// # Errors
///
/// Any engine error aborts the entry; see [`vcc_heuristic`] and
/// [`commit_stats`].
pub fn analyze_entry<H: History + ?Sized>(
    history: &H,
    entry: &VulnerabilityEntry,
    opts: &AnalysisOptions,
) -> Result<ProvenanceRecord, VccError> {
    let fix = history.resolve_commit(&entry.fix)?;
    let outcome = vcc_heuristic(history, &fix.id, &entry.files, &opts.blame)?;

    let mut vcc = Vec::with_capacity(outcome.candidates.len());
    for candidate in &outcome.candidates {
        let meta = history.resolve_commit(candidate)?;
        debug!(candidate = %meta.id, "collecting statistics");
        let stat = commit_stats(history, &meta.id, &fix.id, &opts.stat)?;
        vcc.push(VccFinding {
            commit: meta.id.clone(),
            votes: outcome.votes.get(candidate).copied().unwrap_or(0),
            interval: fix.since(&meta),
            stat,
        });
    }

    info!(fix = %fix.id, candidates = vcc.len(), "entry analyzed");
    Ok(ProvenanceRecord {
        repo: entry.repo.clone(),
        fix_commit: fix.id,
        fix_author: fix.author_email,
        cve_id: entry.cve_id.clone(),
        vcc,
    })
}
