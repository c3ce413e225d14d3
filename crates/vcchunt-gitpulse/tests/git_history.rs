use std::path::Path;

use git2::{Oid, Repository, Signature, Time};
use vcchunt_core::VccError;
use vcchunt_gitpulse::{
    commit_stats, vcc_heuristic, BlameOptions, GitHistory, History, StatOptions,
};

struct Fixture {
    _dir: tempfile::TempDir,
    repo: Repository,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { _dir: dir, repo }
    }

    fn workdir(&self) -> &Path {
        self.repo.workdir().unwrap()
    }

    fn commit(&self, files: &[(&str, &str)], who: &str, time: i64, parents: &[Oid]) -> Oid {
        let mut index = self.repo.index().unwrap();
        for (path, content) in files {
            let full = self.workdir().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::new(who, &format!("{who}@example.com"), &Time::new(time, 0)).unwrap();
        let parents: Vec<_> = parents.iter().map(|p| self.repo.find_commit(*p).unwrap()).collect();
        let parent_refs: Vec<_> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &format!("change by {who}"), &tree, &parent_refs)
            .unwrap()
    }

    fn history(&self) -> GitHistory {
        GitHistory::open(self.workdir()).unwrap()
    }
}

fn numbered(last: &str) -> String {
    let mut text: String = (1..10).map(|i| format!("step_{i}();\n")).collect();
    text.push_str(last);
    text.push('\n');
    text
}

struct Scenario {
    fixture: Fixture,
    intro: Oid,
    bug: Oid,
    fix: Oid,
}

fn scenario() -> Scenario {
    let fixture = Fixture::new();
    let intro = fixture.commit(&[("src/buf.c", numbered("done();").as_str())], "alice", 1_000, &[]);
    let bug = fixture.commit(&[("src/buf.c", numbered("len = n;").as_str())], "bob", 2_000, &[intro]);
    let fix = fixture.commit(
        &[("src/buf.c", numbered("len = min(n, cap);").as_str())],
        "carol",
        5_000,
        &[bug],
    );
    Scenario {
        fixture,
        intro,
        bug,
        fix,
    }
}

#[test]
fn resolves_commit_metadata() {
    let s = scenario();
    let meta = s.fixture.history().resolve_commit(&s.fix.to_string()).unwrap();
    assert_eq!(meta.id, s.fix.to_string());
    assert_eq!(meta.author_email, "carol@example.com");
    assert_eq!(meta.parents, vec![s.bug.to_string()]);
    assert_eq!(meta.timestamp, 5_000);

    let head = s.fixture.history().resolve_commit("HEAD~2").unwrap();
    assert_eq!(head.id, s.intro.to_string());
    assert!(head.is_root());
}

#[test]
fn unknown_revision_is_a_git_error() {
    let s = scenario();
    let result = s.fixture.history().resolve_commit("deadbeef");
    assert!(matches!(result, Err(VccError::Git(_))));
}

#[test]
fn diff_is_limited_to_requested_paths() {
    let s = scenario();
    let history = s.fixture.history();
    let text = history
        .diff(
            Some(&s.bug.to_string()),
            &s.fix.to_string(),
            Some(&["src/buf.c".to_string()]),
        )
        .unwrap();
    assert!(text.contains("--- a/src/buf.c"));
    assert!(text.contains("-len = n;"));
    assert!(text.contains("+len = min(n, cap);"));

    let none = history
        .diff(
            Some(&s.bug.to_string()),
            &s.fix.to_string(),
            Some(&["other.c".to_string()]),
        )
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn blame_attributes_line_to_last_change() {
    let s = scenario();
    let history = s.fixture.history();
    let hits = history.blame(&s.bug.to_string(), "src/buf.c", 10..=10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].commit, s.bug.to_string());
    assert_eq!(hits[0].line_text, "len = n;");

    let hits = history.blame(&s.bug.to_string(), "src/buf.c", 3..=3).unwrap();
    assert_eq!(hits[0].commit, s.intro.to_string());
}

#[test]
fn heuristic_finds_the_commit_that_wrote_the_fixed_line() {
    let s = scenario();
    let outcome = vcc_heuristic(
        &s.fixture.history(),
        &s.fix.to_string(),
        &["src/buf.c".to_string()],
        &BlameOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.candidates, vec![s.bug.to_string()]);
    assert_eq!(outcome.votes.get(&s.bug.to_string()), Some(&1));
    assert_eq!(outcome.votes.len(), 1);
}

#[test]
fn heuristic_rejects_files_the_fix_does_not_touch() {
    let s = scenario();
    let result = vcc_heuristic(
        &s.fixture.history(),
        &s.fix.to_string(),
        &["src/other.c".to_string()],
        &BlameOptions::default(),
    );
    assert!(matches!(result, Err(VccError::FileMismatch { .. })));
}

#[test]
fn file_history_is_newest_first() {
    let s = scenario();
    let history = s.fixture.history();
    let ids: Vec<String> = history
        .commit_history(&s.fix.to_string(), "src/buf.c", false)
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![s.fix.to_string(), s.bug.to_string(), s.intro.to_string()]);

    let upto_bug = history
        .commit_history(&s.bug.to_string(), "src/buf.c", false)
        .unwrap();
    assert_eq!(upto_bug.len(), 2);
}

#[test]
fn untouched_file_keeps_short_history() {
    let s = scenario();
    let next = s
        .fixture
        .commit(&[("docs/notes.md", "notes\n")], "dave", 6_000, &[s.fix]);
    let history = s.fixture.history();
    let notes = history
        .commit_history(&next.to_string(), "docs/notes.md", false)
        .unwrap();
    assert_eq!(notes.len(), 1);
    let buf = history
        .commit_history(&next.to_string(), "src/buf.c", false)
        .unwrap();
    assert_eq!(buf.len(), 3);
}

#[test]
fn commit_count_matches_author_email() {
    let s = scenario();
    let history = s.fixture.history();
    let fix = s.fix.to_string();
    assert_eq!(history.commit_count(&fix, "bob@example.com", true).unwrap(), 1);
    assert_eq!(history.commit_count(&fix, "nobody@example.com", true).unwrap(), 0);
}

#[test]
fn stats_of_the_candidate() {
    let s = scenario();
    let report = commit_stats(
        &s.fixture.history(),
        &s.bug.to_string(),
        &s.fix.to_string(),
        &StatOptions::default(),
    )
    .unwrap();

    assert_eq!(report.author, "bob@example.com");
    assert_eq!(report.parents, vec![s.intro.to_string()]);
    assert_eq!(report.modification.total.added, 1);
    assert_eq!(report.modification.total.deleted, 1);
    assert_eq!(report.affected.dirs, 1);
    let files = &report.affected.files;
    assert_eq!(files.total, 1);
    // newest two commits of src/buf.c up to the fix: fix and bug
    assert_eq!(files.average_interval.seconds, 3_000);
    assert!((files.average_times - 3.0).abs() < 1e-9);
    assert_eq!(files.developers.total, 3);
    assert_eq!(files.developers.max_commits, 1);
    assert_eq!(files.developers.min_commits, 1);
}

#[test]
fn stats_of_a_root_commit() {
    let s = scenario();
    let report = commit_stats(
        &s.fixture.history(),
        &s.intro.to_string(),
        &s.fix.to_string(),
        &StatOptions::default(),
    )
    .unwrap();
    assert_eq!(report.modification.total.added, 10);
    assert_eq!(report.modification.total.deleted, 0);
    assert!(report.parents.is_empty());
}

#[test]
fn non_ascii_paths_match_the_configured_file() {
    let fixture = Fixture::new();
    let path = "src/café.c";
    let intro = fixture.commit(&[(path, numbered("done();").as_str())], "alice", 1_000, &[]);
    let bug = fixture.commit(&[(path, numbered("len = n;").as_str())], "bob", 2_000, &[intro]);
    let fix = fixture.commit(&[(path, numbered("len = min(n, cap);").as_str())], "carol", 5_000, &[bug]);
    let history = fixture.history();

    let outcome = vcc_heuristic(
        &history,
        &fix.to_string(),
        &[path.to_string()],
        &BlameOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.candidates, vec![bug.to_string()]);

    let report = commit_stats(&history, &bug.to_string(), &fix.to_string(), &StatOptions::default()).unwrap();
    assert_eq!(report.affected.files.total, 1);
    assert_eq!(report.affected.files.average_interval.seconds, 3_000);
}

#[test]
fn file_history_skips_side_branches_a_merge_discarded() {
    let fixture = Fixture::new();
    let base = fixture.commit(&[("lib/io.c", "v1\n")], "alice", 1_000, &[]);
    let side = fixture.commit(&[("lib/io.c", "v2\n")], "bob", 2_000, &[base]);
    fixture.repo.set_head_detached(base).unwrap();
    let main = fixture.commit(&[("lib/io.c", "v1\n"), ("README", "io\n")], "carol", 3_000, &[base]);
    let merge = fixture.commit(&[("lib/io.c", "v1\n")], "dave", 4_000, &[main, side]);
    let history = fixture.history();

    let ids = |upto: Oid, path: &str| -> Vec<String> {
        history
            .commit_history(&upto.to_string(), path, false)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect()
    };

    assert_eq!(ids(merge, "lib/io.c"), vec![base.to_string()]);
    assert_eq!(ids(side, "lib/io.c"), vec![side.to_string(), base.to_string()]);
    assert_eq!(ids(merge, "README"), vec![main.to_string()]);
}

#[test]
fn file_history_keeps_both_sides_of_a_real_merge() {
    let fixture = Fixture::new();
    let base = fixture.commit(&[("lib/io.c", "v1\n")], "alice", 1_000, &[]);
    let side = fixture.commit(&[("lib/io.c", "v2\n")], "bob", 2_000, &[base]);
    fixture.repo.set_head_detached(base).unwrap();
    let main = fixture.commit(&[("lib/io.c", "v3\n")], "carol", 3_000, &[base]);
    let merge = fixture.commit(&[("lib/io.c", "v4\n")], "dave", 4_000, &[main, side]);

    let ids: Vec<String> = fixture
        .history()
        .commit_history(&merge.to_string(), "lib/io.c", false)
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(
        ids,
        vec![merge.to_string(), main.to_string(), side.to_string(), base.to_string()]
    );
}
