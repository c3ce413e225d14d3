use std::fmt::Write as _;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use vcchunt_core::{
    BlameMode, ConflictPolicy, OutputFormat, ShortHistoryPolicy, StatisticsReport, VccConfig,
};
use vcchunt_gitpulse::{
    commit_stats, vcc_heuristic, BlameOptions, GitHistory, StatOptions, VccOutcome,
};

const DEFAULT_CONFIG_PATH: &str = "vcchunt.toml";

#[derive(Parser)]
#[command(
    name = "vcchunt",
    version,
    about = "Find the commits that introduced a vulnerability, starting from its fix",
    long_about = "vcchunt blames the lines a vulnerability fix removes or touches and nominates\n\
                   the commits most likely to have introduced the flaw (vulnerability-contributing\n\
                   commits), then describes each of them with churn and developer statistics.\n\n\
                   Examples:\n  \
                     vcchunt init                                  Write a starter vcchunt.toml\n  \
                     vcchunt run --format json -o report.json      Analyze every configured entry\n  \
                     vcchunt vcc --fix 1a2b3c lib/buffer.c         Blame one fix in the current repo\n  \
                     vcchunt stat --commit 4d5e6f --upto 1a2b3c    Statistics for one commit\n  \
                     vcchunt classify '// note' 'x = 1;'           Show how lines are classified"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: vcchunt.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    /// Enable debug logging (overridden by VCCHUNT_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze every vulnerability entry of the configuration
    #[command(long_about = "Analyze every vulnerability entry of the configuration.\n\n\
        Clones or reuses each repository under the cache directory, runs the blame\n\
        heuristic on every fix and collects statistics for each candidate. Entries\n\
        run in parallel; a failing entry is reported without stopping the others,\n\
        and the exit code is non-zero if any entry failed.\n\n\
        Examples:\n  vcchunt run\n  vcchunt run --jobs 8 --format markdown -o report.md")]
    Run {
        /// Directory holding local clones (overrides run.repo_dir)
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Worker threads, 0 for one per CPU (overrides run.workers)
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Discard and re-clone unusable local copies
        #[arg(long)]
        force_reset: bool,

        /// How merge fixes are blamed (independent or unanimous)
        #[arg(long)]
        blame_mode: Option<BlameMode>,

        /// What to do when merge parents disagree in unanimous mode (abort or skip)
        #[arg(long)]
        on_conflict: Option<ConflictPolicy>,

        /// What to do with files that have fewer than two commits (error or skip)
        #[arg(long)]
        short_history: Option<ShortHistoryPolicy>,
    },
    /// Run the blame heuristic on one fix in a local repository
    #[command(long_about = "Run the blame heuristic on one fix in a local repository.\n\n\
        FILES must be listed in the order the fix diff shows them.\n\n\
        Examples:\n  vcchunt vcc --fix HEAD src/parser.c\n  vcchunt vcc --path ../curl --fix 1a2b3c lib/http.c lib/http.h")]
    Vcc {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Fix revision
        #[arg(long)]
        fix: String,

        /// Files changed by the fix
        #[arg(required = true)]
        files: Vec<String>,

        /// How merge fixes are blamed (independent or unanimous)
        #[arg(long, default_value = "independent")]
        blame_mode: BlameMode,

        /// What to do when merge parents disagree (abort or skip)
        #[arg(long, default_value = "abort")]
        on_conflict: ConflictPolicy,
    },
    /// Describe one commit's footprint and history
    #[command(long_about = "Describe one commit's footprint and history.\n\n\
        Counts added and deleted lines (raw and without comments or blanks), the\n\
        files and directories it touches, and how those files evolved up to --upto.\n\n\
        Examples:\n  vcchunt stat --commit HEAD~3\n  vcchunt stat --commit 4d5e6f --upto 1a2b3c --format json")]
    Stat {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Commit to describe
        #[arg(long)]
        commit: String,

        /// History bound (default: the commit itself)
        #[arg(long)]
        upto: Option<String>,

        /// What to do with files that have fewer than two commits (error or skip)
        #[arg(long, default_value = "error")]
        short_history: ShortHistoryPolicy,
    },
    /// Show whether lines count as noise or significant code
    Classify {
        /// Lines to classify, without diff markers
        #[arg(required = true)]
        lines: Vec<String>,
    },
    /// Create a default vcchunt.toml configuration file
    #[command(long_about = "Create a default vcchunt.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if the file already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# vcchunt configuration

[run]
# Directory holding local clones, one per owner/name
# repo_dir = ".repo"
# Clone URL prefix; repositories are fetched from <remote_base>/<owner>/<name>.git
# remote_base = "https://github.com"
# Worker threads (0 = one per CPU)
# workers = 4
# Discard and re-clone local copies that cannot be opened
# force_reset = false
# "independent" sums votes over every parent of a merge fix,
# "unanimous" requires all parents to agree on each line
# blame_mode = "independent"
# Unanimous mode only: "abort" or "skip" lines the parents disagree on
# on_conflict = "abort"
# Files with fewer than two commits of history: "error" or "skip"
# short_history = "error"

# One table per vulnerability. Files must follow the order of the fix diff.
# [[entries]]
# cve_id = "CVE-2021-22876"
# repo = "curl/curl"
# fix = "7214288898f5625a6cc196e22a74232eada7861c"
# files = ["lib/transfer.c"]
"#;

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("VCCHUNT_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

fn open_history(path: &Path) -> Result<GitHistory> {
    let repo = git2::Repository::discover(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("no git repository at {}", path.display()))?;
    debug!(root = ?repo.workdir(), "opened repository");
    Ok(GitHistory::from_repository(repo))
}

fn emit(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn format_outcome(outcome: &VccOutcome, format: OutputFormat) -> Result<String> {
    let mut out = String::new();
    match format {
        OutputFormat::Json => {
            out = serde_json::to_string_pretty(outcome).into_diagnostic()?;
            out.push('\n');
        }
        OutputFormat::Markdown => {
            out.push_str("| Commit | Votes | Candidate |\n|--------|-------|-----------|\n");
            for (commit, votes) in &outcome.votes {
                let mark = if outcome.candidates.contains(commit) { "yes" } else { "" };
                let _ = writeln!(out, "| `{commit}` | {votes} | {mark} |");
            }
            for c in &outcome.conflicts {
                let _ = writeln!(out, "\n> skipped {}:{} (parents disagree)", c.path, c.line);
            }
        }
        OutputFormat::Text => {
            if outcome.votes.is_empty() {
                out.push_str("no significant line to blame\n");
            }
            for (commit, votes) in &outcome.votes {
                let _ = writeln!(out, "{commit} {votes}");
            }
            for c in &outcome.conflicts {
                let _ = writeln!(out, "skipped {}:{} (parents disagree)", c.path, c.line);
            }
            let _ = writeln!(out, "candidates: {}", outcome.candidates.join(", "));
        }
    }
    Ok(out)
}

fn format_stat(report: &StatisticsReport, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        let mut out = serde_json::to_string_pretty(report).into_diagnostic()?;
        out.push('\n');
        return Ok(out);
    }

    let files = &report.affected.files;
    let m = &report.modification;
    let rows = [
        ("commit", report.commit.clone()),
        ("author", report.author.clone()),
        ("parents", report.parents.join(", ")),
        ("lines", format!("+{}/-{}", m.total.added, m.total.deleted)),
        (
            "significant lines",
            format!("+{}/-{}", m.no_comment_blank.added, m.no_comment_blank.deleted),
        ),
        ("dirs", report.affected.dirs.to_string()),
        ("files", files.total.to_string()),
        ("average interval", files.average_interval.to_string()),
        ("average commits per file", format!("{:.2}", files.average_times)),
        ("developers", files.developers.total.to_string()),
        ("developers per file", format!("{:.2}", files.developers.average)),
        (
            "developer commits",
            format!("{}..{}", files.developers.min_commits, files.developers.max_commits),
        ),
    ];

    let mut out = String::new();
    if format == OutputFormat::Markdown {
        out.push_str("| Metric | Value |\n|--------|-------|\n");
        for (k, v) in rows {
            let _ = writeln!(out, "| {k} | {v} |");
        }
    } else {
        for (k, v) in rows {
            let _ = writeln!(out, "{k:<26}{v}");
        }
    }
    Ok(out)
}

fn load_config(path: Option<&Path>) -> Result<VccConfig> {
    let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
    let config = VccConfig::from_file(path)?;
    debug!(path = %path.display(), entries = config.entries.len(), "configuration loaded");
    Ok(config)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let output = cli.output.as_deref();

    match cli.command {
        None => {
            Cli::command().print_help().into_diagnostic()?;
        }
        Some(Command::Run {
            dest,
            jobs,
            force_reset,
            blame_mode,
            on_conflict,
            short_history,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(dest) = dest {
                config.run.repo_dir = dest;
            }
            if let Some(jobs) = jobs {
                config.run.workers = jobs;
            }
            config.run.force_reset |= force_reset;
            if let Some(mode) = blame_mode {
                config.run.blame_mode = mode;
            }
            if let Some(policy) = on_conflict {
                config.run.on_conflict = policy;
            }
            if let Some(policy) = short_history {
                config.run.short_history = policy;
            }

            let progress = if std::io::stderr().is_terminal() {
                let pb = indicatif::ProgressBar::new(config.entries.len() as u64);
                pb.set_style(
                    indicatif::ProgressStyle::with_template(
                        "{spinner:.cyan} [{bar:30}] {pos}/{len} {msg} ({elapsed})",
                    )
                    .into_diagnostic()?
                    .progress_chars("=> "),
                );
                pb.enable_steady_tick(std::time::Duration::from_millis(120));
                Some(pb)
            } else {
                None
            };

            let report = vcchunt_provenance::run_batch(&config, |entry, ok| {
                if let Some(pb) = &progress {
                    let status = if ok { "done" } else { "failed" };
                    pb.set_message(format!("{} {status}", entry.cve_id));
                    pb.inc(1);
                }
            })?;

            if let Some(pb) = progress {
                pb.finish_with_message(format!(
                    "{} analyzed, {} failed",
                    report.records.len(),
                    report.failures.len()
                ));
            }

            let rendered = vcchunt_provenance::render(&report, cli.format)?;
            emit(output, &rendered)?;

            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Some(Command::Vcc {
            path,
            fix,
            files,
            blame_mode,
            on_conflict,
        }) => {
            let history = open_history(&path)?;
            let opts = BlameOptions {
                mode: blame_mode,
                on_conflict,
            };
            let outcome = vcc_heuristic(&history, &fix, &files, &opts)?;
            emit(output, &format_outcome(&outcome, cli.format)?)?;
        }
        Some(Command::Stat {
            path,
            commit,
            upto,
            short_history,
        }) => {
            let history = open_history(&path)?;
            let upto = upto.unwrap_or_else(|| commit.clone());
            let report = commit_stats(&history, &commit, &upto, &StatOptions { short_history })?;
            emit(output, &format_stat(&report, cli.format)?)?;
        }
        Some(Command::Classify { lines }) => {
            let mut out = String::new();
            for line in &lines {
                let class = if vcchunt_difflens::is_noise(line) {
                    "noise"
                } else {
                    "significant"
                };
                let _ = writeln!(out, "{class:<12}{line}");
            }
            emit(output, &out)?;
        }
        Some(Command::Init) => {
            let path = cli
                .config
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
            if path.exists() {
                miette::bail!("{} already exists", path.display());
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {} with default configuration", path.display());
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "vcchunt", &mut std::io::stdout());
        }
    }

    Ok(())
}
