use std::fmt::Write;

use vcchunt_core::{BatchReport, OutputFormat, ProvenanceRecord, VccError};

/// Render `report` in the requested format.
///
/// # Errors
///
/// Returns [`VccError::Serialization`] if JSON serialization fails.
pub fn render(report: &BatchReport, format: OutputFormat) -> Result<String, VccError> {
    match format {
        OutputFormat::Json => format_json(report),
        OutputFormat::Markdown => Ok(format_markdown(report)),
        OutputFormat::Text => Ok(format_text(report)),
    }
}

/// Pretty-printed JSON with camelCase keys.
///
/// # Examples
///
/// ```
/// use vcchunt_core::BatchReport;
/// use vcchunt_provenance::output::format_json;
///
/// let json = format_json(&BatchReport::default()).unwrap();
/// assert!(json.contains("\"records\": []"));
/// ```
pub fn format_json(report: &BatchReport) -> Result<String, VccError> {
    serde_json::to_string_pretty(report).map_err(VccError::from)
}

/// One-line-per-fact summary for terminals.
///
/// # Examples
///
/// ```
/// use vcchunt_core::BatchReport;
/// use vcchunt_provenance::output::format_text;
///
/// assert_eq!(format_text(&BatchReport::default()), "0 analyzed, 0 failed\n");
/// ```
pub fn format_text(report: &BatchReport) -> String {
    let mut out = String::new();

    for record in &report.records {
        let _ = writeln!(
            out,
            "{} {} fix {} by {}",
            record.cve_id,
            record.repo,
            short(&record.fix_commit),
            record.fix_author
        );
        if record.vcc.is_empty() {
            let _ = writeln!(out, "  no contributing commit found");
        }
        for finding in &record.vcc {
            let stat = &finding.stat;
            let _ = writeln!(
                out,
                "  vcc {} ({} votes, {} before fix) by {}: +{}/-{} in {} file(s), {} dir(s)",
                short(&finding.commit),
                finding.votes,
                finding.interval,
                stat.author,
                stat.modification.total.added,
                stat.modification.total.deleted,
                stat.affected.files.total,
                stat.affected.dirs
            );
        }
    }

    for failure in &report.failures {
        let _ = writeln!(
            out,
            "FAILED #{} {} {}@{} [{}]: {}",
            failure.index, failure.cve_id, failure.repo, failure.fix, failure.kind, failure.message
        );
    }

    let _ = writeln!(
        out,
        "{} analyzed, {} failed",
        report.records.len(),
        report.failures.len()
    );
    out
}

/// GitHub-flavored Markdown, one section per record.
pub fn format_markdown(report: &BatchReport) -> String {
    let mut out = String::from("# Vulnerability-contributing commits\n\n");

    for record in &report.records {
        markdown_record(&mut out, record);
    }

    if !report.failures.is_empty() {
        out.push_str("## Failed entries\n\n");
        out.push_str("| # | CVE | Repository | Fix | Kind | Message |\n");
        out.push_str("|---|-----|------------|-----|------|---------|\n");
        for f in &report.failures {
            let _ = writeln!(
                out,
                "| {} | {} | {} | `{}` | {} | {} |",
                f.index,
                f.cve_id,
                f.repo,
                f.fix,
                f.kind,
                f.message.replace('|', "\\|")
            );
        }
        out.push('\n');
    }

    out
}

fn markdown_record(out: &mut String, record: &ProvenanceRecord) {
    let _ = writeln!(out, "## {} ({})\n", record.cve_id, record.repo);
    let _ = writeln!(
        out,
        "Fix `{}` by {}\n",
        record.fix_commit, record.fix_author
    );

    if record.vcc.is_empty() {
        out.push_str("_No contributing commit found._\n\n");
        return;
    }

    out.push_str("| Commit | Votes | Before fix | Author | +/- | Significant +/- | Files | Dirs | Avg interval | Developers |\n");
    out.push_str("|--------|-------|------------|--------|-----|-----------------|-------|------|--------------|------------|\n");
    for finding in &record.vcc {
        let stat = &finding.stat;
        let files = &stat.affected.files;
        let _ = writeln!(
            out,
            "| `{}` | {} | {} | {} | +{}/-{} | +{}/-{} | {} | {} | {} | {} ({}-{} commits) |",
            short(&finding.commit),
            finding.votes,
            finding.interval,
            stat.author,
            stat.modification.total.added,
            stat.modification.total.deleted,
            stat.modification.no_comment_blank.added,
            stat.modification.no_comment_blank.deleted,
            files.total,
            stat.affected.dirs,
            files.average_interval,
            files.developers.total,
            files.developers.min_commits,
            files.developers.max_commits
        );
    }
    out.push('\n');
}

fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
