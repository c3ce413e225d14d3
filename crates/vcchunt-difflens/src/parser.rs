use std::fmt;

use serde::Serialize;
use vcchunt_core::VccError;

/// Path printed on the missing side of a created or deleted file.
pub const NULL_PATH: &str = "/dev/null";

/// Role of a line inside a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineRole {
    /// Present only in the post-image (`+`).
    Added,
    /// Present only in the pre-image (`-`).
    Removed,
    /// Present in both images (` `).
    Context,
}

/// One line of a hunk with its position in each image.
///
/// Line numbers are 1-based, the same numbering `git blame -L` uses.
///
/// # Examples
///
/// ```
/// use vcchunt_difflens::{Line, LineRole};
///
/// let line = Line {
///     role: LineRole::Removed,
///     source_line_no: Some(10),
///     target_line_no: None,
///     value: "    free(buf);".into(),
/// };
/// assert!(line.is_removed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    /// Added, removed or context.
    pub role: LineRole,
    /// Position in the pre-image; set for removed and context lines.
    pub source_line_no: Option<u32>,
    /// Position in the post-image; set for added and context lines.
    pub target_line_no: Option<u32>,
    /// Line content without the diff marker.
    pub value: String,
}

impl Line {
    /// Whether the line is only in the post-image.
    pub fn is_added(&self) -> bool {
        self.role == LineRole::Added
    }

    /// Whether the line is only in the pre-image.
    pub fn is_removed(&self) -> bool {
        self.role == LineRole::Removed
    }

    /// Whether the line is unchanged.
    pub fn is_context(&self) -> bool {
        self.role == LineRole::Context
    }
}

/// A contiguous region of change, lines kept in diff order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// First pre-image line covered.
    pub source_start: u32,
    /// Number of pre-image lines covered.
    pub source_length: u32,
    /// First post-image line covered.
    pub target_start: u32,
    /// Number of post-image lines covered.
    pub target_length: u32,
    /// Text after the closing `@@`, usually the enclosing function.
    pub section: String,
    /// Lines in diff order.
    pub lines: Vec<Line>,
    #[serde(skip)]
    seen_source: u32,
    #[serde(skip)]
    seen_target: u32,
}

impl Hunk {
    fn new(header: HunkHeader) -> Self {
        let (source_start, source_length, target_start, target_length, section) = header;
        Self {
            source_start,
            source_length,
            target_start,
            target_length,
            section,
            lines: Vec::new(),
            seen_source: 0,
            seen_target: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.seen_source >= self.source_length && self.seen_target >= self.target_length
    }

    fn push(&mut self, role: LineRole, value: &str) {
        let source_line_no = (role != LineRole::Added).then_some(self.source_start + self.seen_source);
        let target_line_no = (role != LineRole::Removed).then_some(self.target_start + self.seen_target);
        if source_line_no.is_some() {
            self.seen_source += 1;
        }
        if target_line_no.is_some() {
            self.seen_target += 1;
        }
        self.lines.push(Line {
            role,
            source_line_no,
            target_line_no,
            value: value.to_string(),
        });
    }
}

/// The patch of a single file.
///
/// `source_file` and `target_file` keep the paths exactly as the diff
/// prints them, including the `a/` and `b/` prefixes or [`NULL_PATH`].
///
/// # Examples
///
/// ```
/// use vcchunt_difflens::parse_patch;
///
/// let diff = "diff --git a/hello.c b/hello.c\n\
///             --- a/hello.c\n\
///             +++ b/hello.c\n\
///             @@ -1,2 +1,3 @@\n\
///              int main() {\n\
///             +    puts(\"hi\");\n\
///              }\n";
/// let files = parse_patch(diff).unwrap();
/// assert_eq!(files[0].source_file, "a/hello.c");
/// assert_eq!(files[0].target_path(), Some("hello.c"));
/// assert_eq!(files[0].hunks[0].lines[1].target_line_no, Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePatch {
    /// `---` path as printed.
    pub source_file: String,
    /// `+++` path as printed.
    pub target_file: String,
    /// Hunks in diff order.
    pub hunks: Vec<Hunk>,
    /// Whether the file is newly created.
    pub is_new_file: bool,
    /// Whether the file is deleted.
    pub is_deleted_file: bool,
    /// Whether the file was renamed.
    pub is_rename: bool,
    /// Whether git reported the file as binary.
    pub is_binary: bool,
}

impl FilePatch {
    fn new() -> Self {
        Self {
            source_file: String::new(),
            target_file: String::new(),
            hunks: Vec::new(),
            is_new_file: false,
            is_deleted_file: false,
            is_rename: false,
            is_binary: false,
        }
    }

    /// Repository-relative pre-image path, `None` for created files.
    pub fn source_path(&self) -> Option<&str> {
        strip_side(&self.source_file, "a/")
    }

    /// Repository-relative post-image path, `None` for deleted files.
    pub fn target_path(&self) -> Option<&str> {
        strip_side(&self.target_file, "b/")
    }

    /// Lines added across all hunks.
    pub fn added(&self) -> usize {
        self.lines().filter(|l| l.is_added()).count()
    }

    /// Lines removed across all hunks.
    pub fn removed(&self) -> usize {
        self.lines().filter(|l| l.is_removed()).count()
    }

    /// Every hunk line in diff order.
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.hunks.iter().flat_map(|h| h.lines.iter())
    }

    fn current_hunk_is_open(&self) -> bool {
        self.hunks.last().is_some_and(|h| !h.is_complete())
    }
}

impl fmt::Display for FilePatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({} hunks)",
            self.source_file,
            self.target_file,
            self.hunks.len()
        )
    }
}

fn strip_side<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    if raw == NULL_PATH || raw.is_empty() {
        return None;
    }
    Some(raw.strip_prefix(prefix).unwrap_or(raw))
}

/// Parse unified diff text (as produced by `git diff` / `git show -p`) into
/// file patches.
///
/// Order is preserved exactly: files, hunks and lines appear as in the input.
/// Hunk bodies are delimited by the counts in their `@@` header, so removed
/// lines that look like `--- ` headers are still read as removals.
///
/// # Errors
///
/// Returns [`VccError::Parse`] if a hunk header is malformed or a hunk body
/// holds more or fewer lines than its header announces.
///
/// # Examples
///
/// ```
/// use vcchunt_difflens::parse_patch;
///
/// assert!(parse_patch("").unwrap().is_empty());
/// ```
pub fn parse_patch(input: &str) -> Result<Vec<FilePatch>, VccError> {
    let mut files: Vec<FilePatch> = Vec::new();
    let mut current: Option<FilePatch> = None;

    for line in input.lines() {
        if let Some(file) = current.as_mut() {
            if file.current_hunk_is_open() {
                if let Some(hunk) = file.hunks.last_mut() {
                    match line.chars().next() {
                        Some('+') => hunk.push(LineRole::Added, &line[1..]),
                        Some('-') => hunk.push(LineRole::Removed, &line[1..]),
                        Some(' ') => hunk.push(LineRole::Context, &line[1..]),
                        // Some tools strip the lone space of blank context lines.
                        None => hunk.push(LineRole::Context, ""),
                        Some('\\') => {}
                        Some(_) => {
                            return Err(VccError::Parse(format!(
                                "unexpected line inside hunk of {}: {line}",
                                file.target_file
                            )))
                        }
                    }
                    continue;
                }
            }
        }

        if line.starts_with("diff --git ") {
            if let Some(file) = current.take() {
                files.push(file);
            }
            let mut file = FilePatch::new();
            if let Some((source, target)) = split_git_header(line) {
                file.source_file = source;
                file.target_file = target;
            }
            current = Some(file);
            continue;
        }

        // Patches without a "diff --git" line start directly at "--- ".
        if line.starts_with("--- ") && current.as_ref().map_or(true, |f| !f.hunks.is_empty()) {
            if let Some(file) = current.take() {
                files.push(file);
            }
            current = Some(FilePatch::new());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if line.starts_with("Binary files ") && line.ends_with(" differ") {
            file.is_binary = true;
            continue;
        }

        if line.starts_with("new file mode") {
            file.is_new_file = true;
            continue;
        }

        if line.starts_with("deleted file mode") {
            file.is_deleted_file = true;
            continue;
        }

        if line.starts_with("rename from ") || line.starts_with("rename to ") {
            file.is_rename = true;
            continue;
        }

        if let Some(path) = line.strip_prefix("--- ") {
            file.source_file = clean_path(path);
            if file.source_file == NULL_PATH {
                file.is_new_file = true;
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("+++ ") {
            file.target_file = clean_path(path);
            if file.target_file == NULL_PATH {
                file.is_deleted_file = true;
            }
            continue;
        }

        if line.starts_with("@@ ") {
            file.hunks.push(Hunk::new(parse_hunk_header(line)?));
            continue;
        }

        if !file.hunks.is_empty() && matches!(line.chars().next(), Some('+' | '-' | ' ')) {
            return Err(VccError::Parse(format!(
                "hunk of {} is longer than its header: {line}",
                file.target_file
            )));
        }
    }

    if let Some(file) = current.take() {
        if file.current_hunk_is_open() {
            return Err(VccError::Parse(format!(
                "hunk of {} ends before its header count",
                file.target_file
            )));
        }
        files.push(file);
    }

    Ok(files)
}

fn clean_path(raw: &str) -> String {
    // git appends a tab before timestamps in some patch formats
    let raw = raw.split('\t').next().unwrap_or(raw);
    match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(quoted) => unquote(quoted),
        None => raw.to_string(),
    }
}

/// Decode a C-style quoted path, the way git prints paths holding
/// non-ASCII bytes, quotes or backslashes.
fn unquote(quoted: &str) -> String {
    let mut bytes = Vec::with_capacity(quoted.len());
    let mut rest = quoted.bytes().peekable();

    while let Some(b) = rest.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match rest.next() {
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match rest.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(o - b'0');
                            rest.next();
                        }
                        _ => break,
                    }
                }
                bytes.push((value & 0xff) as u8);
            }
            Some(b'a') => bytes.push(0x07),
            Some(b'b') => bytes.push(0x08),
            Some(b't') => bytes.push(b'\t'),
            Some(b'n') => bytes.push(b'\n'),
            Some(b'v') => bytes.push(0x0b),
            Some(b'f') => bytes.push(0x0c),
            Some(b'r') => bytes.push(b'\r'),
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

fn split_git_header(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("diff --git ")?;
    let idx = rest.rfind(" b/").or_else(|| rest.rfind(" \"b/"))?;
    let (source, target) = rest.split_at(idx);
    Some((clean_path(source), clean_path(target.trim_start())))
}

type HunkHeader = (u32, u32, u32, u32, String);

fn parse_hunk_header(line: &str) -> Result<HunkHeader, VccError> {
    let invalid = || VccError::Parse(format!("invalid hunk header: {line}"));
    let rest = line.strip_prefix("@@ ").ok_or_else(invalid)?;
    let end = rest.find(" @@").ok_or_else(invalid)?;
    let (ranges, section) = (&rest[..end], &rest[end + 3..]);

    let parts: Vec<&str> = ranges.split(' ').collect();
    if parts.len() != 2 {
        return Err(invalid());
    }

    let old = parts[0]
        .strip_prefix('-')
        .ok_or_else(|| VccError::Parse(format!("invalid old range in hunk: {line}")))?;
    let new = parts[1]
        .strip_prefix('+')
        .ok_or_else(|| VccError::Parse(format!("invalid new range in hunk: {line}")))?;

    let (source_start, source_length) = parse_range(old, line)?;
    let (target_start, target_length) = parse_range(new, line)?;

    Ok((
        source_start,
        source_length,
        target_start,
        target_length,
        section.trim().to_string(),
    ))
}

fn parse_range(range: &str, context: &str) -> Result<(u32, u32), VccError> {
    let number = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| VccError::Parse(format!("invalid range number in: {context}")))
    };
    match range.split_once(',') {
        Some((start, count)) => Ok((number(start)?, number(count)?)),
        None => Ok((number(range)?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(hunk: &Hunk) -> Vec<LineRole> {
        hunk.lines.iter().map(|l| l.role).collect()
    }

    #[test]
    fn empty_diff_returns_empty_vec() {
        assert!(parse_patch("").unwrap().is_empty());
    }

    #[test]
    fn single_file_single_hunk_numbers_lines() {
        let diff = "\
diff --git a/src/main.c b/src/main.c
index abc1234..def5678 100644
--- a/src/main.c
+++ b/src/main.c
@@ -8,4 +8,4 @@ int parse(char *buf)
 a
 b
-c
+C
 d
";
        let files = parse_patch(diff).unwrap();
        assert_eq!(files.len(), 1);
        let file = &files[0];
        assert_eq!(file.source_file, "a/src/main.c");
        assert_eq!(file.target_file, "b/src/main.c");
        let hunk = &file.hunks[0];
        assert_eq!(hunk.section, "int parse(char *buf)");
        assert_eq!(
            roles(hunk),
            vec![
                LineRole::Context,
                LineRole::Context,
                LineRole::Removed,
                LineRole::Added,
                LineRole::Context
            ]
        );
        assert_eq!(hunk.lines[2].source_line_no, Some(10));
        assert_eq!(hunk.lines[2].target_line_no, None);
        assert_eq!(hunk.lines[3].source_line_no, None);
        assert_eq!(hunk.lines[3].target_line_no, Some(10));
        assert_eq!(hunk.lines[4].source_line_no, Some(11));
        assert_eq!(hunk.lines[4].target_line_no, Some(11));
        assert_eq!(hunk.lines[3].value, "C");
    }

    #[test]
    fn multiple_hunks_and_files_keep_order() {
        let diff = "\
diff --git a/a.c b/a.c
--- a/a.c
+++ b/a.c
@@ -1 +1,2 @@
 one
+two
@@ -10,2 +11,2 @@
-x
+y
 z
diff --git a/b.c b/b.c
--- a/b.c
+++ b/b.c
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_patch(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].hunks.len(), 2);
        assert_eq!(files[0].hunks[1].lines[0].source_line_no, Some(10));
        assert_eq!(files[0].hunks[1].lines[1].target_line_no, Some(11));
        assert_eq!(files[1].target_path(), Some("b.c"));
        assert_eq!(files[0].added(), 2);
        assert_eq!(files[0].removed(), 1);
    }

    #[test]
    fn removed_line_that_looks_like_a_header() {
        let diff = "\
diff --git a/notes.md b/notes.md
--- a/notes.md
+++ b/notes.md
@@ -1,2 +1,1 @@
--- a/rule
 keep
";
        let files = parse_patch(diff).unwrap();
        let hunk = &files[0].hunks[0];
        assert_eq!(hunk.lines.len(), 2);
        assert!(hunk.lines[0].is_removed());
        assert_eq!(hunk.lines[0].value, "-- a/rule");
    }

    #[test]
    fn new_file_has_null_source() {
        let diff = "\
diff --git a/new.c b/new.c
new file mode 100644
--- /dev/null
+++ b/new.c
@@ -0,0 +1,2 @@
+int x;
+int y;
";
        let files = parse_patch(diff).unwrap();
        assert!(files[0].is_new_file);
        assert_eq!(files[0].source_file, NULL_PATH);
        assert_eq!(files[0].source_path(), None);
        assert_eq!(files[0].hunks[0].lines[1].target_line_no, Some(2));
    }

    #[test]
    fn deleted_file_has_null_target() {
        let diff = "\
diff --git a/old.c b/old.c
deleted file mode 100644
--- a/old.c
+++ /dev/null
@@ -1,2 +0,0 @@
-int x;
-int y;
";
        let files = parse_patch(diff).unwrap();
        assert!(files[0].is_deleted_file);
        assert_eq!(files[0].target_path(), None);
        assert_eq!(files[0].source_path(), Some("old.c"));
        assert_eq!(files[0].removed(), 2);
    }

    #[test]
    fn rename_without_content_uses_git_header_paths() {
        let diff = "\
diff --git a/old_name.c b/new_name.c
similarity index 100%
rename from old_name.c
rename to new_name.c
";
        let files = parse_patch(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_rename);
        assert_eq!(files[0].source_path(), Some("old_name.c"));
        assert_eq!(files[0].target_path(), Some("new_name.c"));
    }

    #[test]
    fn binary_files_are_kept_without_hunks() {
        let diff = "\
diff --git a/logo.png b/logo.png
Binary files a/logo.png and b/logo.png differ
diff --git a/code.c b/code.c
--- a/code.c
+++ b/code.c
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_patch(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].is_binary);
        assert!(files[0].hunks.is_empty());
        assert_eq!(files[0].target_path(), Some("logo.png"));
    }

    #[test]
    fn no_newline_marker_is_skipped() {
        let diff = "\
diff --git a/f.c b/f.c
--- a/f.c
+++ b/f.c
@@ -1 +1 @@
-old
\\ No newline at end of file
+new
\\ No newline at end of file
";
        let files = parse_patch(diff).unwrap();
        let hunk = &files[0].hunks[0];
        assert_eq!(hunk.lines.len(), 2);
        assert_eq!(hunk.lines[0].value, "old");
        assert_eq!(hunk.lines[1].value, "new");
    }

    #[test]
    fn stripped_blank_context_line() {
        let diff = "--- a/f.c\n+++ b/f.c\n@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n";
        let files = parse_patch(diff).unwrap();
        let hunk = &files[0].hunks[0];
        assert!(hunk.lines[1].is_context());
        assert_eq!(hunk.lines[1].value, "");
        assert_eq!(hunk.lines[2].source_line_no, Some(3));
    }

    #[test]
    fn quoted_paths_are_unquoted() {
        let diff = r#"--- "a/src/my file.c"
+++ "b/src/my file.c"
@@ -1 +1,2 @@
 old
+new
"#;
        let files = parse_patch(diff).unwrap();
        assert_eq!(files[0].source_file, "a/src/my file.c");
        assert_eq!(files[0].target_path(), Some("src/my file.c"));
    }

    #[test]
    fn quoted_paths_decode_octal_escapes() {
        let diff = r#"diff --git "a/src/caf\303\251.c" "b/src/caf\303\251.c"
--- "a/src/caf\303\251.c"
+++ "b/src/caf\303\251.c"
@@ -1 +1 @@
-a
+b
"#;
        let files = parse_patch(diff).unwrap();
        assert_eq!(files[0].source_file, "a/src/café.c");
        assert_eq!(files[0].target_path(), Some("src/café.c"));
    }

    #[test]
    fn quoted_paths_decode_c_escapes() {
        assert_eq!(clean_path(r#""a/say \"hi\".c""#), "a/say \"hi\".c");
        assert_eq!(clean_path(r#""b/back\\slash\ttab""#), "b/back\\slash\ttab");
        assert_eq!(clean_path(r#""b/line\nbreak""#), "b/line\nbreak");
        assert_eq!(clean_path("b/plain.c\t2024-01-01"), "b/plain.c");
    }

    #[test]
    fn git_header_with_quoted_paths() {
        let diff = "diff --git \"a/d\\303\\251j\\303\\240\" \"b/d\\303\\251j\\303\\240\"\nBinary files differ\n";
        let files = parse_patch(diff).unwrap();
        assert_eq!(files[0].source_path(), Some("déjà"));
        assert_eq!(files[0].target_path(), Some("déjà"));
    }

    #[test]
    fn long_hunk_keeps_numbering() {
        let lines = 50_000u32;
        let mut diff = format!("--- /dev/null\n+++ b/gen.c\n@@ -0,0 +1,{lines} @@\n");
        for i in 0..lines {
            diff.push_str(&format!("+int v{i};\n"));
        }
        let files = parse_patch(&diff).unwrap();
        let hunk = &files[0].hunks[0];
        assert_eq!(hunk.lines.len(), lines as usize);
        assert_eq!(hunk.lines[0].target_line_no, Some(1));
        assert_eq!(hunk.lines.last().unwrap().target_line_no, Some(lines));
        assert_eq!(hunk.lines.last().unwrap().value, format!("int v{};", lines - 1));
    }

    #[test]
    fn truncated_hunk_at_end_of_input_is_an_error() {
        let diff = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n";
        assert!(matches!(parse_patch(diff), Err(VccError::Parse(_))));
    }

    #[test]
    fn malformed_hunk_header_is_an_error() {
        let diff = "--- a/f.c\n+++ b/f.c\n@@ -x +1 @@\n";
        assert!(matches!(parse_patch(diff), Err(VccError::Parse(_))));
    }

    #[test]
    fn overlong_hunk_is_an_error() {
        let diff = "--- a/f.c\n+++ b/f.c\n@@ -1 +1 @@\n-a\n+b\n+c\n";
        assert!(matches!(parse_patch(diff), Err(VccError::Parse(_))));
    }

    #[test]
    fn real_world_fixture() {
        let diff = include_str!("../tests/fixtures/fix.diff");
        let files = parse_patch(diff).unwrap();
        assert_eq!(files.len(), 2);
        for file in &files {
            assert!(!file.hunks.is_empty());
            for hunk in &file.hunks {
                let source = hunk.lines.iter().filter(|l| !l.is_added()).count() as u32;
                let target = hunk.lines.iter().filter(|l| !l.is_removed()).count() as u32;
                assert_eq!(source, hunk.source_length);
                assert_eq!(target, hunk.target_length);
            }
        }
    }
}
