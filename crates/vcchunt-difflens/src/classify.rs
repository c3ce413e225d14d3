//! Lexical noise filter for diff lines.
//!
//! A line is noise when it is blank, starts a `/*` or `//` comment, or
//! starts with `*` (block comment continuation or close). The check is
//! language agnostic and looks only at the leading characters, so code such
//! as `*ptr = 0;` is also treated as noise.

use std::sync::LazyLock;

use regex::RegexSet;

static NOISE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"^[ \t]*/(?:\*|/).*$", r"^[ \t]*\*/?.*$", r"^[ \t]*$"])
        .expect("noise patterns are valid")
});

/// Whether `text` (diff marker already stripped) is a comment-only or blank line.
///
/// # Examples
///
/// ```
/// use vcchunt_difflens::is_noise;
///
/// assert!(is_noise("   // explain"));
/// assert!(is_noise(" * continued"));
/// assert!(is_noise("\t"));
/// assert!(!is_noise("if (len > max) return -1;"));
/// ```
pub fn is_noise(text: &str) -> bool {
    NOISE.is_match(text.trim_end_matches(['\r', '\n']))
}

/// Inverse of [`is_noise`].
pub fn is_significant(text: &str) -> bool {
    !is_noise(text)
}
