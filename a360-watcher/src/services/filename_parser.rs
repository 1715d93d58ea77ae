//! Output filename parsing
//!
//! Recognizes the two naming schemes the generator has used, tried in order:
//! - Preferred: `S004_A45_00001_.png`, `S004_A70.png`
//! - Legacy: `subject004_age045_00008_.png`
//!
//! Both are case-insensitive and anchored at the start of the stem; anything after the
//! age digits is ignored. A non-matching name is not an error, it simply is not an
//! ingestible file.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Subject and target age recovered from a file name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedName {
    /// Canonical subject identifier (`S` + zero-padded digits)
    pub subject_id: String,
    /// Target age in years
    pub age: u32,
}

fn preferred_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^S(\d{3,})_A(\d{1,3})").expect("valid regex"))
}

fn legacy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^subject(\d{3})_age(\d{3})").expect("valid regex"))
}

/// Parse a file stem into (subject, age); `None` when neither scheme matches
pub fn parse_stem(stem: &str) -> Option<ParsedName> {
    let captures = preferred_pattern()
        .captures(stem)
        .or_else(|| legacy_pattern().captures(stem))?;

    let digits = captures.get(1)?.as_str();
    let age = captures.get(2)?.as_str().parse::<u32>().ok()?;

    Some(ParsedName {
        subject_id: format!("S{}", digits),
        age,
    })
}

/// Parse the stem of a path
pub fn parse_path(path: &Path) -> Option<ParsedName> {
    let stem = path.file_stem()?.to_str()?;
    parse_stem(stem)
}

/// Canonical archive file name for a subject/age (`S010_A35.png`)
pub fn canonical_filename(subject_id: &str, age: u32, extension: &str) -> String {
    format!("{}_A{:02}.{}", subject_id, age, extension)
}
