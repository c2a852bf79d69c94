//! Unified diff hunk model
//!
//! Splits a single file's patch into hunks and parses `@@` headers into
//! old/new line coordinates. Parsing never fails loudly: a header that does not
//! follow the grammar yields `None`, and the hunk is kept with unknown bounds.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::changed_lines::{ChangedLineSet, Side, changed_lines};

/// `@@ -<old>[,<count>] +<new>[,<count>] @@[ context]`
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$").unwrap()
});

/// Parsed coordinates of a hunk header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkHeader {
    pub old_start: usize, // 1-based line number in old file
    pub old_count: usize, // Number of lines in old version
    pub new_start: usize, // 1-based line number in new file
    pub new_count: usize, // Number of lines in new version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl HunkHeader {
    /// Parse a header line. Omitted counts default to 1.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = HEADER_RE.captures(line.trim_end())?;

        let num = |i: usize| caps.get(i).map(|m| m.as_str().parse::<usize>());
        let count = |i: usize| match num(i) {
            Some(parsed) => parsed.ok(),
            None => Some(1),
        };

        let context = caps
            .get(5)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            old_start: num(1)?.ok()?,
            old_count: count(2)?,
            new_start: num(3)?.ok()?,
            new_count: count(4)?,
            context,
        })
    }

    /// First line number on the requested side
    pub fn start(&self, side: Side) -> usize {
        match side {
            Side::Old => self.old_start,
            Side::New => self.new_start,
        }
    }
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )?;
        if let Some(ctx) = &self.context {
            write!(f, " {}", ctx)?;
        }
        Ok(())
    }
}

/// One contiguous block of a unified diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// Header text exactly as received
    pub header_line: String,
    /// Parsed header, `None` when the header is malformed
    pub header: Option<HunkHeader>,
    /// Body lines with their leading `+`/`-`/` ` markers
    pub raw_lines: Vec<String>,
}

impl Hunk {
    pub fn new(header_line: &str) -> Self {
        Self {
            header_line: header_line.to_string(),
            header: HunkHeader::parse(header_line),
            raw_lines: Vec::new(),
        }
    }

    /// Line numbers this hunk touches on one side of the diff
    pub fn changed_lines(&self, side: Side) -> ChangedLineSet {
        changed_lines(
            std::iter::once(self.header_line.as_str()).chain(self.body()),
            side,
        )
    }

    /// Body lines as `&str`
    pub fn body(&self) -> impl Iterator<Item = &str> {
        self.raw_lines.iter().map(String::as_str)
    }

    /// Added/removed lines, trimmed, excluding file header markers
    pub fn change_lines(&self) -> impl Iterator<Item = &str> {
        self.body().map(str::trim).filter(|l| {
            (l.starts_with('+') || l.starts_with('-'))
                && !l.starts_with("+++")
                && !l.starts_with("---")
        })
    }

    /// Number of inserted lines in the body
    pub fn additions(&self) -> usize {
        self.body()
            .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
            .count()
    }
}

/// Split a file patch into hunks. Lines before the first `@@` are dropped.
pub fn split_hunks(patch: &str) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in patch.lines() {
        if line.starts_with("@@") {
            // Save previous hunk
            if let Some(done) = current.take() {
                hunks.push(done);
            }
            current = Some(Hunk::new(line));
        } else if let Some(hunk) = current.as_mut() {
            hunk.raw_lines.push(line.to_string());
        }
    }

    // Don't forget the last hunk
    if let Some(done) = current {
        hunks.push(done);
    }

    hunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_header() {
        let h = HunkHeader::parse("@@ -53,7 +53,8 @@ function requestRandomness(").unwrap();
        assert_eq!(h.old_start, 53);
        assert_eq!(h.old_count, 7);
        assert_eq!(h.new_start, 53);
        assert_eq!(h.new_count, 8);
        assert_eq!(h.context.as_deref(), Some("function requestRandomness("));
    }

    #[test]
    fn test_omitted_counts_default_to_one() {
        let h = HunkHeader::parse("@@ -4 +5 @@").unwrap();
        assert_eq!((h.old_start, h.old_count, h.new_start, h.new_count), (4, 1, 5, 1));
        assert_eq!(h.context, None);
    }

    #[test]
    fn test_explicit_zero_count_is_kept() {
        // pure insertion: only an omitted count defaults
        let h = HunkHeader::parse("@@ -10,0 +10,3 @@").unwrap();
        assert_eq!(h.old_start, 10);
        assert_eq!(h.old_count, 0);
        assert_eq!(h.new_start, 10);
        assert_eq!(h.new_count, 3);
    }

    #[test]
    fn test_blank_context_is_dropped() {
        let h = HunkHeader::parse("@@ -1,2 +1,3 @@   ").unwrap();
        assert_eq!(h.context, None);
    }

    #[test]
    fn test_malformed_headers() {
        assert!(HunkHeader::parse("@@ -a,b +c,d @@").is_none());
        assert!(HunkHeader::parse("@@ broken").is_none());
        assert!(HunkHeader::parse("diff --git a/x b/x").is_none());
        assert!(HunkHeader::parse("@@ -99999999999999999999999 +1 @@").is_none());
    }

    #[test]
    fn test_display_round_trip() {
        let h = HunkHeader::parse("@@ -3,4 +5,6 @@ contract Vault").unwrap();
        assert_eq!(h.to_string(), "@@ -3,4 +5,6 @@ contract Vault");
        assert_eq!(HunkHeader::parse(&h.to_string()), Some(h));
    }

    #[test]
    fn test_split_hunks() {
        let patch = "\
--- a/Vault.sol
+++ b/Vault.sol
@@ -1,2 +1,2 @@
-old
+new
 same
@@ bogus header
+x";
        let hunks = split_hunks(patch);
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].raw_lines, vec!["-old", "+new", " same"]);
        assert!(hunks[0].header.is_some());
        assert!(hunks[1].header.is_none());
        assert_eq!(hunks[1].raw_lines, vec!["+x"]);
    }

    #[test]
    fn test_change_lines_skip_file_markers() {
        let mut hunk = Hunk::new("@@ -1 +1 @@");
        hunk.raw_lines = vec!["+++ b/x".into(), "  + spaced".into(), " ctx".into(), "-gone".into()];
        let lines: Vec<_> = hunk.change_lines().collect();
        assert_eq!(lines, vec!["+ spaced", "-gone"]);
        assert_eq!(hunk.additions(), 0);
    }
}
