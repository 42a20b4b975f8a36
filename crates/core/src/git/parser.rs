//! Parsers for the line-oriented text produced by the git oracle.
//!
//! Nothing here runs a process; every function takes captured output and
//! returns typed data. Commit ids are validated through [`CommitId::parse`]
//! at the point they are read and nowhere else.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::{debug, warn};

use crate::git::oracle::{RECORD_BEGIN, RECORD_END};
use crate::models::{CommitId, LineAttribution};

// ---------------------------------------------------------------------------
// Tree-merge report shapes
// ---------------------------------------------------------------------------

/// The layout of a tree-merge report, determined by probing its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportShape {
    /// No output at all.
    Empty,
    /// Section headers (`changed in both`, ...) followed by `our`/`their`
    /// entries and a unified diff of the merge result.
    Legacy,
    /// `--write-tree` output: tree id, conflicted stage entries, and
    /// `CONFLICT (...)` messages.
    Modern,
    /// Text that matches neither grammar.
    Unrecognized,
}

impl std::fmt::Display for ReportShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Legacy => write!(f, "legacy"),
            Self::Modern => write!(f, "write-tree"),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// One header-delimited section of a legacy report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacySection {
    pub header: String,
    pub path: Option<String>,
    /// Whether the section's diff carries `+<<<<<<<` conflict markers.
    pub has_markers: bool,
    /// Whether any `@@` hunk follows the entries.
    pub has_hunk: bool,
    pub our_id: Option<String>,
    pub their_id: Option<String>,
    /// Lines between `+=======` and `+>>>>>>>`, prefixes stripped.
    pub their_lines: Vec<String>,
}

impl LegacySection {
    /// Headers that always denote a conflict, even without markers.
    fn always_conflicting(&self) -> bool {
        matches!(self.header.as_str(), "both modified" | "both added")
    }

    /// Both sides changed the blob but git printed no diff for it, which is
    /// how a binary conflict appears.
    fn unmerged_without_diff(&self) -> bool {
        !self.has_hunk
            && matches!(
                (&self.our_id, &self.their_id),
                (Some(ours), Some(theirs)) if ours != theirs
            )
    }

    pub fn is_conflict(&self) -> bool {
        self.path.is_some()
            && (self.has_markers || self.always_conflicting() || self.unmerged_without_diff())
    }
}

fn legacy_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(changed in both|added in both|both modified|both added):?\s*$")
            .expect("valid legacy header regex")
    })
}

/// Any other unindented legacy header ends the current section.
fn legacy_other_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(added in (local|remote)|removed in (local|remote)|removed in both|merged)\s*$")
            .expect("valid legacy section regex")
    })
}

fn legacy_side_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s+(our|their)\s+[0-7]{6}\s+([0-9a-fA-F]+)\s+(.+)$")
            .expect("valid legacy side regex")
    })
}

fn stage_entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-7]{6} [0-9a-f]{40,64} [0-3]\t(.+)$").expect("valid stage entry regex")
    })
}

/// How many lines after a header may hold the `our`/`their` entry.
const LEGACY_SIDE_WINDOW: usize = 4;

/// Conflict markers as they appear at the start of a line.
fn is_marker(line: &str, marker: char) -> bool {
    let run: String = std::iter::repeat(marker).take(7).collect();
    match line.strip_prefix(run.as_str()) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

fn is_any_marker(line: &str) -> bool {
    is_marker(line, '<') || is_marker(line, '=') || is_marker(line, '>') || is_marker(line, '|')
}

fn is_hex_id(value: &str) -> bool {
    (value.len() == 40 || value.len() == 64) && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decide which grammar `text` follows.
pub fn probe_report_shape(text: &str) -> ReportShape {
    if text.trim().is_empty() {
        return ReportShape::Empty;
    }
    if text.lines().any(|line| legacy_header_re().is_match(line)) {
        return ReportShape::Legacy;
    }
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let modern = is_hex_id(first.trim())
        || text
            .lines()
            .any(|l| l.starts_with("CONFLICT (") || stage_entry_re().is_match(l));
    if modern {
        ReportShape::Modern
    } else {
        ReportShape::Unrecognized
    }
}

/// Split a legacy report into sections and mine each one's target side.
pub fn parse_legacy_report(text: &str) -> Vec<LegacySection> {
    let mut sections: Vec<LegacySection> = Vec::new();
    let mut current: Option<LegacySection> = None;
    let mut lines_since_header = 0usize;
    let mut in_conflict = false;
    let mut in_their = false;

    for line in text.lines() {
        if let Some(caps) = legacy_header_re().captures(line) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            current = Some(LegacySection {
                header: caps[1].to_string(),
                ..Default::default()
            });
            lines_since_header = 0;
            in_conflict = false;
            in_their = false;
            continue;
        }
        if legacy_other_header_re().is_match(line) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            in_conflict = false;
            in_their = false;
            continue;
        }

        let Some(section) = current.as_mut() else {
            continue;
        };
        lines_since_header += 1;

        if lines_since_header <= LEGACY_SIDE_WINDOW {
            if let Some(caps) = legacy_side_re().captures(line) {
                let id = caps[2].to_ascii_lowercase();
                if &caps[1] == "our" {
                    section.our_id = Some(id);
                } else {
                    section.their_id = Some(id);
                }
                section.path = Some(caps[3].trim().to_string());
                continue;
            }
        }

        if line.starts_with("@@") {
            section.has_hunk = true;
        }
        let added = line.strip_prefix('+');
        if added.is_some_and(|l| is_marker(l, '<')) {
            in_conflict = true;
            in_their = false;
            section.has_markers = true;
        } else if added.is_some_and(|l| is_marker(l, '=')) && in_conflict {
            in_their = true;
        } else if added.is_some_and(|l| is_marker(l, '>')) {
            in_conflict = false;
            in_their = false;
        } else if in_their {
            if let Some(content) = line.strip_prefix('+').or_else(|| line.strip_prefix(' ')) {
                section.their_lines.push(content.to_string());
            }
        }
    }
    if let Some(done) = current.take() {
        sections.push(done);
    }

    debug!(count = sections.len(), "parsed legacy merge-tree sections");
    sections
}

/// Conflicting paths of a legacy report, in report order.
pub fn legacy_conflict_paths(sections: &[LegacySection]) -> Vec<String> {
    let mut seen = HashSet::new();
    sections
        .iter()
        .filter(|s| s.is_conflict())
        .filter_map(|s| s.path.clone())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Target-side lines per path mined from a legacy report.
pub fn legacy_their_lines(sections: &[LegacySection]) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for section in sections {
        if let Some(path) = &section.path {
            if !section.their_lines.is_empty() {
                out.entry(path.clone())
                    .or_default()
                    .extend(section.their_lines.iter().cloned());
            }
        }
    }
    out
}

/// Extract the path named by a `CONFLICT (<kind>): <message>` line.
fn conflict_message_path(line: &str) -> Option<String> {
    let rest = line.strip_prefix("CONFLICT (")?;
    let close = rest.find("): ")?;
    let message = rest[close + 3..].trim();
    message
        .strip_prefix("Merge conflict in ")
        .map(|p| p.trim().to_string())
        .or_else(|| {
            message
                .split_once(" renamed to ")
                .map(|(path, _)| path.trim().to_string())
        })
        .or_else(|| {
            message
                .split_once(" deleted in ")
                .map(|(path, _)| path.trim().to_string())
        })
        .filter(|p| !p.is_empty())
}

/// Conflicting paths of a modern report, first appearance order.
///
/// Stage entries name paths exactly and win whenever the report has any.
/// `CONFLICT (...)` messages are prose and are only read when no stage
/// entry is present.
pub fn parse_modern_report(text: &str) -> Vec<String> {
    let mut staged: Vec<String> = Vec::new();
    let mut messaged: Vec<String> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if idx == 0 && is_hex_id(line.trim()) {
            continue;
        }
        if is_any_marker(line) {
            continue;
        }
        if let Some(caps) = stage_entry_re().captures(line) {
            staged.push(caps[1].to_string());
        } else if line.starts_with("CONFLICT (") {
            messaged.extend(conflict_message_path(line));
        }
    }

    let source = if staged.is_empty() { messaged } else { staged };
    let mut seen = HashSet::new();
    let paths: Vec<String> = source.into_iter().filter(|p| seen.insert(p.clone())).collect();
    debug!(count = paths.len(), "parsed modern merge-tree report");
    paths
}

// ---------------------------------------------------------------------------
// Blame
// ---------------------------------------------------------------------------

/// Commit id of a porcelain header line: `<id> <orig-line> <final-line> [<count>]`.
fn blame_header_id(line: &str) -> Option<&str> {
    let mut tokens = line.split(' ');
    let id = tokens.next()?;
    if !is_hex_id(id) {
        return None;
    }
    let numbers: Vec<&str> = tokens.collect();
    let numeric = (2..=3).contains(&numbers.len())
        && numbers.iter().all(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()));
    numeric.then_some(id)
}

/// Parse `git blame --porcelain` output into per-line attribution.
///
/// Each tab-prefixed content line advances the running line counter and is
/// attributed to the commit of the most recent header line.
pub fn parse_blame_porcelain(text: &str) -> LineAttribution {
    let mut attribution = LineAttribution::new();
    let mut current: Option<CommitId> = None;
    let mut line_no = 0usize;

    for line in text.lines() {
        if line.starts_with('\t') {
            line_no += 1;
            if let Some(id) = &current {
                attribution.insert(line_no, id.clone());
            }
            continue;
        }
        if let Some(id) = blame_header_id(line) {
            current = CommitId::parse(id).ok().filter(|id| !id.is_null());
        }
    }
    attribution
}

// ---------------------------------------------------------------------------
// Commit queries
// ---------------------------------------------------------------------------

/// One commit id per line; malformed lines are skipped.
pub fn parse_commit_list(text: &str) -> Vec<CommitId> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match CommitId::parse(l) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(line = l, error = %e, "skipping malformed rev-list line");
                None
            }
        })
        .collect()
}

/// Raw fields of one framed commit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: CommitId,
    pub subject: String,
    pub author: String,
    pub date: String,
}

/// Parse sentinel-framed records from [`crate::git::GitOracle::commit_details`].
///
/// Author and date are the last two lines of a record; everything between
/// the start token and them is the subject. Records with fewer than three
/// body lines, or without a closing token, are dropped.
pub fn parse_commit_records(text: &str) -> Vec<CommitRecord> {
    let mut records = Vec::new();
    let mut open: Option<(CommitId, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(RECORD_BEGIN) {
            open = CommitId::parse(rest).ok().map(|id| (id, Vec::new()));
            continue;
        }
        if line == RECORD_END {
            if let Some((id, body)) = open.take() {
                if body.len() >= 3 {
                    let date = body[body.len() - 1].trim().to_string();
                    let author = body[body.len() - 2].trim().to_string();
                    let subject = body[..body.len() - 2].join(" ").trim().to_string();
                    records.push(CommitRecord {
                        id,
                        subject,
                        author,
                        date,
                    });
                } else {
                    debug!(id = %id, "incomplete commit record");
                }
            }
            continue;
        }
        if let Some((_, body)) = open.as_mut() {
            body.push(line);
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = "\
changed in both
  base   100644 1111111111111111111111111111111111111111 file1.txt
  our    100644 2222222222222222222222222222222222222222 file1.txt
  their  100644 3333333333333333333333333333333333333333 file1.txt
@@ -1 +1,5 @@
-Initial content
+<<<<<<< .our
+Modified on feature branch
+=======
+Modified on default branch
+>>>>>>> .their
changed in both
  base   100644 4444444444444444444444444444444444444444 clean.txt
  our    100644 5555555555555555555555555555555555555555 clean.txt
  their  100644 6666666666666666666666666666666666666666 clean.txt
@@ -1,3 +1,3 @@
-a
+A
 b
-c
+C
added in remote
  their  100644 7777777777777777777777777777777777777777 new.txt
@@ -0,0 +1 @@
+new
";

    #[test]
    fn test_probe_shapes() {
        assert_eq!(probe_report_shape(""), ReportShape::Empty);
        assert_eq!(probe_report_shape("  \n"), ReportShape::Empty);
        assert_eq!(probe_report_shape(LEGACY), ReportShape::Legacy);
        assert_eq!(
            probe_report_shape("0123456789abcdef0123456789abcdef01234567\n"),
            ReportShape::Modern
        );
        assert_eq!(
            probe_report_shape("Auto-merging a\nCONFLICT (content): Merge conflict in a\n"),
            ReportShape::Modern
        );
        assert_eq!(probe_report_shape("hello world\n"), ReportShape::Unrecognized);
    }

    #[test]
    fn test_legacy_sections_and_paths() {
        let sections = parse_legacy_report(LEGACY);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].path.as_deref(), Some("file1.txt"));
        assert!(sections[0].has_markers);
        assert!(!sections[1].has_markers);

        let paths = legacy_conflict_paths(&sections);
        assert_eq!(paths, vec!["file1.txt".to_string()]);
    }

    #[test]
    fn test_legacy_their_lines() {
        let sections = parse_legacy_report(LEGACY);
        let lines = legacy_their_lines(&sections);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines["file1.txt"], vec!["Modified on default branch".to_string()]);
    }

    #[test]
    fn test_legacy_path_with_spaces() {
        let text = "\
changed in both
  our    100644 2222222222222222222222222222222222222222 docs/my file.md
  their  100644 3333333333333333333333333333333333333333 docs/my file.md
@@ -1 +1,5 @@
+<<<<<<< .our
+ours
+=======
+theirs
+>>>>>>> .their
";
        let sections = parse_legacy_report(text);
        assert_eq!(legacy_conflict_paths(&sections), vec!["docs/my file.md".to_string()]);
    }

    #[test]
    fn test_legacy_both_modified_header_without_markers() {
        let text = "\
both modified:
  our    100644 2222222222222222222222222222222222222222 a.txt
  their  100644 3333333333333333333333333333333333333333 a.txt
";
        let sections = parse_legacy_report(text);
        assert_eq!(legacy_conflict_paths(&sections), vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_legacy_binary_section_without_hunk() {
        let text = "\
changed in both
  base   100644 1111111111111111111111111111111111111111 image.bin
  our    100644 2222222222222222222222222222222222222222 image.bin
  their  100644 3333333333333333333333333333333333333333 image.bin
";
        let sections = parse_legacy_report(text);
        assert_eq!(sections.len(), 1);
        assert!(!sections[0].has_markers);
        assert!(!sections[0].has_hunk);
        assert_eq!(legacy_conflict_paths(&sections), vec!["image.bin".to_string()]);
        assert!(legacy_their_lines(&sections).is_empty());
    }

    #[test]
    fn test_legacy_identical_sides_not_conflicting() {
        let text = "\
added in both
  our    100644 2222222222222222222222222222222222222222 same.txt
  their  100644 2222222222222222222222222222222222222222 same.txt
";
        let sections = parse_legacy_report(text);
        assert!(legacy_conflict_paths(&sections).is_empty());
    }

    #[test]
    fn test_legacy_underline_is_not_a_marker() {
        let text = "\
changed in both
  base   100644 1111111111111111111111111111111111111111 README.md
  our    100644 2222222222222222222222222222222222222222 README.md
  their  100644 3333333333333333333333333333333333333333 README.md
@@ -1,2 +1,8 @@
+<<<<<<< .our
+Title
+=======
+Heading
+========
+>>>>>>>> not a marker
+>>>>>>> .their
";
        let sections = parse_legacy_report(text);
        let lines = legacy_their_lines(&sections);
        assert_eq!(
            lines["README.md"],
            vec![
                "Heading".to_string(),
                "========".to_string(),
                ">>>>>>>> not a marker".to_string(),
            ]
        );
    }

    #[test]
    fn test_legacy_side_outside_window_ignored() {
        let text = "\
changed in both
@@ -1 +1 @@
-x
+y
 z
 w
  their  100644 3333333333333333333333333333333333333333 late.txt
";
        let sections = parse_legacy_report(text);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].path.is_none());
        assert!(legacy_conflict_paths(&sections).is_empty());
    }

    #[test]
    fn test_modern_report() {
        let text = "\
0123456789abcdef0123456789abcdef01234567
100644 1111111111111111111111111111111111111111 1\tsrc/lib.rs
100644 2222222222222222222222222222222222222222 2\tsrc/lib.rs
100644 3333333333333333333333333333333333333333 3\tsrc/lib.rs

100644 4444444444444444444444444444444444444444 1	docs/old.md
100644 5555555555555555555555555555555555555555 2	docs/old.md

Auto-merging src/lib.rs
CONFLICT (content): Merge conflict in src/lib.rs
CONFLICT (modify/delete): docs/old.md deleted in main and modified in feature.  Version feature of docs/old.md left in tree.
";
        let paths = parse_modern_report(text);
        assert_eq!(paths, vec!["src/lib.rs".to_string(), "docs/old.md".to_string()]);
    }

    #[test]
    fn test_modern_report_ignores_embedded_markers() {
        let text = "\
0123456789abcdef0123456789abcdef01234567
<<<<<<< ours
=======
>>>>>>> theirs
CONFLICT (add/add): Merge conflict in real.txt
";
        let paths = parse_modern_report(text);
        assert_eq!(paths, vec!["real.txt".to_string()]);
    }

    #[test]
    fn test_modern_report_rename_delete_uses_stage_entries() {
        let text = "\
0123456789abcdef0123456789abcdef01234567
100644 1111111111111111111111111111111111111111 1\tnew.txt
100644 2222222222222222222222222222222222222222 2\tnew.txt

CONFLICT (rename/delete): old.txt renamed to new.txt in feature, but deleted in main.
";
        let paths = parse_modern_report(text);
        assert_eq!(paths, vec!["new.txt".to_string()]);
    }

    #[test]
    fn test_modern_report_messages_only() {
        let text = "\
Auto-merging a.txt
CONFLICT (content): Merge conflict in a.txt
CONFLICT (rename/delete): old.txt renamed to new.txt in feature, but deleted in main.
CONFLICT (modify/delete): gone.txt deleted in main and modified in feature.
";
        let paths = parse_modern_report(text);
        assert_eq!(
            paths,
            vec!["a.txt".to_string(), "old.txt".to_string(), "gone.txt".to_string()]
        );
    }

    #[test]
    fn test_modern_clean_report() {
        assert!(parse_modern_report("0123456789abcdef0123456789abcdef01234567\n").is_empty());
    }

    #[test]
    fn test_conflict_message_variants() {
        assert_eq!(
            conflict_message_path("CONFLICT (content): Merge conflict in a/b.rs").as_deref(),
            Some("a/b.rs")
        );
        assert_eq!(
            conflict_message_path(
                "CONFLICT (rename/delete): old.txt renamed to new.txt in feature, but deleted in main."
            )
            .as_deref(),
            Some("old.txt")
        );
        assert_eq!(conflict_message_path("Auto-merging x"), None);
    }

    #[test]
    fn test_marker_detection() {
        assert!(is_marker("<<<<<<< ours", '<'));
        assert!(is_marker("=======", '='));
        assert!(!is_marker("========", '='));
        assert!(!is_marker("<<<<<<<<", '<'));
        assert!(!is_marker("<<<<<< six", '<'));
    }

    #[test]
    fn test_parse_blame_porcelain() {
        let a = "a".repeat(40);
        let b = "b".repeat(40);
        let text = format!(
            "{a} 1 1 2\n\
author Alice\n\
summary first\n\
filename f.txt\n\
\tLine1\n\
{a} 2 2\n\
\tLine2\n\
{b} 3 3 1\n\
author Bob\n\
previous {a} f.txt\n\
filename f.txt\n\
\tLine3-X\n"
        );
        let attribution = parse_blame_porcelain(&text);
        assert_eq!(attribution.len(), 3);
        assert_eq!(attribution.get(1).unwrap().as_str(), a);
        assert_eq!(attribution.get(2).unwrap().as_str(), a);
        assert_eq!(attribution.get(3).unwrap().as_str(), b);
    }

    #[test]
    fn test_blame_content_resembling_header() {
        let a = "a".repeat(40);
        let b = "b".repeat(40);
        // A content line that itself looks like a header must not switch commits.
        let text = format!("{a} 1 1 2\n\t{b} 1 1\n{a} 2 2\n\tsecond\n");
        let attribution = parse_blame_porcelain(&text);
        assert_eq!(attribution.get(1).unwrap().as_str(), a);
        assert_eq!(attribution.get(2).unwrap().as_str(), a);
    }

    #[test]
    fn test_blame_skips_uncommitted() {
        let zero = "0".repeat(40);
        let text = format!("{zero} 1 1 1\nauthor Not Committed Yet\n\tdirty\n");
        assert!(parse_blame_porcelain(&text).is_empty());
    }

    #[test]
    fn test_parse_commit_list() {
        let a = "a".repeat(40);
        let ids = parse_commit_list(&format!("{a}\n\ngarbage\n"));
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), a);
    }

    #[test]
    fn test_parse_commit_records() {
        let a = "a".repeat(40);
        let b = "b".repeat(40);
        let c = "c".repeat(40);
        let text = format!(
            "{RECORD_BEGIN} {a}\n\
Fix the parser\n\
Alice <alice@example.com>\n\
2024-03-01 12:00:00\n\
{RECORD_END}\n\
{RECORD_BEGIN} {b}\n\
only one line\n\
{RECORD_END}\n\
{RECORD_BEGIN} {c}\n\
Subject that\n\
wrapped\n\
Carol <carol@example.com>\n\
2024-03-02 08:30:00\n\
{RECORD_END}\n"
        );
        let records = parse_commit_records(&text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject, "Fix the parser");
        assert_eq!(records[0].author, "Alice <alice@example.com>");
        assert_eq!(records[0].date, "2024-03-01 12:00:00");
        assert_eq!(records[1].id.as_str(), c);
        assert_eq!(records[1].subject, "Subject that wrapped");
    }

    #[test]
    fn test_parse_commit_records_unterminated() {
        let a = "a".repeat(40);
        let text = format!("{RECORD_BEGIN} {a}\nsubject\nauthor\n2024-01-01 00:00:00\n");
        assert!(parse_commit_records(&text).is_empty());
    }
}
