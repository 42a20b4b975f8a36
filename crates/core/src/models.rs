//! Domain model types used throughout git-mediate.
//!
//! These types bridge the oracle parsers, the attribution pipeline, and the
//! CLI's rendering of the final report.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::GitError;

// ---------------------------------------------------------------------------
// References and identifiers
// ---------------------------------------------------------------------------

/// An opaque name for a comparable snapshot: a branch, tag, or commit-ish.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchRef(String);

impl BranchRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a `source..target` range into its two ends.
    ///
    /// Returns `None` when the text is not a two-sided range. Three-dot
    /// ranges are not accepted since they name a symmetric difference, not a
    /// pair of snapshots.
    pub fn parse_range(spec: &str) -> Option<(BranchRef, BranchRef)> {
        if spec.contains("...") {
            return None;
        }
        let (source, target) = spec.split_once("..")?;
        if source.is_empty() || target.is_empty() {
            return None;
        }
        Some((BranchRef::new(source), BranchRef::new(target)))
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BranchRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A full, lowercase hexadecimal commit id (SHA-1 or SHA-256).
///
/// Validated once where oracle text is parsed; downstream code compares ids
/// without re-checking their shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Parse a full commit id, accepting surrounding whitespace and a leading
    /// `^` boundary marker as printed by some history queries.
    pub fn parse(token: &str) -> Result<Self, GitError> {
        let token = token.trim().trim_start_matches('^');
        let valid_len = token.len() == 40 || token.len() == 64;
        if valid_len && token.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(token.to_ascii_lowercase()))
        } else {
            Err(GitError::InvalidCommitId(token.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }

    /// The all-zero id git uses for "not committed yet".
    pub fn is_null(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommitId {
    type Error = GitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Which step of the extraction fallback chain produced a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Target side of the regions of a synthesized three-way merge.
    ThreeWayMerge,
    /// Positional comparison of a file added independently on both sides.
    BothAdded,
    /// Lines added on the target side, used when the file merges cleanly
    /// line-by-line but the tree merge still reported a conflict.
    AddedLinesFallback,
    /// Target side mined from the legacy tree-merge report.
    LegacyReport,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreeWayMerge => write!(f, "three-way merge"),
            Self::BothAdded => write!(f, "added on both sides"),
            Self::AddedLinesFallback => write!(f, "added lines"),
            Self::LegacyReport => write!(f, "legacy merge-tree report"),
        }
    }
}

/// The target-side text of every conflict region in one file.
///
/// Lines keep extraction order; duplicates are harmless because matching
/// later collapses them onto line numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictFile {
    pub path: String,
    pub conflicting_lines: Vec<String>,
    pub method: ExtractionMethod,
}

// ---------------------------------------------------------------------------
// Attribution
// ---------------------------------------------------------------------------

/// Per-line history of one file at one snapshot: 1-based line number to the
/// commit that last introduced that line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineAttribution {
    lines: BTreeMap<usize, CommitId>,
}

impl LineAttribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, line: usize, commit: CommitId) {
        self.lines.insert(line, commit);
    }

    pub fn get(&self, line: usize) -> Option<&CommitId> {
        self.lines.get(&line)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Keep only the given line numbers.
    pub fn restrict_to(&mut self, wanted: &BTreeSet<usize>) {
        self.lines.retain(|line, _| wanted.contains(line));
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &CommitId)> {
        self.lines.iter().map(|(line, id)| (*line, id))
    }
}

/// Display metadata for an attributed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: CommitId,
    /// Subject line, truncated for display.
    pub subject: String,
    /// `Name <email>`.
    pub author: String,
    /// `YYYY-MM-DD HH:MM:SS` in the author's timezone.
    pub date: String,
}

/// Attribution outcome for a single conflicting file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttribution {
    pub path: String,
    /// `None` when no extraction method produced any text (binary content,
    /// unrecognized report shape, missing snapshots).
    pub method: Option<ExtractionMethod>,
    pub conflicting_lines: Vec<String>,
    /// Candidate commits for this file before global filtering.
    pub commits: BTreeSet<CommitId>,
}

/// The result of one attribution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionReport {
    pub source: BranchRef,
    pub target: BranchRef,
    pub merge_base: Option<CommitId>,
    /// Every structurally conflicting path, in locator order.
    pub files: Vec<String>,
    pub details: Vec<FileAttribution>,
    /// Commits that survived filtering, with their metadata.
    pub commits: BTreeMap<CommitId, CommitInfo>,
}

impl AttributionReport {
    /// An empty report (no conflicts, or nothing could be computed).
    pub fn empty(source: BranchRef, target: BranchRef) -> Self {
        Self {
            source,
            target,
            merge_base: None,
            files: Vec::new(),
            details: Vec::new(),
            commits: BTreeMap::new(),
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.files.is_empty()
    }

    /// Surviving commits ordered by date, oldest first, then by id.
    pub fn commits_by_date(&self) -> Vec<&CommitInfo> {
        let mut commits: Vec<&CommitInfo> = self.commits.values().collect();
        commits.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        commits
    }
}
