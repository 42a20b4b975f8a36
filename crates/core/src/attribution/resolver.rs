//! Line attribution.
//!
//! Maps the extracted target-side lines back to line numbers in the target
//! branch's copy of the file, then asks blame which commit last introduced
//! each of those lines. When source-side blame is consulted, a line only
//! counts if the two sides disagree about its origin.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, instrument};

use crate::config::MediateConfig;
use crate::errors::{recover, MediateError};
use crate::git::parser;
use crate::git::GitOracle;
use crate::models::{BranchRef, CommitId, ConflictFile, LineAttribution};

/// 1-based line numbers of `content` whose trimmed text equals one of the
/// trimmed `conflicting` lines. Lines shorter than `min_len` characters after
/// trimming never match.
pub fn match_lines(content: &str, conflicting: &[String], min_len: usize) -> BTreeSet<usize> {
    let wanted: HashSet<&str> = conflicting
        .iter()
        .map(|l| l.trim())
        .filter(|l| l.chars().count() >= min_len)
        .collect();
    if wanted.is_empty() {
        return BTreeSet::new();
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| wanted.contains(line.trim()))
        .map(|(idx, _)| idx + 1)
        .collect()
}

/// Commits from `target` whose lines diverge from `source` at the same
/// position. Without source data every target commit is kept.
pub fn divergent_commits(
    target: &LineAttribution,
    source: Option<&LineAttribution>,
) -> BTreeSet<CommitId> {
    target
        .iter()
        .filter(|(line, id)| match source.and_then(|s| s.get(*line)) {
            Some(source_id) => source_id != *id,
            None => true,
        })
        .map(|(_, id)| id.clone())
        .collect()
}

pub struct LineResolver<'a> {
    git: &'a dyn GitOracle,
    config: &'a MediateConfig,
}

impl<'a> LineResolver<'a> {
    pub fn new(git: &'a dyn GitOracle, config: &'a MediateConfig) -> Self {
        Self { git, config }
    }

    /// Candidate commits for one conflicting file.
    #[instrument(skip(self, file), fields(path = %file.path))]
    pub fn resolve(
        &self,
        file: &ConflictFile,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<BTreeSet<CommitId>, MediateError> {
        let content = recover(self.git.show_blob(target.as_str(), &file.path))?.flatten();
        let Some(content) = content else {
            debug!("target content unavailable");
            return Ok(BTreeSet::new());
        };

        let matched = match_lines(&content, &file.conflicting_lines, self.config.min_line_length);
        if matched.is_empty() {
            debug!("no conflicting line found verbatim in target content");
            return Ok(BTreeSet::new());
        }

        let Some(target_blame) = self.blame(target, &file.path, &matched)? else {
            return Ok(BTreeSet::new());
        };
        let source_blame = if self.config.compare_source_blame {
            self.blame(source, &file.path, &matched)?
        } else {
            None
        };

        let commits = divergent_commits(&target_blame, source_blame.as_ref());
        debug!(
            matched = matched.len(),
            attributed = target_blame.len(),
            commits = commits.len(),
            "resolved line attribution"
        );
        Ok(commits)
    }

    fn blame(
        &self,
        rev: &BranchRef,
        path: &str,
        lines: &BTreeSet<usize>,
    ) -> Result<Option<LineAttribution>, MediateError> {
        let Some(text) = recover(self.git.blame(rev, path))? else {
            debug!(rev = %rev, "blame unavailable");
            return Ok(None);
        };
        let mut attribution = parser::parse_blame_porcelain(&text);
        attribution.restrict_to(lines);
        Ok(Some(attribution))
    }
}
