//! Conflict content extraction.
//!
//! For each conflicting path the target-side text of every conflict region is
//! recovered through an ordered chain, stopping at the first step that yields
//! any lines:
//!
//! 1. direct reconstruction from the base, source, and target snapshots
//!    (a positional comparison when the base lacks the file, a synthesized
//!    three-way merge otherwise, then the added-lines fallback when that
//!    merge is clean);
//! 2. mining the legacy tree-merge report.
//!
//! Paths that produce nothing are dropped from attribution.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::config::MediateConfig;
use crate::conflict::locator::{ConflictLocator, ConflictScan};
use crate::conflict::merger::{self, Merger};
use crate::errors::{recover, MediateError};
use crate::git::parser;
use crate::git::GitOracle;
use crate::models::{BranchRef, CommitId, ConflictFile, ExtractionMethod};

pub struct ContentExtractor<'a> {
    git: &'a dyn GitOracle,
    config: &'a MediateConfig,
    /// Target-side lines per path from the legacy report, fetched at most
    /// once per run.
    legacy_lines: Option<BTreeMap<String, Vec<String>>>,
}

impl<'a> ContentExtractor<'a> {
    pub fn new(git: &'a dyn GitOracle, config: &'a MediateConfig) -> Self {
        Self {
            git,
            config,
            legacy_lines: None,
        }
    }

    /// Extract conflicting content for every path in `scan`, in scan order.
    #[instrument(skip(self, scan), fields(paths = scan.paths.len()))]
    pub fn extract_all(
        &mut self,
        scan: &ConflictScan,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<Vec<ConflictFile>, MediateError> {
        let Some(base) = scan.merge_base.as_ref() else {
            return Ok(Vec::new());
        };
        if let Some(sections) = &scan.legacy {
            self.legacy_lines = Some(parser::legacy_their_lines(sections));
        }

        let mut files = Vec::new();
        for path in &scan.paths {
            match self.extract(path, base, source, target)? {
                Some(file) => {
                    debug!(
                        path = %file.path,
                        method = %file.method,
                        lines = file.conflicting_lines.len(),
                        "extracted conflicting content"
                    );
                    files.push(file);
                }
                None => info!(path = %path, "no conflicting content recovered"),
            }
        }
        Ok(files)
    }

    /// Run the fallback chain for one path.
    pub fn extract(
        &mut self,
        path: &str,
        base: &CommitId,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<Option<ConflictFile>, MediateError> {
        if let Some((lines, method)) = self.reconstruct(path, base, source, target)? {
            return Ok(Some(ConflictFile {
                path: path.to_string(),
                conflicting_lines: lines,
                method,
            }));
        }

        let mined = self
            .legacy_lines(base, source, target)?
            .get(path)
            .cloned()
            .unwrap_or_default();
        if mined.is_empty() {
            return Ok(None);
        }
        Ok(Some(ConflictFile {
            path: path.to_string(),
            conflicting_lines: mined,
            method: ExtractionMethod::LegacyReport,
        }))
    }

    fn blob(&self, rev: &str, path: &str) -> Result<Option<String>, MediateError> {
        Ok(recover(self.git.show_blob(rev, path))?.flatten())
    }

    /// Step 1: rebuild the conflict from the three snapshots.
    fn reconstruct(
        &self,
        path: &str,
        base: &CommitId,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<Option<(Vec<String>, ExtractionMethod)>, MediateError> {
        let (Some(ours), Some(theirs)) = (
            self.blob(source.as_str(), path)?,
            self.blob(target.as_str(), path)?,
        ) else {
            debug!(path, "source or target snapshot unavailable");
            return Ok(None);
        };

        let Some(ancestor) = self.blob(base.as_str(), path)? else {
            let lines = merger::positional_differences(&ours, &theirs);
            return Ok((!lines.is_empty()).then_some((lines, ExtractionMethod::BothAdded)));
        };

        let merged = Merger::new(self.git).three_way_merge(&ancestor, &ours, &theirs)?;

        if merged.has_conflicts {
            let lines = merger::target_side_lines(&merged.merged_content);
            if !lines.is_empty() {
                return Ok(Some((lines, ExtractionMethod::ThreeWayMerge)));
            }
            return Ok(None);
        }

        // Clean at line level but conflicting at tree level.
        let lines = merger::added_lines(&ancestor, &theirs, self.config.fallback_line_limit);
        Ok((!lines.is_empty()).then_some((lines, ExtractionMethod::AddedLinesFallback)))
    }

    /// Step 2 source: legacy report lines, fetched lazily.
    fn legacy_lines(
        &mut self,
        base: &CommitId,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<&BTreeMap<String, Vec<String>>, MediateError> {
        if self.legacy_lines.is_none() {
            let sections = ConflictLocator::new(self.git).legacy_sections(base, source, target)?;
            self.legacy_lines = Some(parser::legacy_their_lines(&sections));
        }
        Ok(self.legacy_lines.get_or_insert_with(BTreeMap::new))
    }
}
