//! Conflict attribution engine.
//!
//! [`MediateEngine::attribute`] runs one sequential pipeline:
//!
//! 1. Locate conflicting paths (merge base + tree merge).
//! 2. Extract the target-side lines of every conflict region.
//! 3. Resolve those lines to the target commits that introduced them.
//! 4. Filter the global candidate set (merges, source-contained commits).
//! 5. Fetch display metadata for the survivors.
//!
//! Only a repository-level failure aborts a run; every other oracle failure
//! narrows the result instead.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info, instrument};

use crate::attribution::{CommitFilter, DetailFetcher, LineResolver};
use crate::config::MediateConfig;
use crate::conflict::{ConflictLocator, ContentExtractor};
use crate::errors::{GitError, MediateError};
use crate::git::GitOracle;
use crate::models::{AttributionReport, BranchRef, CommitId, FileAttribution};

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

/// Stages of one attribution run, used for progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Locating,
    Extracting,
    Attributing,
    Filtering,
    Describing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locating => write!(f, "locating"),
            Self::Extracting => write!(f, "extracting"),
            Self::Attributing => write!(f, "attributing"),
            Self::Filtering => write!(f, "filtering"),
            Self::Describing => write!(f, "describing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Predicts which target-branch commits cause merge conflicts.
pub struct MediateEngine<O: GitOracle> {
    git: O,
    config: MediateConfig,
}

/// Repository-level failures keep their own variant; the rest wrap as-is.
fn usage_error(err: GitError) -> MediateError {
    match err {
        GitError::NotARepository(msg) => MediateError::NotARepository(msg),
        other => MediateError::Git(other),
    }
}

impl<O: GitOracle> MediateEngine<O> {
    pub fn new(git: O, config: MediateConfig) -> Self {
        Self { git, config }
    }

    pub fn oracle(&self) -> &O {
        &self.git
    }

    /// Root of the working tree, or the oracle's "not a repository" message.
    pub fn ensure_repository(&self) -> Result<PathBuf, MediateError> {
        self.git.toplevel().map_err(usage_error)
    }

    /// The checked-out branch, used as the default source.
    pub fn current_branch(&self) -> Result<BranchRef, MediateError> {
        self.git.current_branch().map_err(usage_error)
    }

    /// Reject identical refs and refs that do not name a commit.
    pub fn check_refs(&self, source: &BranchRef, target: &BranchRef) -> Result<(), MediateError> {
        if source == target {
            return Err(MediateError::SameRef(source.to_string()));
        }
        for reference in [source, target] {
            self.resolve(reference)?;
        }
        Ok(())
    }

    fn resolve(&self, reference: &BranchRef) -> Result<CommitId, MediateError> {
        self.git.resolve_commit(reference).map_err(|e| match e.escalate() {
            Some(fatal) => fatal,
            None => MediateError::UnknownRef(reference.to_string()),
        })
    }

    /// Attribute the conflicts of merging `target` into `source`.
    #[instrument(skip(self), fields(source = %source, target = %target))]
    pub fn attribute(
        &self,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<AttributionReport, MediateError> {
        self.check_refs(source, target)?;
        let git: &dyn GitOracle = &self.git;
        let mut report = AttributionReport::empty(source.clone(), target.clone());

        info!(stage = %Stage::Locating, "starting attribution run");
        let scan = ConflictLocator::new(git).locate(source, target)?;
        report.merge_base = scan.merge_base.clone();
        report.files = scan.paths.clone();
        if !scan.has_conflicts() {
            info!("no conflicting files");
            return Ok(report);
        }

        info!(stage = %Stage::Extracting, files = scan.paths.len());
        let extracted = ContentExtractor::new(git, &self.config).extract_all(&scan, source, target)?;

        info!(stage = %Stage::Attributing, files = extracted.len());
        let resolver = LineResolver::new(git, &self.config);
        let mut candidates: BTreeSet<CommitId> = BTreeSet::new();
        for path in &scan.paths {
            let detail = match extracted.iter().find(|f| &f.path == path) {
                Some(file) => {
                    let commits = resolver.resolve(file, source, target)?;
                    candidates.extend(commits.iter().cloned());
                    FileAttribution {
                        path: path.clone(),
                        method: Some(file.method),
                        conflicting_lines: file.conflicting_lines.clone(),
                        commits,
                    }
                }
                None => FileAttribution {
                    path: path.clone(),
                    method: None,
                    conflicting_lines: Vec::new(),
                    commits: BTreeSet::new(),
                },
            };
            debug!(path = %detail.path, commits = detail.commits.len(), "file attributed");
            report.details.push(detail);
        }

        info!(stage = %Stage::Filtering, candidates = candidates.len());
        let survivors = CommitFilter::new(git, self.config.filter_policy).apply(&candidates, source)?;

        info!(stage = %Stage::Describing, commits = survivors.len());
        report.commits = DetailFetcher::new(git, self.config.subject_max_len).fetch(&survivors)?;

        info!(
            files = report.files.len(),
            commits = report.commits.len(),
            "attribution run complete"
        );
        Ok(report)
    }
}
