//! Commit filtering.
//!
//! Removes candidates that say nothing about who caused a conflict: merge
//! commits always, and under the strict policy also commits that the source
//! branch already contains.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use crate::config::FilterPolicy;
use crate::errors::{recover, MediateError};
use crate::git::parser;
use crate::git::GitOracle;
use crate::models::{BranchRef, CommitId};

pub struct CommitFilter<'a> {
    git: &'a dyn GitOracle,
    policy: FilterPolicy,
}

impl<'a> CommitFilter<'a> {
    pub fn new(git: &'a dyn GitOracle, policy: FilterPolicy) -> Self {
        Self { git, policy }
    }

    /// Candidates that survive the configured policy.
    #[instrument(skip(self, candidates), fields(policy = %self.policy, candidates = candidates.len()))]
    pub fn apply(
        &self,
        candidates: &BTreeSet<CommitId>,
        source: &BranchRef,
    ) -> Result<BTreeSet<CommitId>, MediateError> {
        if candidates.is_empty() {
            return Ok(BTreeSet::new());
        }

        let excluded = self.merge_commits(candidates)?;
        let mut survivors: BTreeSet<CommitId> = candidates.difference(&excluded).cloned().collect();

        if self.policy.excludes_source_commits() {
            let mut contained = Vec::new();
            for id in &survivors {
                // Failure counts as "not contained".
                if recover(self.git.is_ancestor(id, source))?.unwrap_or(false) {
                    contained.push(id.clone());
                }
            }
            for id in &contained {
                debug!(commit = %id, "dropping commit already in source history");
                survivors.remove(id);
            }
        }

        info!(
            kept = survivors.len(),
            dropped = candidates.len() - survivors.len(),
            "filtered candidate commits"
        );
        Ok(survivors)
    }

    /// Merge commits among `candidates`, plus any commit whose parent count
    /// could not be determined.
    fn merge_commits(&self, candidates: &BTreeSet<CommitId>) -> Result<BTreeSet<CommitId>, MediateError> {
        let ids: Vec<CommitId> = candidates.iter().cloned().collect();
        if let Some(text) = recover(self.git.merge_commits_among(&ids))? {
            let merges: BTreeSet<CommitId> = parser::parse_commit_list(&text)
                .into_iter()
                .filter(|id| candidates.contains(id))
                .collect();
            debug!(merges = merges.len(), "batch merge check");
            return Ok(merges);
        }

        warn!("batch merge check failed, checking parents one by one");
        let mut excluded = BTreeSet::new();
        for id in candidates {
            match recover(self.git.parent_count(id))? {
                Some(parents) if parents <= 1 => {}
                Some(_) => {
                    excluded.insert(id.clone());
                }
                None => {
                    debug!(commit = %id, "parent count unavailable, suppressing commit");
                    excluded.insert(id.clone());
                }
            }
        }
        Ok(excluded)
    }
}
