//! Three-way merge synthesis and conflict-region capture.
//!
//! The line-level merge is asked of the oracle first (`git merge-file`); if
//! that call fails for any non-fatal reason the `diffy` crate performs the
//! same merge in-process. Either way the merged text carries standard
//! `<<<<<<<` / `=======` / `>>>>>>>` markers, from which only the target
//! ("theirs") side of every region is kept.

use tracing::{debug, warn};

use crate::errors::{recover, MediateError};
use crate::git::GitOracle;

/// The result of a three-way merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// The merged content (contains conflict markers if `has_conflicts` is true).
    pub merged_content: String,
    pub has_conflicts: bool,
}

impl MergeResult {
    fn clean(content: &str) -> Self {
        Self {
            merged_content: content.to_string(),
            has_conflicts: false,
        }
    }
}

/// Three-way merge engine bound to an oracle.
pub struct Merger<'a> {
    git: &'a dyn GitOracle,
}

impl<'a> Merger<'a> {
    pub fn new(git: &'a dyn GitOracle) -> Self {
        Self { git }
    }

    /// Merge `ours` (source) and `theirs` (target) against `base`.
    ///
    /// Only a fatal oracle failure is returned as an error; anything else
    /// falls back to the in-process merge.
    pub fn three_way_merge(
        &self,
        base: &str,
        ours: &str,
        theirs: &str,
    ) -> Result<MergeResult, MediateError> {
        if theirs == base {
            debug!("theirs == base, ours wins cleanly");
            return Ok(MergeResult::clean(ours));
        }
        if ours == base || ours == theirs {
            debug!("ours unchanged or identical to theirs, theirs wins cleanly");
            return Ok(MergeResult::clean(theirs));
        }

        match recover(self.git.merge_file(ours, base, theirs))? {
            Some(output) => {
                debug!(conflicts = output.conflicts, "merge-file finished");
                Ok(MergeResult {
                    merged_content: output.merged,
                    has_conflicts: output.conflicts > 0,
                })
            }
            None => {
                warn!("merge-file unavailable, merging in-process");
                Ok(merge_in_process(base, ours, theirs))
            }
        }
    }
}

/// Line-level three-way merge with `diffy`.
pub fn merge_in_process(base: &str, ours: &str, theirs: &str) -> MergeResult {
    match diffy::merge(base, ours, theirs) {
        Ok(merged) => MergeResult {
            merged_content: merged,
            has_conflicts: false,
        },
        Err(conflicted) => MergeResult {
            merged_content: conflicted,
            has_conflicts: true,
        },
    }
}

// ---------------------------------------------------------------------------
// Region capture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionState {
    Outside,
    Ours,
    Base,
    Theirs,
}

fn marker_line(line: &str, marker: &str) -> bool {
    match line.strip_prefix(marker) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

/// Lines between the separator and end marker of every conflict region.
///
/// Both the plain and the diff3 (`|||||||`) region layouts are accepted.
pub fn target_side_lines(merged: &str) -> Vec<String> {
    let mut state = RegionState::Outside;
    let mut captured = Vec::new();

    for line in merged.lines() {
        state = match state {
            RegionState::Outside if marker_line(line, "<<<<<<<") => RegionState::Ours,
            RegionState::Ours if marker_line(line, "|||||||") => RegionState::Base,
            RegionState::Ours | RegionState::Base if marker_line(line, "=======") => {
                RegionState::Theirs
            }
            RegionState::Theirs if marker_line(line, ">>>>>>>") => RegionState::Outside,
            RegionState::Theirs => {
                captured.push(line.to_string());
                RegionState::Theirs
            }
            other => other,
        };
    }
    captured
}

/// Non-blank lines added between `base` and `target`, at most `limit`.
pub fn added_lines(base: &str, target: &str, limit: usize) -> Vec<String> {
    let patch = diffy::create_patch(base, target);
    let added: Vec<String> = patch
        .hunks()
        .iter()
        .flat_map(|hunk| hunk.lines())
        .filter_map(|line| match line {
            diffy::Line::Insert(text) => Some(text.trim_end_matches(['\n', '\r'])),
            _ => None,
        })
        .filter(|text| !text.trim().is_empty())
        .take(limit)
        .map(str::to_string)
        .collect();
    added
}

/// Target lines that differ from the source line at the same position.
///
/// Used when a file was added independently on both sides and there is no
/// base to merge against.
pub fn positional_differences(source: &str, target: &str) -> Vec<String> {
    let source_lines: Vec<&str> = source.lines().collect();
    target
        .lines()
        .enumerate()
        .filter(|(idx, line)| source_lines.get(*idx) != Some(line) && !line.trim().is_empty())
        .map(|(_, line)| line.to_string())
        .collect()
}
