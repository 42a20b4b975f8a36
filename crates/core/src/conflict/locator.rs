//! Conflict location.
//!
//! Computes the merge base of the two branch tips and asks the tree-merge
//! oracle which paths would conflict. The modern `--write-tree` query runs
//! first; when it fails or prints something unrecognizable the legacy
//! three-tree report is requested instead. Whichever text is used, its shape
//! is probed and handed to the matching parser.

use tracing::{debug, info, instrument, warn};

use crate::errors::{recover, MediateError};
use crate::git::parser::{self, LegacySection, ReportShape};
use crate::git::GitOracle;
use crate::models::{BranchRef, CommitId};

/// Structurally conflicting paths for one source/target pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictScan {
    pub merge_base: Option<CommitId>,
    /// Conflicting paths in report order, without duplicates.
    pub paths: Vec<String>,
    /// Shape of the report the paths were read from.
    pub shape: ReportShape,
    /// Parsed legacy sections, when the legacy report was consulted.
    pub legacy: Option<Vec<LegacySection>>,
}

impl ConflictScan {
    fn empty(merge_base: Option<CommitId>) -> Self {
        Self {
            merge_base,
            paths: Vec::new(),
            shape: ReportShape::Empty,
            legacy: None,
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.paths.is_empty()
    }
}

/// Parse a tree-merge report with the parser its shape calls for.
///
/// Returns `None` for text neither parser understands.
pub fn dispatch_report(text: &str) -> Option<(ReportShape, Vec<String>, Option<Vec<LegacySection>>)> {
    match parser::probe_report_shape(text) {
        ReportShape::Empty => Some((ReportShape::Empty, Vec::new(), None)),
        ReportShape::Modern => Some((ReportShape::Modern, parser::parse_modern_report(text), None)),
        ReportShape::Legacy => {
            let sections = parser::parse_legacy_report(text);
            let paths = parser::legacy_conflict_paths(&sections);
            Some((ReportShape::Legacy, paths, Some(sections)))
        }
        ReportShape::Unrecognized => None,
    }
}

pub struct ConflictLocator<'a> {
    git: &'a dyn GitOracle,
}

impl<'a> ConflictLocator<'a> {
    pub fn new(git: &'a dyn GitOracle) -> Self {
        Self { git }
    }

    /// Find the paths that would conflict when merging `target` into `source`.
    ///
    /// A repository-level failure is fatal; any other oracle failure means
    /// there is nothing to report.
    #[instrument(skip(self), fields(source = %source, target = %target))]
    pub fn locate(&self, source: &BranchRef, target: &BranchRef) -> Result<ConflictScan, MediateError> {
        let Some(base) = recover(self.git.merge_base(source, target))? else {
            warn!("no merge base, nothing to compare");
            return Ok(ConflictScan::empty(None));
        };
        debug!(merge_base = %base, "merge base resolved");

        match recover(self.git.merge_tree_modern(&base, source, target))? {
            Some(text) => {
                if let Some((shape, paths, legacy)) = dispatch_report(&text) {
                    return Ok(self.finish(base, shape, paths, legacy));
                }
                debug!("unrecognized merge-tree output, retrying with the legacy report");
            }
            None => debug!("write-tree merge unavailable, using the legacy report"),
        }

        let Some(text) = recover(self.git.merge_tree_legacy(&base, source, target))? else {
            warn!("legacy merge-tree failed");
            return Ok(ConflictScan::empty(Some(base)));
        };

        match dispatch_report(&text) {
            Some((shape, paths, legacy)) => Ok(self.finish(base, shape, paths, legacy)),
            None => {
                warn!("merge-tree report not understood, treating as conflict-free");
                Ok(ConflictScan::empty(Some(base)))
            }
        }
    }

    fn finish(
        &self,
        base: CommitId,
        shape: ReportShape,
        paths: Vec<String>,
        legacy: Option<Vec<LegacySection>>,
    ) -> ConflictScan {
        info!(%shape, conflicts = paths.len(), "merge-tree report parsed");
        ConflictScan {
            merge_base: Some(base),
            paths,
            shape,
            legacy,
        }
    }

    /// Fetch and parse the legacy report on demand, for content mining.
    pub fn legacy_sections(
        &self,
        base: &CommitId,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<Vec<LegacySection>, MediateError> {
        let text = recover(self.git.merge_tree_legacy(base, source, target))?;
        Ok(text
            .map(|text| parser::parse_legacy_report(&text))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GitError;
    use crate::git::testing::ScriptedGit;

    const BASE: &str = "1111111111111111111111111111111111111111";

    const LEGACY: &str = "\
changed in both
  base   100644 1111111111111111111111111111111111111111 a.txt
  our    100644 2222222222222222222222222222222222222222 a.txt
  their  100644 3333333333333333333333333333333333333333 a.txt
@@ -1 +1,5 @@
+<<<<<<< .our
+ours
+=======
+theirs
+>>>>>>> .their
";

    const MODERN: &str = "\
2222222222222222222222222222222222222222
100644 aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa 1\tfile.txt
100644 bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb 2\tfile.txt

CONFLICT (content): Merge conflict in file.txt
";

    fn scripted() -> ScriptedGit {
        let mut git = ScriptedGit::new();
        git.ok("merge-base feature main", &format!("{BASE}\n"));
        git
    }

    #[test]
    fn test_modern_report() {
        let mut git = scripted();
        git.respond(
            &format!("merge-tree --write-tree --merge-base={BASE} feature main"),
            1,
            MODERN,
        );
        let scan = ConflictLocator::new(&git)
            .locate(&"feature".into(), &"main".into())
            .unwrap();
        assert_eq!(scan.shape, ReportShape::Modern);
        assert_eq!(scan.paths, vec!["file.txt".to_string()]);
        assert_eq!(scan.merge_base.unwrap().as_str(), BASE);
    }

    #[test]
    fn test_clean_modern_report() {
        let mut git = scripted();
        git.ok(
            &format!("merge-tree --write-tree --merge-base={BASE} feature main"),
            "2222222222222222222222222222222222222222\n",
        );
        let scan = ConflictLocator::new(&git)
            .locate(&"feature".into(), &"main".into())
            .unwrap();
        assert!(!scan.has_conflicts());
    }

    #[test]
    fn test_falls_back_to_legacy() {
        let mut git = scripted();
        git.respond(
            &format!("merge-tree --write-tree --merge-base={BASE} feature main"),
            129,
            "",
        );
        git.ok(&format!("merge-tree {BASE} feature main"), LEGACY);
        let scan = ConflictLocator::new(&git)
            .locate(&"feature".into(), &"main".into())
            .unwrap();
        assert_eq!(scan.shape, ReportShape::Legacy);
        assert_eq!(scan.paths, vec!["a.txt".to_string()]);
        assert!(scan.legacy.is_some());
    }

    #[test]
    fn test_legacy_binary_conflict_listed() {
        let mut git = scripted();
        git.respond(
            &format!("merge-tree --write-tree --merge-base={BASE} feature main"),
            129,
            "",
        );
        git.ok(
            &format!("merge-tree {BASE} feature main"),
            "changed in both\n  base   100644 1111111111111111111111111111111111111111 image.bin\n  our    100644 2222222222222222222222222222222222222222 image.bin\n  their  100644 3333333333333333333333333333333333333333 image.bin\n",
        );
        let scan = ConflictLocator::new(&git)
            .locate(&"feature".into(), &"main".into())
            .unwrap();
        assert_eq!(scan.shape, ReportShape::Legacy);
        assert_eq!(scan.paths, vec!["image.bin".to_string()]);
    }

    #[test]
    fn test_silent_oracle_means_no_conflicts() {
        let mut git = scripted();
        git.respond(
            &format!("merge-tree --write-tree --merge-base={BASE} feature main"),
            129,
            "",
        );
        git.ok(&format!("merge-tree {BASE} feature main"), "");
        let scan = ConflictLocator::new(&git)
            .locate(&"feature".into(), &"main".into())
            .unwrap();
        assert_eq!(scan.shape, ReportShape::Empty);
        assert!(scan.paths.is_empty());
    }

    #[test]
    fn test_missing_merge_base_is_not_fatal() {
        let git = ScriptedGit::new();
        let scan = ConflictLocator::new(&git)
            .locate(&"feature".into(), &"main".into())
            .unwrap();
        assert!(scan.merge_base.is_none());
        assert!(!scan.has_conflicts());
    }

    #[test]
    fn test_not_a_repository_is_fatal() {
        let mut git = ScriptedGit::new();
        git.fail_with(
            "merge-base feature main",
            GitError::NotARepository("fatal: not a git repository".into()),
        );
        let err = ConflictLocator::new(&git)
            .locate(&"feature".into(), &"main".into())
            .unwrap_err();
        assert!(matches!(err, MediateError::NotARepository(_)));
    }

    #[test]
    fn test_dispatch_rejects_unknown_text() {
        assert!(dispatch_report("something else entirely\n").is_none());
    }
}
