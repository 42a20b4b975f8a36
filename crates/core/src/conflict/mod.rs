//! Conflict location and content extraction.
//!
//! 1. **Location**: merge base plus tree-merge report, giving conflicting paths.
//! 2. **Merging**: line-level three-way merge of the file snapshots.
//! 3. **Extraction**: the target-side text of each conflict region.

pub mod extractor;
pub mod locator;
pub mod merger;

pub use extractor::ContentExtractor;
pub use locator::{ConflictLocator, ConflictScan};
pub use merger::{MergeResult, Merger};
