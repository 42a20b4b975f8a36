//! git-mediate core library.
//!
//! Predicts which commits on a target branch cause the textual conflicts a
//! merge with the current branch would produce: conflict location, conflict
//! content extraction, line attribution, commit filtering, and commit
//! metadata lookup, all driven through a read-only `git` oracle.

pub mod attribution;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod errors;
pub mod git;
pub mod models;

// Re-exports for convenience.
pub use config::{FilterPolicy, MediateConfig};
pub use engine::MediateEngine;
pub use errors::MediateError;
pub use git::{GitCli, GitOracle};
pub use models::{AttributionReport, BranchRef, CommitId, CommitInfo};
