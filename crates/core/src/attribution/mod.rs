//! Commit attribution for conflicting lines.
//!
//! - [`resolver`]: conflicting text to line numbers to blamed commits.
//! - [`filter`]: drops merge commits and, under the strict policy, commits
//!   already in the source branch.
//! - [`details`]: batched subject/author/date lookup for the survivors.

pub mod details;
pub mod filter;
pub mod resolver;

pub use details::{truncate_subject, DetailFetcher};
pub use filter::CommitFilter;
pub use resolver::LineResolver;
