//! Commit metadata for the final report.
//!
//! All surviving ids are resolved in a single framed `git log` query. If that
//! query fails as a whole (one bad id is enough), each id is retried on its
//! own so the rest still get their metadata.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument, warn};

use crate::errors::{recover, MediateError};
use crate::git::parser::{self, CommitRecord};
use crate::git::GitOracle;
use crate::models::{CommitId, CommitInfo};

/// Marker appended to a shortened subject.
const ELLIPSIS: &str = "...";

/// Cut `subject` to `max_len` characters, ending in `...` when shortened.
pub fn truncate_subject(subject: &str, max_len: usize) -> String {
    if subject.chars().count() <= max_len {
        return subject.to_string();
    }
    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let mut out: String = subject.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

pub struct DetailFetcher<'a> {
    git: &'a dyn GitOracle,
    subject_max_len: usize,
}

impl<'a> DetailFetcher<'a> {
    pub fn new(git: &'a dyn GitOracle, subject_max_len: usize) -> Self {
        Self { git, subject_max_len }
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn fetch(&self, ids: &BTreeSet<CommitId>) -> Result<BTreeMap<CommitId, CommitInfo>, MediateError> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let batch: Vec<CommitId> = ids.iter().cloned().collect();
        let records = match recover(self.git.commit_details(&batch))? {
            Some(text) => parser::parse_commit_records(&text),
            None => {
                warn!("batch commit lookup failed, retrying per commit");
                let mut records = Vec::new();
                for id in ids {
                    if let Some(text) = recover(self.git.commit_details(std::slice::from_ref(id)))? {
                        records.extend(parser::parse_commit_records(&text));
                    }
                }
                records
            }
        };

        let mut details = BTreeMap::new();
        for record in records {
            if !ids.contains(&record.id) {
                debug!(commit = %record.id, "ignoring unrequested record");
                continue;
            }
            let info = self.to_info(record);
            details.insert(info.id.clone(), info);
        }
        for id in ids.iter().filter(|id| !details.contains_key(*id)) {
            debug!(commit = %id, "no metadata found, dropping commit");
        }
        Ok(details)
    }

    fn to_info(&self, record: CommitRecord) -> CommitInfo {
        CommitInfo {
            subject: truncate_subject(&record.subject, self.subject_max_len),
            id: record.id,
            author: record.author,
            date: record.date,
        }
    }
}
