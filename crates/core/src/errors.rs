//! Error types for the git-mediate core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`MediateError`] enum unifies them for callers of the engine.
//!
//! Only a small part of this taxonomy ever escapes [`crate::engine::MediateEngine::attribute`]:
//! an unresolvable repository is fatal, while every other oracle failure is
//! recovered locally as "no data" by the component that issued the query.

use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the attribution engine.
#[derive(Debug, Error)]
pub enum MediateError {
    /// The working directory is not inside a repository. The message is the
    /// oracle's own text, surfaced verbatim.
    #[error("{0}")]
    NotARepository(String),

    /// A branch reference given by the caller does not resolve to a commit.
    #[error("error: unknown revision '{0}'")]
    UnknownRef(String),

    /// Source and target name the same reference.
    #[error("Current branch and target branch are the same ({0}).")]
    SameRef(String),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Git oracle errors
// ---------------------------------------------------------------------------

/// Errors from invoking the `git` executable.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// git refused to run because the directory is not a repository.
    #[error("{0}")]
    NotARepository(String),

    /// A `git` command exited with an unexpected status.
    #[error("git command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// A token that should have been a full commit id was not one.
    #[error("invalid commit id: '{0}'")]
    InvalidCommitId(String),

    /// Command output was expected to be text but was not valid UTF-8.
    #[error("git produced non-UTF-8 output")]
    NonUtf8Output,

    /// Generic I/O wrapper (spawning, temporary files).
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GitError {
    /// `true` when this failure must halt the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotARepository(_) | Self::BinaryNotFound(_))
    }

    /// Convert a fatal failure into the engine-level error, or `None` when
    /// the failure is recoverable as "no data".
    pub fn escalate(self) -> Option<MediateError> {
        match self {
            Self::NotARepository(msg) => Some(MediateError::NotARepository(msg)),
            err @ Self::BinaryNotFound(_) => Some(MediateError::Git(err)),
            _ => None,
        }
    }
}

/// Keep fatal oracle failures and turn every other one into "no data".
pub fn recover<T>(result: Result<T, GitError>) -> Result<Option<T>, MediateError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let detail = e.to_string();
            match e.escalate() {
                Some(fatal) => Err(fatal),
                None => {
                    debug!(error = %detail, "oracle query failed, treating as no data");
                    Ok(None)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitError::CommandFailed {
            exit_code: 128,
            stderr: "fatal: bad object".into(),
        };
        assert_eq!(
            err.to_string(),
            "git command failed (exit 128): fatal: bad object"
        );

        let err = MediateError::SameRef("main".into());
        assert_eq!(
            err.to_string(),
            "Current branch and target branch are the same (main)."
        );

        let err = MediateError::UnknownRef("nope".into());
        assert!(err.to_string().contains("error"));

        let err = ConfigError::InvalidValue {
            field: "subject_max_len".into(),
            detail: "must be at least 4".into(),
        };
        assert!(err.to_string().contains("subject_max_len"));
    }

    #[test]
    fn test_not_a_repository_is_verbatim() {
        let msg = "fatal: not a git repository (or any of the parent directories): .git";
        let err = MediateError::NotARepository(msg.into());
        assert_eq!(err.to_string(), msg);
    }

    #[test]
    fn test_fatal_classification() {
        assert!(GitError::NotARepository("x".into()).is_fatal());
        assert!(GitError::BinaryNotFound("git".into()).is_fatal());
        assert!(!GitError::NonUtf8Output.is_fatal());

        let escalated = GitError::NotARepository("x".into()).escalate();
        assert!(matches!(escalated, Some(MediateError::NotARepository(_))));

        let recovered = GitError::CommandFailed {
            exit_code: 1,
            stderr: String::new(),
        }
        .escalate();
        assert!(recovered.is_none());
    }

    #[test]
    fn test_recover() {
        let ok: Result<u8, GitError> = Ok(7);
        assert_eq!(recover(ok).unwrap(), Some(7));

        let soft: Result<u8, GitError> = Err(GitError::NonUtf8Output);
        assert_eq!(recover(soft).unwrap(), None);

        let hard: Result<u8, GitError> = Err(GitError::NotARepository("fatal".into()));
        assert!(matches!(recover(hard), Err(MediateError::NotARepository(_))));
    }
}
