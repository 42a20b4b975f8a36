//! Engine configuration.
//!
//! [`MediateConfig`] is a plain value handed to the engine; nothing in the
//! library reads process-wide toggles. Every field has a default, so an empty
//! TOML document (or no file at all) yields a usable configuration. The CLI
//! only loads a file when one is passed explicitly.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Filter policy
// ---------------------------------------------------------------------------

/// How strictly candidate commits are filtered before reporting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Drop merge commits and commits already contained in the source branch.
    #[default]
    Strict,
    /// Drop merge commits only; keep commits that are also upstream.
    MergesOnly,
}

impl FilterPolicy {
    pub fn excludes_source_commits(self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl std::fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::MergesOnly => write!(f, "merges_only"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Tunables for one attribution run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MediateConfig {
    /// Executable used for every oracle query.
    pub git_binary: String,

    /// Commit filter strictness.
    pub filter_policy: FilterPolicy,

    /// Compare target-side blame against source-side blame at the same line
    /// numbers; when off, every matched target line is attributable.
    pub compare_source_blame: bool,

    /// Normalized conflicting lines shorter than this are too ambiguous to
    /// match against the target file.
    pub min_line_length: usize,

    /// Cap on lines taken by the added-lines fallback.
    pub fallback_line_limit: usize,

    /// Display length for commit subjects, including the `...` marker.
    pub subject_max_len: usize,

    /// Default tracing filter used by the CLI.
    pub log_level: String,
}

impl Default for MediateConfig {
    fn default() -> Self {
        Self {
            git_binary: "git".into(),
            filter_policy: FilterPolicy::default(),
            compare_source_blame: true,
            min_line_length: 3,
            fallback_line_limit: 20,
            subject_max_len: 80,
            log_level: "warn".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl MediateConfig {
    /// Load a [`MediateConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        debug!(?config, "configuration parsed successfully");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration for obvious errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.git_binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git_binary".into(),
                detail: "must not be empty".into(),
            });
        }
        if self.min_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_line_length".into(),
                detail: "must be at least 1".into(),
            });
        }
        if self.fallback_line_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fallback_line_limit".into(),
                detail: "must be at least 1".into(),
            });
        }
        if self.subject_max_len < 4 {
            return Err(ConfigError::InvalidValue {
                field: "subject_max_len".into(),
                detail: "must be at least 4 to fit the truncation marker".into(),
            });
        }
        Ok(())
    }

    /// Load from `path` and validate in one step.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}
