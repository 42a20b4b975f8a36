//! Synchronous `git` CLI oracle.
//!
//! Every query the engine makes goes through [`GitOracle::exec`]: one
//! complete request/response per call, no streaming, nothing pooled. The
//! provided methods name the fixed plumbing vocabulary and return raw text;
//! interpreting that text is the job of [`crate::git::parser`].

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, instrument, warn};

use crate::errors::GitError;
use crate::models::{BranchRef, CommitId};

/// Start/end tokens framing each record of [`GitOracle::commit_details`].
pub const RECORD_BEGIN: &str = "@@mediate-begin@@";
pub const RECORD_END: &str = "@@mediate-end@@";

const NULL_DEVICE: &str = if cfg!(windows) { "NUL" } else { "/dev/null" };

/// Environment applied to every invocation so output does not depend on the
/// caller's identity, signing setup, or global/system configuration.
const ISOLATED_ENV: &[(&str, &str)] = &[
    ("GIT_CONFIG_NOSYSTEM", "1"),
    ("GIT_CONFIG_GLOBAL", NULL_DEVICE),
    ("GIT_AUTHOR_NAME", "git-mediate"),
    ("GIT_AUTHOR_EMAIL", "git-mediate@localhost"),
    ("GIT_COMMITTER_NAME", "git-mediate"),
    ("GIT_COMMITTER_EMAIL", "git-mediate@localhost"),
    ("GIT_TERMINAL_PROMPT", "0"),
    ("GIT_PAGER", "cat"),
    ("GIT_OPTIONAL_LOCKS", "0"),
    ("LC_ALL", "C"),
    ("LANGUAGE", "C"),
];

/// Per-invocation config overrides placed before the subcommand.
const ISOLATED_CONFIG: &[&str] = &[
    "-c",
    "commit.gpgsign=false",
    "-c",
    "log.showSignature=false",
    "-c",
    "core.quotepath=false",
    "-c",
    "color.ui=never",
    "-c",
    "merge.conflictStyle=merge",
    "-c",
    "blame.ignoreRevsFile=",
];

/// Captured result of one `git` invocation.
#[derive(Debug, Clone, Default)]
pub struct GitOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout as text, failing on invalid UTF-8.
    pub fn into_text(self) -> Result<String, GitError> {
        String::from_utf8(self.stdout).map_err(|_| GitError::NonUtf8Output)
    }

    /// Stdout as text with invalid sequences replaced.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    fn into_failure(self) -> GitError {
        GitError::CommandFailed {
            exit_code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        }
    }
}

/// Result of a file-level three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFileOutput {
    /// Merged text, with conflict markers when `conflicts > 0`.
    pub merged: String,
    pub conflicts: usize,
}

/// A queryable version-control oracle.
///
/// Implementors only supply [`exec`](Self::exec). It returns `Err` when the
/// command could not run at all or when git reports that the directory is
/// not a repository; any other non-zero exit is handed back in
/// [`GitOutput::exit_code`] for the caller to interpret.
pub trait GitOracle {
    fn exec(&self, args: &[&str]) -> Result<GitOutput, GitError>;

    /// Run a command that must exit 0 and print text.
    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.exec(args)?;
        if !output.success() {
            return Err(output.into_failure());
        }
        output.into_text()
    }

    /// Absolute path of the working tree root.
    fn toplevel(&self) -> Result<PathBuf, GitError> {
        let out = self.run(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Short name of the checked-out branch (`HEAD` when detached).
    fn current_branch(&self) -> Result<BranchRef, GitError> {
        let out = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(BranchRef::new(out.trim()))
    }

    /// Resolve a reference to the commit it names.
    fn resolve_commit(&self, reference: &BranchRef) -> Result<CommitId, GitError> {
        let spec = format!("{}^{{commit}}", reference.as_str());
        let out = self.run(&["rev-parse", "--verify", "--quiet", "--end-of-options", &spec])?;
        CommitId::parse(&out)
    }

    fn merge_base(&self, one: &BranchRef, two: &BranchRef) -> Result<CommitId, GitError> {
        let out = self.run(&["merge-base", one.as_str(), two.as_str()])?;
        CommitId::parse(out.lines().next().unwrap_or_default())
    }

    /// Tree-level merge in the `--write-tree` report shape. Exit status 0
    /// means clean, 1 means conflicted; anything else is a failure.
    fn merge_tree_modern(
        &self,
        base: &CommitId,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<String, GitError> {
        let base_arg = format!("--merge-base={}", base.as_str());
        let output = self.exec(&[
            "merge-tree",
            "--write-tree",
            &base_arg,
            source.as_str(),
            target.as_str(),
        ])?;
        match output.exit_code {
            0 | 1 => Ok(output.text_lossy()),
            _ => Err(output.into_failure()),
        }
    }

    /// Trivial three-tree merge in the legacy report shape.
    fn merge_tree_legacy(
        &self,
        base: &CommitId,
        source: &BranchRef,
        target: &BranchRef,
    ) -> Result<String, GitError> {
        let output = self.exec(&["merge-tree", base.as_str(), source.as_str(), target.as_str()])?;
        if !output.success() {
            return Err(output.into_failure());
        }
        Ok(output.text_lossy())
    }

    /// Full content of `path` at `rev`.
    ///
    /// `Ok(None)` when the path does not exist at that snapshot or the blob
    /// is not decodable text.
    fn show_blob(&self, rev: &str, path: &str) -> Result<Option<String>, GitError> {
        let spec = format!("{rev}:{path}");
        let output = self.exec(&["cat-file", "blob", &spec])?;
        if !output.success() {
            debug!(rev, path, stderr = %output.stderr.trim(), "blob not available");
            return Ok(None);
        }
        Ok(decode_text(output.stdout))
    }

    /// Line-level three-way merge of `ours` and `theirs` against `base`.
    ///
    /// The three snapshots are written to a private temporary directory;
    /// nothing in the repository is touched.
    fn merge_file(&self, ours: &str, base: &str, theirs: &str) -> Result<MergeFileOutput, GitError> {
        let dir = tempfile::tempdir()?;
        let ours_path = write_snapshot(dir.path(), "ours", ours)?;
        let base_path = write_snapshot(dir.path(), "base", base)?;
        let theirs_path = write_snapshot(dir.path(), "theirs", theirs)?;

        let output = self.exec(&[
            "merge-file",
            "-p",
            "-L",
            "ours",
            "-L",
            "base",
            "-L",
            "theirs",
            &ours_path,
            &base_path,
            &theirs_path,
        ])?;
        // A positive exit status is the number of conflicts (capped at 127);
        // negative statuses show up as >127.
        match usize::try_from(output.exit_code) {
            Ok(conflicts) if conflicts <= 127 => Ok(MergeFileOutput {
                merged: output.into_text()?,
                conflicts,
            }),
            _ => Err(output.into_failure()),
        }
    }

    /// Porcelain per-line history of `path` as of `rev`.
    fn blame(&self, rev: &BranchRef, path: &str) -> Result<String, GitError> {
        let output = self.exec(&["blame", "--porcelain", rev.as_str(), "--", path])?;
        if !output.success() {
            return Err(output.into_failure());
        }
        Ok(output.text_lossy())
    }

    /// The subset of `ids` that are merge commits, one id per line.
    fn merge_commits_among(&self, ids: &[CommitId]) -> Result<String, GitError> {
        let mut args = vec!["rev-list", "--merges", "--no-walk"];
        args.extend(ids.iter().map(CommitId::as_str));
        self.run(&args)
    }

    fn parent_count(&self, id: &CommitId) -> Result<usize, GitError> {
        let out = self.run(&["rev-list", "--parents", "-n", "1", id.as_str()])?;
        let tokens = out.split_whitespace().count();
        Ok(tokens.saturating_sub(1))
    }

    /// Whether `id` is reachable from `reference`.
    fn is_ancestor(&self, id: &CommitId, reference: &BranchRef) -> Result<bool, GitError> {
        let output = self.exec(&["merge-base", "--is-ancestor", id.as_str(), reference.as_str()])?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(output.into_failure()),
        }
    }

    /// Sentinel-framed subject/author/date records for `ids`, in the given
    /// order.
    fn commit_details(&self, ids: &[CommitId]) -> Result<String, GitError> {
        let format = format!("--format={RECORD_BEGIN} %H%n%s%n%an <%ae>%n%ad%n{RECORD_END}");
        let mut args = vec![
            "log",
            "--no-walk=unsorted",
            "--date=format:%Y-%m-%d %H:%M:%S",
            format.as_str(),
        ];
        args.extend(ids.iter().map(CommitId::as_str));
        args.push("--");
        let output = self.exec(&args)?;
        if !output.success() {
            return Err(output.into_failure());
        }
        Ok(output.text_lossy())
    }
}

/// `None` for content git would treat as binary (a NUL byte in the first
/// 8000 bytes) or that is not valid UTF-8.
pub fn decode_text(bytes: Vec<u8>) -> Option<String> {
    let probe = &bytes[..bytes.len().min(8000)];
    if probe.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn write_snapshot(dir: &Path, name: &str, content: &str) -> Result<String, GitError> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path.to_string_lossy().into_owned())
}

fn is_not_a_repository(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("not a git repository")
}

// ---------------------------------------------------------------------------
// Process implementation
// ---------------------------------------------------------------------------

/// [`GitOracle`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
    work_dir: PathBuf,
}

impl GitCli {
    /// Create an oracle that runs `binary` inside `work_dir`.
    pub fn new(binary: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&self.work_dir)
            .envs(ISOLATED_ENV.iter().copied())
            .args(ISOLATED_CONFIG)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl GitOracle for GitCli {
    #[instrument(level = "debug", skip(self), fields(dir = %self.work_dir.display()))]
    fn exec(&self, args: &[&str]) -> Result<GitOutput, GitError> {
        let output = self.command().args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::BinaryNotFound(self.binary.clone())
            } else {
                GitError::IoError(e)
            }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code != 0 {
            if is_not_a_repository(&stderr) {
                return Err(GitError::NotARepository(stderr.trim().to_string()));
            }
            // merge-file reports conflict counts below 128.
            if !(0..128).contains(&exit_code) {
                warn!(exit_code, stderr = %stderr.trim(), "git command failed");
            }
        }

        Ok(GitOutput {
            exit_code,
            stdout: output.stdout,
            stderr,
        })
    }
}
