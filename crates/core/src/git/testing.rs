//! In-memory [`GitOracle`] for unit tests.
//!
//! Replies are keyed by the space-joined argument list. Anything not
//! scripted answers like git does for an unknown object: exit 128.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::errors::GitError;
use crate::git::{GitOracle, GitOutput};

enum Reply {
    Output(GitOutput),
    NotARepository(String),
    BinaryNotFound(String),
    CommandFailed(i32, String),
}

#[derive(Default)]
pub struct ScriptedGit {
    replies: HashMap<String, Reply>,
    prefixes: Vec<(String, GitOutput)>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a reply with an explicit exit status.
    pub fn respond(&mut self, command: &str, exit_code: i32, stdout: &str) {
        self.replies.insert(
            command.to_string(),
            Reply::Output(GitOutput {
                exit_code,
                stdout: stdout.as_bytes().to_vec(),
                stderr: String::new(),
            }),
        );
    }

    pub fn ok(&mut self, command: &str, stdout: &str) {
        self.respond(command, 0, stdout);
    }

    /// Script a reply for every command starting with `prefix`.
    pub fn ok_prefix(&mut self, prefix: &str, exit_code: i32, stdout: &str) {
        self.prefixes.push((
            prefix.to_string(),
            GitOutput {
                exit_code,
                stdout: stdout.as_bytes().to_vec(),
                stderr: String::new(),
            },
        ));
    }

    pub fn fail_with(&mut self, command: &str, error: GitError) {
        let reply = match error {
            GitError::NotARepository(msg) => Reply::NotARepository(msg),
            GitError::BinaryNotFound(bin) => Reply::BinaryNotFound(bin),
            GitError::CommandFailed { exit_code, stderr } => Reply::CommandFailed(exit_code, stderr),
            other => Reply::CommandFailed(1, other.to_string()),
        };
        self.replies.insert(command.to_string(), reply);
    }

    /// Every command issued so far, space-joined.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl GitOracle for ScriptedGit {
    fn exec(&self, args: &[&str]) -> Result<GitOutput, GitError> {
        let key = args.join(" ");
        self.calls.borrow_mut().push(key.clone());

        match self.replies.get(&key) {
            Some(Reply::Output(out)) => return Ok(out.clone()),
            Some(Reply::NotARepository(msg)) => return Err(GitError::NotARepository(msg.clone())),
            Some(Reply::BinaryNotFound(bin)) => return Err(GitError::BinaryNotFound(bin.clone())),
            Some(Reply::CommandFailed(code, stderr)) => {
                return Ok(GitOutput {
                    exit_code: *code,
                    stdout: Vec::new(),
                    stderr: stderr.clone(),
                })
            }
            None => {}
        }
        if let Some((_, out)) = self.prefixes.iter().find(|(p, _)| key.starts_with(p.as_str())) {
            return Ok(out.clone());
        }
        Ok(GitOutput {
            exit_code: 128,
            stdout: Vec::new(),
            stderr: format!("fatal: unscripted command: {key}"),
        })
    }
}
