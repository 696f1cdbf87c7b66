// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Forward Git commands to the centralized repository.
//!
//! Users type ordinary Git commands as if they were working on their own
//! project. Each invocation gets classified, rewritten if needed, and then
//! executed inside the centralized repository:
//!
//! 1. No command at all means `status`.
//! 2. __Repository-wide__ commands like `commit` or `push` run verbatim.
//!    They are repository scoped by nature, and any paths the user typed are
//!    trusted as is.
//! 3. __Project-scoped__ read commands like `status` or `log` get narrowed
//!    to the slot of the current project by appending `-- projects/<name>`,
//!    unless the user already gave explicit paths.
//! 4. Everything else runs verbatim.
//!
//! The working directory is always the root of the centralized repository,
//! never the directory the user is actually in.

use crate::{
    registry::{ProjectRegistry, TrackedProject},
    repo::ProjectRepo,
};

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Git binary to execute.
pub const GIT_BIN: &str = "git";

/// Command used when none is given.
pub const DEFAULT_COMMAND: &str = "status";

/// Commands that always operate on the whole centralized repository.
pub const REPOSITORY_WIDE: &[&str] = &[
    "commit", "push", "pull", "fetch", "branch", "checkout", "merge", "rebase", "reset", "stash",
    "tag", "add",
];

/// Read commands that can be narrowed to one project.
pub const PROJECT_SCOPED: &[&str] = &["status", "diff", "log", "show", "blame", "ls-files"];

/// How a command gets treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    RepositoryWide,
    ProjectScoped,
    Passthrough,
}

impl CommandClass {
    pub fn of(command: &OsStr) -> Self {
        let command = command.to_string_lossy();
        let name: &str = &command;
        if REPOSITORY_WIDE.contains(&name) {
            Self::RepositoryWide
        } else if PROJECT_SCOPED.contains(&name) {
            Self::ProjectScoped
        } else {
            Self::Passthrough
        }
    }
}

/// Fully resolved Git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    /// Arguments passed to Git, command name first.
    pub args: Vec<OsString>,

    /// Directory to run Git in.
    pub working_dir: PathBuf,
}

impl CommandPlan {
    /// Run plan with inherited standard streams.
    ///
    /// Returns Git's exit code unchanged. A process killed by a signal
    /// reports 1.
    ///
    /// # Errors
    ///
    /// - Return [`ForwardError::Spawn`] if Git cannot be started.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self) -> Result<i32> {
        debug!("run git {:?} in {:?}", self.args, self.working_dir.display());
        let status = Command::new(GIT_BIN)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .status()
            .map_err(|source| ForwardError::Spawn {
                args: self.args.clone(),
                source,
            })?;

        Ok(status.code().unwrap_or(1))
    }

    /// Run plan capturing standard output and error.
    ///
    /// # Errors
    ///
    /// - Return [`ForwardError::Spawn`] if Git cannot be started.
    pub fn output(&self) -> Result<GitOutput> {
        let output = Command::new(GIT_BIN)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|source| ForwardError::Spawn {
                args: self.args.clone(),
                source,
            })?;

        Ok(GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code().unwrap_or(1),
        })
    }
}

/// Captured result of Git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Classify and rewrite Git invocations for the centralized repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarder {
    sync_root: PathBuf,
}

impl Forwarder {
    pub fn new(sync_root: impl Into<PathBuf>) -> Self {
        Self {
            sync_root: sync_root.into(),
        }
    }

    /// Decide how to run `full_args`.
    ///
    /// `full_args` starts with the command name. `current_slot` is the slot
    /// of the current project relative to the centralized repository root,
    /// if a current project is known. Never fails.
    pub fn classify(
        &self,
        command: Option<&OsStr>,
        full_args: &[OsString],
        current_slot: Option<&str>,
    ) -> CommandPlan {
        let args = match command {
            None => vec![OsString::from(DEFAULT_COMMAND)],
            Some(command) => match (CommandClass::of(command), current_slot) {
                (CommandClass::ProjectScoped, Some(slot)) if !has_explicit_paths(full_args) => {
                    let mut args = full_args.to_vec();
                    args.push("--".into());
                    args.push(slot.into());
                    args
                }
                _ => full_args.to_vec(),
            },
        };

        CommandPlan {
            args,
            working_dir: self.sync_root.clone(),
        }
    }
}

/// Caller already narrowed the command by path.
///
/// True if a `--` separator is present, or any argument after the command
/// name is not a flag.
fn has_explicit_paths(full_args: &[OsString]) -> bool {
    full_args.iter().skip(1).any(|arg| {
        let arg = arg.to_string_lossy();
        arg == "--" || !arg.starts_with('-')
    })
}

/// Find registered project enclosing `cwd`.
///
/// The nearest enclosing Git work tree of `cwd` must be the stored root of a
/// registered project. Anything else means there is no current project.
pub fn current_project<'a>(
    cwd: impl AsRef<Path>,
    registry: &'a ProjectRegistry,
) -> Option<&'a TrackedProject> {
    let project_repo = ProjectRepo::discover(cwd).ok()?;
    registry.find_by_root(project_repo.root())
}

/// Forwarding error types.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// Git could not be started.
    #[error("failed to run git with {args:?}, is git installed and on PATH?")]
    Spawn {
        args: Vec<OsString>,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ForwardError> = std::result::Result<T, E>;
