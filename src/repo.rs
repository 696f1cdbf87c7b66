// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository access.
//!
//! Two kinds of repositories are involved. The __centralized repository__
//! ([`SyncRepo`]) is the one projsync owns: it holds the sync manifest at
//! its top-level, and one project slot per tracked project under
//! `projects/`. A __project repository__ ([`ProjectRepo`]) is any ordinary
//! Git repository the user works in; projsync only ever reads from it.

use crate::{
    config::{ConfigError, SyncManifest, SyncSettings, MANIFEST_FILE},
    path::canonical_or_lexical,
};

use git2::{ErrorCode, Repository, Signature};
use mkdirp::mkdirp;
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Directory of centralized repository that holds project slots.
pub const PROJECTS_DIR: &str = "projects";

/// The centralized repository.
pub struct SyncRepo {
    root: PathBuf,
    repository: Repository,
}

impl std::fmt::Debug for SyncRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl SyncRepo {
    /// Initialize new centralized repository.
    ///
    /// Creates the directory, initializes Git, turns on symlink support,
    /// creates the project slot directory, and commits a fresh sync manifest
    /// built from `settings` as the initial commit.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::State`] if path already holds a centralized
    ///   repository.
    /// - Return [`RepoError::Git2`] if libgit2 operations fail.
    /// - Return [`RepoError::Io`] if directories or manifest cannot be
    ///   written.
    #[instrument(skip(path, settings), level = "debug")]
    pub fn init(path: impl AsRef<Path>, settings: SyncSettings) -> Result<Self> {
        let root = canonical_or_lexical(path);
        if root.join(MANIFEST_FILE).exists() {
            return Err(RepoError::State {
                path: root,
                reason: "centralized repository already initialized".into(),
            });
        }

        info!("initialize centralized repository: {:?}", root.display());
        mkdirp(root.join(PROJECTS_DIR)).map_err(|source| RepoError::Io {
            path: root.join(PROJECTS_DIR),
            source,
        })?;

        // INVARIANT: Root is absolute and canonical, link targets derive from it.
        let root = canonical_or_lexical(&root);
        let repository = Repository::init(&root)?;
        let mut config = repository.config()?;
        config.set_bool("core.symlinks", true)?;

        let sync = Self { root, repository };
        let manifest = SyncManifest {
            settings,
            ..Default::default()
        };
        sync.save_manifest(&manifest)?;
        sync.commit_paths([Path::new(MANIFEST_FILE)], "chore: add projsync.toml")?;

        Ok(sync)
    }

    /// Open existing centralized repository.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::State`] if path is not a Git repository, or has
    ///   no sync manifest.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = canonical_or_lexical(path);
        debug!("open centralized repository: {:?}", root.display());

        let repository = Repository::open(&root).map_err(|err| RepoError::State {
            path: root.clone(),
            reason: format!("{}, run `projsync init` first", err.message()),
        })?;

        if !root.join(MANIFEST_FILE).is_file() {
            return Err(RepoError::State {
                path: root,
                reason: format!("missing {MANIFEST_FILE}, run `projsync init` first"),
            });
        }

        Ok(Self { root, repository })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path to slot of project `name`.
    pub fn slot(&self, name: &str) -> PathBuf {
        self.root.join(PROJECTS_DIR).join(name)
    }

    /// Slot of project `name` relative to root, for use as pathspec.
    pub fn relative_slot(name: &str) -> String {
        format!("{PROJECTS_DIR}/{name}")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// # Errors
    ///
    /// - Return [`RepoError::Io`] if manifest cannot be read.
    /// - Return [`RepoError::Config`] if manifest is malformed.
    pub fn load_manifest(&self) -> Result<SyncManifest> {
        let path = self.manifest_path();
        let content = read_to_string(&path).map_err(|source| RepoError::Io { path, source })?;
        Ok(content.parse()?)
    }

    /// # Errors
    ///
    /// - Return [`RepoError::Io`] if manifest cannot be written.
    pub fn save_manifest(&self, manifest: &SyncManifest) -> Result<()> {
        let path = self.manifest_path();
        write(&path, manifest.to_string()).map_err(|source| RepoError::Io { path, source })
    }

    /// Stage paths relative to root, and commit them to HEAD.
    fn commit_paths<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a Path>,
        message: &str,
    ) -> Result<()> {
        let mut index = self.repository.index()?;
        for path in paths {
            index.add_path(path)?;
        }
        index.write()?;

        // INVARIANT: Always use new tree produced by index after staging.
        let tree = self.repository.find_tree(index.write_tree()?)?;

        // INVARIANT: Fall back to a local identity when Git has none.
        let signature = self
            .repository
            .signature()
            .or_else(|_| Signature::now("projsync", "projsync@localhost"))?;

        let mut parents = Vec::new();
        if let Some(oid) = self.repository.head().ok().and_then(|head| head.target()) {
            parents.push(self.repository.find_commit(oid)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        self.repository
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        Ok(())
    }
}

/// Ordinary project repository the user works in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRepo {
    root: PathBuf,
}

/// Informational metadata of project repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInfo {
    pub remote: Option<String>,
    pub branch: String,
}

impl ProjectRepo {
    /// Find nearest enclosing Git work tree of `cwd`.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::NotAVersionControlRoot`] if `cwd` is not inside
    ///   a Git work tree.
    pub fn discover(cwd: impl AsRef<Path>) -> Result<Self> {
        let cwd = cwd.as_ref();
        let repository = Repository::discover(cwd).map_err(|err| match err.code() {
            ErrorCode::NotFound => RepoError::NotAVersionControlRoot(cwd.to_path_buf()),
            _ => RepoError::Git2(err),
        })?;

        let workdir = repository
            .workdir()
            .ok_or_else(|| RepoError::NotAVersionControlRoot(cwd.to_path_buf()))?;

        Ok(Self {
            root: canonical_or_lexical(workdir),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read remote locator and current branch.
    ///
    /// Both reads are independent and read-only, so they run side by side on
    /// the blocking pool.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Git2`] if repository cannot be read.
    /// - Return [`RepoError::Join`] if a read task panics.
    pub async fn info(&self) -> Result<ProjectInfo> {
        let remote_root = self.root.clone();
        let branch_root = self.root.clone();
        let remote = tokio::task::spawn_blocking(move || read_remote(&remote_root));
        let branch = tokio::task::spawn_blocking(move || read_branch(&branch_root));
        let (remote, branch) = futures::try_join!(remote, branch)?;

        Ok(ProjectInfo {
            remote: remote?,
            branch: branch?,
        })
    }
}

fn read_remote(root: &Path) -> Result<Option<String>> {
    let repository = Repository::open(root)?;
    if let Ok(origin) = repository.find_remote("origin") {
        return Ok(origin.url().map(str::to_owned));
    }

    let names = repository.remotes()?;
    let first = names
        .iter()
        .flatten()
        .find_map(|name| repository.find_remote(name).ok())
        .and_then(|remote| remote.url().map(str::to_owned));

    Ok(first)
}

fn read_branch(root: &Path) -> Result<String> {
    let repository = Repository::open(root)?;
    let branch = match repository.head() {
        Ok(head) => head.shorthand().unwrap_or("HEAD").to_owned(),
        Err(err) if err.code() == ErrorCode::UnbornBranch => {
            let head = repository.find_reference("HEAD")?;
            let target = head.symbolic_target().unwrap_or("HEAD");
            target.trim_start_matches("refs/heads/").to_owned()
        }
        Err(err) => return Err(err.into()),
    };

    Ok(branch)
}

/// Repository error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Working directory not inside a Git work tree.
    #[error("{:?} is not inside a git repository, run `git init` or pass --directory", .0.display())]
    NotAVersionControlRoot(PathBuf),

    /// Centralized repository missing, or in an unexpected state.
    #[error("centralized repository at {:?}: {reason}", path.display())]
    State { path: PathBuf, reason: String },

    /// Sync manifest could not be parsed.
    #[error("malformed sync manifest")]
    Config(#[from] ConfigError),

    /// File I/O failed.
    #[error("failed to access {:?}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Background read task failed.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Friendly result alias :3
pub type Result<T, E = RepoError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn init_then_open_sync_repo() -> anyhow::Result<()> {
        let root = std::env::current_dir()?.join("sync");
        let settings = SyncSettings {
            topology: Topology::MoveAndLink,
            ..Default::default()
        };
        let sync = SyncRepo::init(&root, settings.clone())?;

        assert!(root.join(PROJECTS_DIR).is_dir());
        assert_eq!(sync.slot("demo"), root.join("projects").join("demo"));
        assert_eq!(SyncRepo::relative_slot("demo"), "projects/demo");

        let reopened = SyncRepo::open(&root)?;
        assert_eq!(reopened.load_manifest()?.settings, settings);

        let repository = Repository::open(&root)?;
        assert!(repository.config()?.get_bool("core.symlinks")?);
        assert!(repository.head()?.peel_to_commit().is_ok());

        // Second initialization is refused.
        assert!(matches!(
            SyncRepo::init(&root, SyncSettings::default()),
            Err(RepoError::State { .. })
        ));

        Ok(())
    }

    #[sealed_test]
    fn open_requires_manifest() -> anyhow::Result<()> {
        let root = std::env::current_dir()?.join("plain");
        Repository::init(&root)?;

        let result = SyncRepo::open(&root);
        assert!(matches!(result, Err(RepoError::State { .. })));

        let missing = SyncRepo::open(std::env::current_dir()?.join("nowhere"));
        assert!(matches!(missing, Err(RepoError::State { .. })));

        Ok(())
    }

    #[sealed_test]
    fn discover_finds_enclosing_root() -> anyhow::Result<()> {
        let root = std::env::current_dir()?.join("project");
        Repository::init(&root)?;
        mkdirp(root.join("deep/er"))?;

        let found = ProjectRepo::discover(root.join("deep/er"))?;
        assert_eq!(found.root(), std::fs::canonicalize(&root)?);

        Ok(())
    }

    #[sealed_test]
    fn project_info_reads_remote_and_branch() -> anyhow::Result<()> {
        let root = std::env::current_dir()?.join("project");
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("trunk");
        let repository = Repository::init_opts(&root, &opts)?;
        repository.remote("origin", "git@example.org:me/demo.git")?;

        let runtime = tokio::runtime::Runtime::new()?;
        let info = runtime.block_on(ProjectRepo::discover(&root)?.info())?;
        assert_eq!(
            info,
            ProjectInfo {
                remote: Some("git@example.org:me/demo.git".into()),
                branch: "trunk".into(),
            }
        );

        Ok(())
    }
}
