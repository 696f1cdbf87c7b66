// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Centralized store management and manipulation.
//!
//! The __store__ is the centralized repository seen through its sync
//! manifest. It ties together the project registry, link management, and
//! command forwarding, so the command-line layer only has to pick an
//! operation.
//!
//! # Store Layout
//!
//! ```text
//! <sync-repo>/
//! ├── projsync.toml        settings, and registry of tracked projects
//! └── projects/
//!     ├── demo/            project slot of "demo"
//!     │   └── CLAUDE.local.md
//!     └── other/
//! ```
//!
//! Every mutation is written back to the sync manifest before the operation
//! returns. Nothing is committed automatically; users commit through the
//! forwarded `commit` command whenever they like.

use crate::{
    config::{SyncManifest, SyncSettings, Topology},
    discover::scan,
    forward::{current_project, Forwarder},
    link::{ChangeSet, FailurePolicy, Layout, LinkBatch, LinkState, Linker},
    path::{absolutize, canonical_or_lexical, relative_to},
    registry::{derive_name, sanitize_name, ProjectRegistry, RegistryError, TrackedProject},
    repo::{ProjectRepo, RepoError, SyncRepo},
    report::{Report, TracingReport},
};

use chrono::{DateTime, Utc};
use mkdirp::mkdirp;
use serde::Serialize;
use std::{
    ffi::OsString,
    fs::symlink_metadata,
    path::{Path, PathBuf},
};

/// Centralized store of tracked projects.
#[derive(Debug)]
pub struct Store<R = TracingReport>
where
    R: Report,
{
    sync: SyncRepo,
    settings: SyncSettings,
    registry: ProjectRegistry,
    report: R,
}

impl Store<TracingReport> {
    /// Open existing store, reporting through `tracing`.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Repo`] if centralized repository is missing,
    ///   or its sync manifest is malformed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, TracingReport)
    }
}

impl<R> Store<R>
where
    R: Report,
{
    /// Open existing store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Repo`] if centralized repository is missing,
    ///   or its sync manifest is malformed.
    pub fn open_with(path: impl AsRef<Path>, report: R) -> Result<Self> {
        let sync = SyncRepo::open(path)?;
        let manifest = sync.load_manifest()?;

        Ok(Self {
            sync,
            settings: manifest.settings,
            registry: ProjectRegistry::new(manifest.projects),
            report,
        })
    }

    /// Open store, initializing the centralized repository first if needed.
    ///
    /// `topology` only matters when a new repository gets created. An
    /// existing repository keeps the topology it was created with.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Repo`] if initialization fails. Nothing else
    ///   can proceed without the centralized repository.
    pub fn open_or_init(
        path: impl AsRef<Path>,
        topology: Option<Topology>,
        report: R,
    ) -> Result<Self> {
        let path = path.as_ref();
        if SyncRepo::open(path).is_err() {
            let settings = SyncSettings {
                topology: topology.unwrap_or_default(),
                ..Default::default()
            };
            SyncRepo::init(path, settings)?;
            report.info(format!("created centralized repository at {}", path.display()));
        } else if let Some(topology) = topology {
            report.debug(format!(
                "ignoring requested topology {topology}, repository already exists"
            ));
        }

        Self::open_with(path, report)
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    pub fn root(&self) -> &Path {
        self.sync.root()
    }

    pub fn report(&self) -> &R {
        &self.report
    }

    /// Write settings and registry back to the sync manifest.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Repo`] if manifest cannot be written.
    pub fn save(&self) -> Result<()> {
        let manifest = SyncManifest {
            settings: self.settings.clone(),
            projects: self.registry.clone().into_inner(),
        };
        Ok(self.sync.save_manifest(&manifest)?)
    }

    /// Link layout of `project`.
    pub fn layout(&self, project: &TrackedProject) -> Layout {
        Layout::new(
            self.settings.topology,
            self.sync.root(),
            self.sync.slot(&project.name),
            &project.root_path,
        )
    }

    /// Name of registered project enclosing `cwd`.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Repo`] if `cwd` is not inside a Git work tree.
    /// - Return [`StoreError::Registry`] if the work tree is not tracked.
    pub fn current_project_name(&self, cwd: impl AsRef<Path>) -> Result<String> {
        let project_repo = ProjectRepo::discover(cwd)?;
        self.registry
            .find_by_root(project_repo.root())
            .map(|project| project.name.clone())
            .ok_or_else(|| {
                StoreError::Registry(RegistryError::ProjectNotFound(
                    project_repo.root().display().to_string(),
                ))
            })
    }

    /// Register project enclosing `cwd`, and link its default files.
    ///
    /// Project name is sanitized from `name`, or derived from the remote
    /// locator, or the root directory name. Default files are discovered
    /// through the inclusion and exclusion patterns of the settings.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Repo`] if `cwd` is not inside a Git work tree.
    /// - Return [`StoreError::Registry`] if the project already exists, or
    ///   the name is unusable.
    pub async fn init_project(
        &mut self,
        cwd: impl AsRef<Path>,
        name: Option<&str>,
    ) -> Result<(String, LinkBatch)> {
        let project_repo = ProjectRepo::discover(cwd)?;
        if let Some(existing) = self.registry.find_by_root(project_repo.root()) {
            return Err(RegistryError::ProjectAlreadyExists(existing.name.clone()).into());
        }

        let info = project_repo.info().await?;
        let name = match name {
            Some(name) => sanitize_name(name),
            None => derive_name(info.remote.as_deref(), project_repo.root()),
        };

        let mut project = TrackedProject::new(name.clone(), project_repo.root());
        project.remote = info.remote;
        project.branch = info.branch;
        self.registry.insert(project)?;

        let slot = self.sync.slot(&name);
        mkdirp(&slot).map_err(|source| RepoError::Io { path: slot, source })?;
        self.report.info(format!(
            "tracking {name} at {}",
            project_repo.root().display()
        ));

        let found = scan(
            project_repo.root(),
            &self.settings.include,
            &self.settings.exclude,
        );
        let batch = self.track_and_link(&name, found.into_iter().map(|r| r.relative_path))?;
        self.save()?;

        Ok((name, batch))
    }

    /// Track and link files given relative to `cwd`.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Registry`] if project `name` does not exist.
    /// - Return [`StoreError::OutsideProject`] if any file is not inside the
    ///   project root. Nothing is tracked in that case.
    /// - Return [`StoreError::DirectoryGiven`] if any path is a directory.
    pub fn add_files(
        &mut self,
        name: &str,
        cwd: impl AsRef<Path>,
        files: &[PathBuf],
    ) -> Result<LinkBatch> {
        let relative = self.resolve_files(name, cwd, files)?;
        let batch = self.track_and_link(name, relative)?;
        self.save()?;

        Ok(batch)
    }

    /// Track and link every file that discovery finds in project `name`.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Registry`] if project `name` does not exist.
    pub fn add_all(&mut self, name: &str) -> Result<LinkBatch> {
        let root = self.registry.get(name)?.root_path.clone();
        let found = scan(&root, &self.settings.include, &self.settings.exclude);
        let batch = self.track_and_link(name, found.into_iter().map(|r| r.relative_path))?;
        self.save()?;

        Ok(batch)
    }

    /// Unlink and stop tracking files given relative to `cwd`.
    ///
    /// Files whose link could not be removed stay tracked.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Registry`] if project `name` does not exist.
    /// - Return [`StoreError::OutsideProject`] if any file is not inside the
    ///   project root.
    pub fn remove_files(
        &mut self,
        name: &str,
        cwd: impl AsRef<Path>,
        files: &[PathBuf],
    ) -> Result<LinkBatch> {
        let relative = self.resolve_files(name, cwd, files)?;
        let project = self.registry.get(name)?;
        let layout = self.layout(project);

        let (tracked, untracked): (Vec<_>, Vec<_>) = relative
            .into_iter()
            .partition(|path| project.tracked_files.contains(path));
        for path in &untracked {
            self.report
                .warn(format!("{} is not tracked by {name}", path.display()));
        }

        let linker = Linker::new(layout, &self.report);
        let batch = linker.unlink_paths(tracked.iter().map(PathBuf::as_path));

        let project = self.registry.get_mut(name)?;
        let kept = batch
            .failures
            .iter()
            .map(|failure| failure.path().to_path_buf())
            .collect::<Vec<_>>();
        project.untrack_files(
            tracked
                .iter()
                .filter(|path| !kept.contains(path))
                .map(PathBuf::as_path),
        );
        self.save()?;

        Ok(batch)
    }

    /// Unlink every tracked file of project `name`, and forget the project.
    ///
    /// If any link cannot be removed, the project stays registered so the
    /// user can fix the problem and try again.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Registry`] if project `name` does not exist.
    pub fn remove_project(&mut self, name: &str) -> Result<LinkBatch> {
        let project = self.registry.get(name)?;
        let linker = Linker::new(self.layout(project), &self.report);
        let batch = linker.remove_links(project);

        if batch.is_clean() {
            self.registry.remove(name)?;
            let slot = self.sync.slot(name);
            if std::fs::remove_dir(&slot).is_ok() {
                self.report
                    .debug(format!("removed slot {}", slot.display()));
            }
            self.report.info(format!("stopped tracking {name}"));
        } else {
            self.report.warn(format!(
                "{name} still registered, fix the failures above and remove it again"
            ));
        }
        self.save()?;

        Ok(batch)
    }

    /// Reconcile links of every project with its tracked file list.
    ///
    /// Last sync time is only recorded for projects reconciled without
    /// failures.
    ///
    /// Projects whose root no longer exists are skipped with a warning,
    /// since there is nothing to link against.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Repo`] if manifest cannot be written.
    pub fn sync(&mut self) -> Result<Vec<(String, ChangeSet)>> {
        let mut results = Vec::new();
        let names = self
            .registry
            .iter()
            .map(|project| project.name.clone())
            .collect::<Vec<_>>();

        for name in names {
            let project = self.registry.get(&name)?;
            if project.is_root_missing() {
                self.report.warn(format!(
                    "{name}: root {} no longer exists, skipping",
                    project.root_path.display()
                ));
                continue;
            }

            let changes = Linker::new(self.layout(project), &self.report).reconcile(project);
            if changes.failures.is_empty() {
                self.registry.get_mut(&name)?.mark_synced();
            }
            results.push((name, changes));
        }
        self.save()?;

        Ok(results)
    }

    /// Summarize every project, and the link state of its tracked files.
    ///
    /// Drift is reported as warnings, never as errors.
    pub fn list(&self) -> Vec<ProjectSummary> {
        self.registry
            .iter()
            .map(|project| {
                let root_missing = project.is_root_missing();
                if root_missing {
                    self.report.warn(format!(
                        "{}: root {} no longer exists",
                        project.name,
                        project.root_path.display()
                    ));
                }

                let linker = Linker::new(self.layout(project), &self.report);
                let files = project
                    .tracked_files
                    .iter()
                    .map(|path| {
                        let state = linker.inspect(path);
                        if matches!(state, LinkState::NotALink | LinkState::Dangling) {
                            self.report
                                .warn(format!("{}: {} is {state}", project.name, path.display()));
                        }
                        FileSummary {
                            path: path.clone(),
                            state,
                        }
                    })
                    .collect();

                ProjectSummary {
                    name: project.name.clone(),
                    root_path: project.root_path.clone(),
                    remote: project.remote.clone(),
                    branch: project.branch.clone(),
                    root_missing,
                    last_sync: project.metadata.last_sync,
                    files,
                }
            })
            .collect()
    }

    /// Forward Git invocation to the centralized repository.
    ///
    /// Returns Git's exit code.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Forward`] if Git cannot be started.
    pub fn forward(&self, cwd: impl AsRef<Path>, args: &[OsString]) -> Result<i32> {
        let slot = current_project(cwd, &self.registry)
            .map(|project| SyncRepo::relative_slot(&project.name));
        let plan = Forwarder::new(self.sync.root()).classify(
            args.first().map(OsString::as_os_str),
            args,
            slot.as_deref(),
        );

        Ok(plan.run()?)
    }

    /// Track new relative paths and link them.
    ///
    /// Paths whose link fails are untracked again, so the registry only ever
    /// lists files that were linked at least once.
    fn track_and_link(
        &mut self,
        name: &str,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<LinkBatch> {
        let project = self.registry.get_mut(name)?;
        let mut requested = paths.into_iter().collect::<Vec<_>>();
        requested.sort();
        requested.dedup();

        let new = project.track_files(requested.iter().cloned());
        for path in requested.iter().filter(|path| !new.contains(path)) {
            self.report
                .info(format!("{} already tracked by {name}", path.display()));
        }

        let project = self.registry.get(name)?;
        let linker = Linker::new(self.layout(project), &self.report);
        let batch = linker.create_links(new.iter().map(PathBuf::as_path), FailurePolicy::Continue);

        if !batch.is_clean() {
            let failed = batch
                .failures
                .iter()
                .map(|failure| failure.path())
                .collect::<Vec<_>>();
            self.registry.get_mut(name)?.untrack_files(failed);
        }

        Ok(batch)
    }

    /// Turn user supplied paths into paths relative to project root.
    fn resolve_files(
        &self,
        name: &str,
        cwd: impl AsRef<Path>,
        files: &[PathBuf],
    ) -> Result<Vec<PathBuf>> {
        let project = self.registry.get(name)?;
        let base = canonical_or_lexical(cwd);

        files
            .iter()
            .map(|file| {
                let absolute = absolutize(&base, file);
                if symlink_metadata(&absolute).is_ok_and(|metadata| metadata.is_dir()) {
                    return Err(StoreError::DirectoryGiven { path: absolute });
                }

                relative_to(&project.root_path, &absolute).ok_or_else(|| {
                    StoreError::OutsideProject {
                        path: absolute,
                        root: project.root_path.clone(),
                    }
                })
            })
            .collect()
    }
}

/// Listing of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub root_path: PathBuf,
    pub remote: Option<String>,
    pub branch: String,
    pub root_missing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub files: Vec<FileSummary>,
}

/// Link state of one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub state: LinkState,
}

/// Store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Repository access fails.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// Registry lookup fails.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Git invocation fails.
    #[error(transparent)]
    Forward(#[from] crate::forward::ForwardError),

    /// Path given by user names a directory instead of a file.
    #[error("{:?} is a directory, name the files inside it or pass --all", path.display())]
    DirectoryGiven { path: PathBuf },

    /// Path given by user is not inside project root.
    #[error("{:?} is outside of project root {:?}", path.display(), root.display())]
    OutsideProject { path: PathBuf, root: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
