// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project registry.
//!
//! The registry is a keyed store of [`TrackedProject`] records. It is the
//! only writer of project records; link management reads records, and hands
//! back change sets, but never persists anything itself.
//!
//! Records are persisted inside the sync manifest of the centralized
//! repository. See [`SyncManifest`](crate::config::SyncManifest).

use crate::path::canonical_or_lexical;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

/// Project tracked by the centralized repository.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TrackedProject {
    /// Unique sanitized name, mirrors registry key.
    #[serde(skip)]
    pub name: String,

    /// Absolute path to root of original project.
    pub root_path: PathBuf,

    /// Upstream locator, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    /// Branch at initialization time, informational only.
    #[serde(default)]
    pub branch: String,

    /// Paths relative to root that are tracked.
    #[serde(default)]
    pub tracked_files: BTreeSet<PathBuf>,

    /// Bookkeeping timestamps.
    pub metadata: ProjectMetadata,
}

impl TrackedProject {
    /// Construct new project with nothing tracked yet.
    pub fn new(name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            root_path: root_path.into(),
            remote: None,
            branch: String::new(),
            tracked_files: BTreeSet::new(),
            metadata: ProjectMetadata {
                added_at: now,
                last_sync: None,
                last_modified: now,
            },
        }
    }

    /// Track relative paths.
    ///
    /// Returns the paths that were not tracked before. Bumps modification
    /// time only if something changed.
    pub fn track_files(&mut self, paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
        let added = paths
            .into_iter()
            .filter(|path| self.tracked_files.insert(path.clone()))
            .collect::<Vec<_>>();
        if !added.is_empty() {
            self.metadata.last_modified = Utc::now();
        }

        added
    }

    /// Stop tracking relative paths.
    ///
    /// Returns the paths that were actually tracked. Bumps modification time
    /// only if something changed.
    pub fn untrack_files<'a>(&mut self, paths: impl IntoIterator<Item = &'a Path>) -> Vec<PathBuf> {
        let removed = paths
            .into_iter()
            .filter(|path| self.tracked_files.remove(*path))
            .map(Path::to_path_buf)
            .collect::<Vec<_>>();
        if !removed.is_empty() {
            self.metadata.last_modified = Utc::now();
        }

        removed
    }

    /// Record successful reconciliation.
    pub fn mark_synced(&mut self) {
        self.metadata.last_sync = Some(Utc::now());
    }

    /// Original project root no longer exists.
    pub fn is_root_missing(&self) -> bool {
        !self.root_path.is_dir()
    }
}

/// Bookkeeping timestamps of tracked project.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProjectMetadata {
    pub added_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,

    pub last_modified: DateTime<Utc>,
}

/// Keyed store of tracked projects.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProjectRegistry {
    projects: BTreeMap<String, TrackedProject>,
}

impl ProjectRegistry {
    /// Construct registry from already loaded records.
    pub fn new(projects: BTreeMap<String, TrackedProject>) -> Self {
        Self { projects }
    }

    /// Hand records back for persistence.
    pub fn into_inner(self) -> BTreeMap<String, TrackedProject> {
        self.projects
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Iterate projects in name order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedProject> {
        self.projects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedProject> {
        self.projects.values_mut()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.projects.contains_key(name)
    }

    /// Register new project.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::InvalidName`] if project name is not
    ///   already sanitized, or empty.
    /// - Return [`RegistryError::ProjectAlreadyExists`] if name is taken, or
    ///   another project already claims the same root.
    pub fn insert(&mut self, project: TrackedProject) -> Result<&mut TrackedProject> {
        if project.name.is_empty() || sanitize_name(&project.name) != project.name {
            return Err(RegistryError::InvalidName(project.name));
        }

        if self.projects.contains_key(&project.name) {
            return Err(RegistryError::ProjectAlreadyExists(project.name));
        }

        if let Some(other) = self.find_by_root(&project.root_path) {
            return Err(RegistryError::ProjectAlreadyExists(other.name.clone()));
        }

        let name = project.name.clone();
        Ok(self.projects.entry(name).or_insert(project))
    }

    /// # Errors
    ///
    /// - Return [`RegistryError::ProjectNotFound`] if no project has `name`.
    pub fn get(&self, name: &str) -> Result<&TrackedProject> {
        self.projects
            .get(name)
            .ok_or_else(|| RegistryError::ProjectNotFound(name.into()))
    }

    /// # Errors
    ///
    /// - Return [`RegistryError::ProjectNotFound`] if no project has `name`.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut TrackedProject> {
        self.projects
            .get_mut(name)
            .ok_or_else(|| RegistryError::ProjectNotFound(name.into()))
    }

    /// # Errors
    ///
    /// - Return [`RegistryError::ProjectNotFound`] if no project has `name`.
    pub fn remove(&mut self, name: &str) -> Result<TrackedProject> {
        self.projects
            .remove(name)
            .ok_or_else(|| RegistryError::ProjectNotFound(name.into()))
    }

    /// Find project whose stored root is `root`.
    ///
    /// Both sides are canonicalized when they exist, so symlinked temporary
    /// directories and trailing separators do not matter. A project whose
    /// root moved is not found.
    pub fn find_by_root(&self, root: impl AsRef<Path>) -> Option<&TrackedProject> {
        let wanted = canonical_or_lexical(root);
        self.projects
            .values()
            .find(|project| canonical_or_lexical(&project.root_path) == wanted)
    }
}

/// Sanitize raw name into a project name.
///
/// Lowercases ASCII letters, turns every character outside of `[a-z0-9_-]`
/// into `-`, collapses runs of separators into the first one of the run,
/// and trims separators from both ends.
pub fn sanitize_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut last_was_separator = true;

    for c in raw.chars().map(|c| c.to_ascii_lowercase()) {
        let c = match c {
            'a'..='z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        };

        let is_separator = c == '-' || c == '_';
        if is_separator && last_was_separator {
            continue;
        }

        name.push(c);
        last_was_separator = is_separator;
    }

    while name.ends_with(['-', '_']) {
        name.pop();
    }

    name
}

/// Derive project name from remote locator, or root directory name.
///
/// Takes the last path segment of the remote without a ".git" suffix, so
/// both `git@host:me/demo.git` and `https://host/me/demo` give "demo".
pub fn derive_name(remote: Option<&str>, root: impl AsRef<Path>) -> String {
    let from_remote = remote
        .map(|url| url.trim_end_matches('/'))
        .and_then(|url| url.rsplit(['/', ':']).next())
        .map(|segment| segment.strip_suffix(".git").unwrap_or(segment))
        .map(sanitize_name)
        .filter(|name| !name.is_empty());

    from_remote.unwrap_or_else(|| {
        root.as_ref()
            .file_name()
            .map(|name| sanitize_name(&name.to_string_lossy()))
            .unwrap_or_default()
    })
}

/// Registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No project with name.
    #[error("project {0:?} not found, run `projsync list` to see tracked projects")]
    ProjectNotFound(String),

    /// Project name or root already registered.
    #[error("project {0:?} already exists, run `projsync add` to track more files")]
    ProjectAlreadyExists(String),

    /// Name is empty or not sanitized.
    #[error("invalid project name {0:?}, use lowercase letters, digits, '-' or '_'")]
    InvalidName(String),
}

/// Friendly result alias :3
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
