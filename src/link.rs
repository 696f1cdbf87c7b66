// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link management between projects and the centralized repository.
//!
//! Every tracked project owns a __project slot__ inside the centralized
//! repository at `projects/<name>`. Each tracked file is connected between
//! its original location in the project, and its location in the slot,
//! through a symbolic link.
//!
//! # Topologies
//!
//! Which side holds the real file is decided by the [`Topology`] of the
//! centralized repository:
//!
//! - __link-in-repository__: the real file stays at `<root>/<path>`, and the
//!   slot holds a link at `<slot>/<path>` pointing at it. Git stores the
//!   link itself, not the file contents.
//! - __move-and-link__: the real file moves to `<slot>/<path>`, and a link
//!   is left behind at `<root>/<path>`. The centralized repository becomes
//!   the sole source of truth.
//!
//! The topology never varies per file. A [`Layout`] captures it together
//! with the project root, and the slot, then answers the only two questions
//! the rest of the module needs: where does the link live, and what should
//! it point at.
//!
//! # Safety
//!
//! A file system entry that is not a link is never deleted. Link targets are
//! always absolute, and compared byte for byte.

pub mod reconcile;

pub use reconcile::{Anomaly, AnomalyKind, ChangeSet, LinkState};

use crate::{config::Topology, report::Report};

use mkdirp::mkdirp;
use std::{
    fs::{copy, read_dir, read_link, remove_dir, remove_file, rename, symlink_metadata},
    io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

/// Where links and real files live for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    topology: Topology,
    repo_root: PathBuf,
    slot: PathBuf,
    project_root: PathBuf,
}

impl Layout {
    /// Construct new layout.
    ///
    /// All three paths must be absolute, and `slot` must live underneath
    /// `repo_root`.
    pub fn new(
        topology: Topology,
        repo_root: impl Into<PathBuf>,
        slot: impl Into<PathBuf>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            topology,
            repo_root: repo_root.into(),
            slot: slot.into(),
            project_root: project_root.into(),
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn slot(&self) -> &Path {
        &self.slot
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Directory that holds the links.
    pub fn link_dir(&self) -> &Path {
        match self.topology {
            Topology::LinkInRepository => &self.slot,
            Topology::MoveAndLink => &self.project_root,
        }
    }

    /// Directory that holds the real files.
    pub fn real_dir(&self) -> &Path {
        match self.topology {
            Topology::LinkInRepository => &self.project_root,
            Topology::MoveAndLink => &self.slot,
        }
    }

    /// Location of link for tracked path.
    pub fn link_path(&self, relative_path: impl AsRef<Path>) -> PathBuf {
        self.link_dir().join(relative_path)
    }

    /// Expected target of link for tracked path, i.e., the real file.
    pub fn target_path(&self, relative_path: impl AsRef<Path>) -> PathBuf {
        self.real_dir().join(relative_path)
    }
}

/// What to do with the rest of a batch once one file fails.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record failure, keep going.
    #[default]
    Continue,

    /// Record failure, stop processing.
    Abort,
}

/// Outcome of bulk link operation.
#[derive(Debug, Default)]
pub struct LinkBatch {
    /// Relative paths that were processed successfully.
    pub paths: Vec<PathBuf>,

    /// Per-file failures, in processing order.
    pub failures: Vec<LinkError>,
}

impl LinkBatch {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Create, update, and remove links for one project.
#[derive(Debug)]
pub struct Linker<R>
where
    R: Report,
{
    pub(crate) layout: Layout,
    pub(crate) report: R,
}

impl<R> Linker<R>
where
    R: Report,
{
    /// Construct new linker.
    pub fn new(layout: Layout, report: R) -> Self {
        Self { layout, report }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Link every file record.
    ///
    /// Each record is handled on its own. A failing file never affects files
    /// that were already linked. Whether remaining files are still processed
    /// after a failure is decided by `policy`.
    pub fn create_links<'a>(
        &self,
        files: impl IntoIterator<Item = &'a Path>,
        policy: FailurePolicy,
    ) -> LinkBatch {
        let mut batch = LinkBatch::default();
        for relative_path in files {
            match self.create_link(relative_path) {
                Ok(()) => batch.paths.push(relative_path.to_path_buf()),
                Err(error) => {
                    self.report.warn(error.to_string());
                    batch.failures.push(error);
                    if policy == FailurePolicy::Abort {
                        break;
                    }
                }
            }
        }

        batch
    }

    /// Link one tracked path according to topology.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::SourceMissing`] if the real file is absent.
    /// - Return [`LinkError::NotALink`] if the link location is occupied by
    ///   something other than a link.
    /// - Return [`LinkError::OperationFailed`] if any file system step fails.
    pub fn create_link(&self, relative_path: &Path) -> Result<()> {
        match self.layout.topology {
            Topology::LinkInRepository => self.link_in_place(relative_path),
            Topology::MoveAndLink => self.move_and_link(relative_path),
        }
    }

    /// Remove links for every path listed.
    ///
    /// Reverses whichever topology is in force, then removes directories of
    /// the slot that were left empty.
    pub fn unlink_paths<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> LinkBatch {
        let mut batch = LinkBatch::default();
        for relative_path in paths {
            match self.unlink(relative_path) {
                Ok(true) => batch.paths.push(relative_path.to_path_buf()),
                Ok(false) => self
                    .report
                    .debug(format!("nothing to unlink for {}", relative_path.display())),
                Err(error) => {
                    self.report.warn(error.to_string());
                    batch.failures.push(error);
                }
            }
        }

        batch
    }

    /// Remove one link.
    ///
    /// Returns `false` if there was nothing to remove.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::NotALink`] if a real file sits where the link
    ///   was expected.
    /// - Return [`LinkError::OperationFailed`] if any file system step fails.
    pub fn unlink(&self, relative_path: &Path) -> Result<bool> {
        match self.layout.topology {
            Topology::LinkInRepository => self.unlink_in_place(relative_path),
            Topology::MoveAndLink => self.unlink_and_restore(relative_path),
        }
    }

    fn link_in_place(&self, relative_path: &Path) -> Result<()> {
        let target = self.layout.target_path(relative_path);

        if !is_file(&target) {
            return Err(LinkError::SourceMissing {
                path: relative_path.to_path_buf(),
                source_path: target,
            });
        }

        self.place_link(relative_path)
    }

    /// Put link for tracked path in place without moving any real file.
    ///
    /// Replaces a stale link, refuses to replace anything else.
    pub(crate) fn place_link(&self, relative_path: &Path) -> Result<()> {
        let link = self.layout.link_path(relative_path);
        let target = self.layout.target_path(relative_path);

        self.clear_stale_link(relative_path, &link)?;
        ensure_parent(relative_path, &link)?;
        symlink(&target, &link).map_err(|err| op_failed(relative_path, "create link", err))?;
        self.report.info(format!(
            "link {} -> {}",
            link.display(),
            target.display()
        ));

        Ok(())
    }

    fn move_and_link(&self, relative_path: &Path) -> Result<()> {
        let link = self.layout.link_path(relative_path);
        let target = self.layout.target_path(relative_path);

        if verify_link(&link, &target) && is_file(&target) {
            self.report
                .debug(format!("{} already linked", relative_path.display()));
            return Ok(());
        }

        // INVARIANT: Real file already in slot only needs its link repaired.
        if is_file(&target) && !is_file(&link) {
            return self.place_link(relative_path);
        }

        if !is_file(&link) {
            return Err(LinkError::SourceMissing {
                path: relative_path.to_path_buf(),
                source_path: link,
            });
        }

        // INVARIANT: Slot entry must be free, or a link we may replace.
        self.clear_stale_link(relative_path, &target)?;
        ensure_parent(relative_path, &target)?;
        move_file(&link, &target).map_err(|err| op_failed(relative_path, "move file", err))?;

        // INVARIANT: Put file back if the link cannot be left behind.
        if let Err(err) = symlink(&target, &link) {
            if let Err(restore) = move_file(&target, &link) {
                self.report.warn(format!(
                    "failed to restore {} to {}: {restore}",
                    target.display(),
                    link.display()
                ));
            }
            return Err(op_failed(relative_path, "create link", err));
        }

        self.report.info(format!(
            "move {} into {} and link back",
            relative_path.display(),
            self.layout.slot.display()
        ));

        Ok(())
    }

    fn unlink_in_place(&self, relative_path: &Path) -> Result<bool> {
        let link = self.layout.link_path(relative_path);
        let Ok(metadata) = symlink_metadata(&link) else {
            return Ok(false);
        };

        if !metadata.file_type().is_symlink() {
            return Err(LinkError::NotALink {
                path: relative_path.to_path_buf(),
                location: link,
            });
        }

        remove_file(&link).map_err(|err| op_failed(relative_path, "remove link", err))?;
        self.report.info(format!("unlink {}", link.display()));
        self.prune_empty_dirs(&link);

        Ok(true)
    }

    fn unlink_and_restore(&self, relative_path: &Path) -> Result<bool> {
        let link = self.layout.link_path(relative_path);
        let target = self.layout.target_path(relative_path);
        let link_kind = symlink_metadata(&link).ok().map(|m| m.file_type());

        if link_kind.is_some_and(|kind| !kind.is_symlink()) {
            if is_file(&target) {
                return Err(LinkError::NotALink {
                    path: relative_path.to_path_buf(),
                    location: link,
                });
            }

            // Real file already back in place, nothing of ours left.
            return Ok(false);
        }

        if link_kind.is_some() {
            remove_file(&link).map_err(|err| op_failed(relative_path, "remove link", err))?;
        }

        if is_file(&target) {
            move_file(&target, &link)
                .map_err(|err| op_failed(relative_path, "restore file", err))?;
            self.report.info(format!(
                "restore {} to {}",
                relative_path.display(),
                link.display()
            ));
            self.prune_empty_dirs(&target);
        } else if link_kind.is_none() {
            return Ok(false);
        }

        Ok(true)
    }

    /// Remove link at `location` if present.
    ///
    /// Refuses to touch anything that is not a link.
    fn clear_stale_link(&self, relative_path: &Path, location: &Path) -> Result<()> {
        let Ok(metadata) = symlink_metadata(location) else {
            return Ok(());
        };

        if !metadata.file_type().is_symlink() {
            return Err(LinkError::NotALink {
                path: relative_path.to_path_buf(),
                location: location.to_path_buf(),
            });
        }

        remove_file(location).map_err(|err| op_failed(relative_path, "remove stale link", err))?;
        self.report
            .debug(format!("removed stale link {}", location.display()));

        Ok(())
    }

    /// Remove empty directories walking upward from the parent of `leaf`.
    ///
    /// Stops at the first non-empty directory. The slot itself may go, but
    /// nothing above it, and nothing outside the centralized repository.
    pub(crate) fn prune_empty_dirs(&self, leaf: &Path) {
        let repo_root = self.layout.repo_root.as_path();
        let stop = self.layout.slot.parent().unwrap_or(repo_root);
        let mut current = leaf.parent();

        while let Some(dir) = current {
            if dir == stop || dir == repo_root || !dir.starts_with(repo_root) {
                break;
            }

            let is_empty = read_dir(dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty || remove_dir(dir).is_err() {
                break;
            }

            self.report
                .debug(format!("removed empty directory {}", dir.display()));
            current = dir.parent();
        }
    }
}

/// Check that `link_path` is a link whose recorded target is exactly
/// `expected_target`.
///
/// No normalization is performed. Callers must pass absolute paths built
/// the same way the link was created.
pub fn verify_link(link_path: impl AsRef<Path>, expected_target: impl AsRef<Path>) -> bool {
    read_link(link_path.as_ref())
        .map(|target| target.as_os_str() == expected_target.as_ref().as_os_str())
        .unwrap_or(false)
}

pub(crate) fn is_file(path: &Path) -> bool {
    symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_file())
        .unwrap_or(false)
}

fn ensure_parent(relative_path: &Path, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp(parent).map_err(|err| op_failed(relative_path, "create parent directory", err))?;
    }

    Ok(())
}

/// Move file, falling back to copy and delete across devices.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        mkdirp(parent)?;
    }

    if rename(from, to).is_ok() {
        return Ok(());
    }

    copy(from, to)?;
    if let Err(err) = remove_file(from) {
        // INVARIANT: Never leave two diverging copies behind.
        let _ = remove_file(to);
        return Err(err);
    }

    Ok(())
}

fn op_failed(relative_path: &Path, op: &'static str, source: io::Error) -> LinkError {
    LinkError::OperationFailed {
        path: relative_path.to_path_buf(),
        op,
        source,
    }
}

/// Link operation error types.
///
/// Every variant carries the relative path of the tracked file that failed,
/// so callers can decide whether to retry, or abort the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Real file to link against does not exist.
    #[error("cannot link {:?}: {:?} does not exist", path.display(), source_path.display())]
    SourceMissing { path: PathBuf, source_path: PathBuf },

    /// Location reserved for a link holds a real file.
    #[error(
        "cannot manage {:?}: {:?} is not a link, move it out of the way and run `projsync sync`",
        path.display(),
        location.display()
    )]
    NotALink { path: PathBuf, location: PathBuf },

    /// File system operation failed.
    #[error("failed to {op} for {:?}", path.display())]
    OperationFailed {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl LinkError {
    /// Relative path of tracked file that failed.
    pub fn path(&self) -> &Path {
        match self {
            Self::SourceMissing { path, .. }
            | Self::NotALink { path, .. }
            | Self::OperationFailed { path, .. } => path,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CollectReport, Level};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, read_to_string, write};

    pub(crate) struct Sandbox {
        pub(crate) repo: PathBuf,
        pub(crate) root: PathBuf,
    }

    impl Sandbox {
        pub(crate) fn new() -> anyhow::Result<Self> {
            let base = std::env::current_dir()?;
            let sandbox = Self {
                repo: base.join("sync"),
                root: base.join("project"),
            };
            create_dir_all(sandbox.repo.join("projects"))?;
            create_dir_all(&sandbox.root)?;

            Ok(sandbox)
        }

        pub(crate) fn layout(&self, topology: Topology) -> Layout {
            Layout::new(
                topology,
                &self.repo,
                self.repo.join("projects").join("demo"),
                &self.root,
            )
        }

        pub(crate) fn plant(&self, relative: &str, contents: &str) -> anyhow::Result<()> {
            let path = self.root.join(relative);
            create_dir_all(path.parent().unwrap())?;
            write(path, contents)?;
            Ok(())
        }
    }

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[sealed_test]
    fn create_then_verify_link_in_repository() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("CLAUDE.local.md", "top")?;
        sandbox.plant("a/b/CLAUDE.local.md", "nested")?;
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());

        let files = paths(&["CLAUDE.local.md", "a/b/CLAUDE.local.md"]);
        let batch = linker.create_links(files.iter().map(PathBuf::as_path), FailurePolicy::Continue);
        assert!(batch.is_clean());
        assert_eq!(batch.paths, files);

        for file in &files {
            let layout = linker.layout();
            assert!(verify_link(layout.link_path(file), layout.target_path(file)));
        }
        let slot = sandbox.repo.join("projects/demo");
        assert_eq!(read_to_string(slot.join("a/b/CLAUDE.local.md"))?, "nested");

        Ok(())
    }

    #[sealed_test]
    fn create_then_verify_move_and_link() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("CLAUDE.local.md", "top")?;
        let linker = Linker::new(sandbox.layout(Topology::MoveAndLink), CollectReport::new());

        let rel = Path::new("CLAUDE.local.md");
        linker.create_link(rel)?;

        let slot_file = sandbox.repo.join("projects/demo/CLAUDE.local.md");
        assert!(symlink_metadata(&slot_file)?.file_type().is_file());
        assert!(verify_link(sandbox.root.join(rel), &slot_file));
        assert_eq!(read_to_string(sandbox.root.join(rel))?, "top");

        // Linking again is a no-op.
        linker.create_link(rel)?;
        assert!(verify_link(sandbox.root.join(rel), &slot_file));

        Ok(())
    }

    #[sealed_test]
    fn move_and_link_repairs_stale_link_to_slot_file() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let slot = sandbox.repo.join("projects/demo");
        create_dir_all(&slot)?;
        write(slot.join("CLAUDE.local.md"), "kept")?;
        symlink("/nowhere/else", sandbox.root.join("CLAUDE.local.md"))?;

        let linker = Linker::new(sandbox.layout(Topology::MoveAndLink), CollectReport::new());
        linker.create_link(Path::new("CLAUDE.local.md"))?;

        let in_project = sandbox.root.join("CLAUDE.local.md");
        assert!(verify_link(&in_project, slot.join("CLAUDE.local.md")));
        assert_eq!(read_to_string(&in_project)?, "kept");

        // Missing link is put back as well.
        std::fs::remove_file(&in_project)?;
        linker.create_link(Path::new("CLAUDE.local.md"))?;
        assert_eq!(read_to_string(&in_project)?, "kept");

        Ok(())
    }

    #[sealed_test]
    fn create_refuses_to_clobber_real_file() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("CLAUDE.local.md", "mine")?;
        let slot = sandbox.repo.join("projects/demo");
        create_dir_all(&slot)?;
        write(slot.join("CLAUDE.local.md"), "precious")?;

        let report = CollectReport::new();
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), &report);
        let batch = linker.create_links([Path::new("CLAUDE.local.md")], FailurePolicy::Continue);

        assert!(batch.paths.is_empty());
        assert!(matches!(batch.failures[0], LinkError::NotALink { .. }));
        assert_eq!(batch.failures[0].path(), Path::new("CLAUDE.local.md"));
        assert_eq!(read_to_string(slot.join("CLAUDE.local.md"))?, "precious");
        assert_eq!(report.messages(Level::Warn).len(), 1);

        Ok(())
    }

    #[sealed_test]
    fn create_replaces_stale_link() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("CLAUDE.local.md", "mine")?;
        let slot = sandbox.repo.join("projects/demo");
        create_dir_all(&slot)?;
        symlink("/nowhere/else", slot.join("CLAUDE.local.md"))?;

        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());
        linker.create_link(Path::new("CLAUDE.local.md"))?;
        assert!(verify_link(
            slot.join("CLAUDE.local.md"),
            sandbox.root.join("CLAUDE.local.md")
        ));

        Ok(())
    }

    #[sealed_test]
    fn abort_policy_stops_batch() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("b.md", "b")?;
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());

        let files = [Path::new("a.md"), Path::new("b.md")];
        let batch = linker.create_links(files, FailurePolicy::Abort);
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.paths.is_empty());

        let batch = linker.create_links(files, FailurePolicy::Continue);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.paths, paths(&["b.md"]));

        Ok(())
    }

    #[sealed_test]
    fn unlink_prunes_empty_directories_only() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("a/b/one.md", "1")?;
        sandbox.plant("a/two.md", "2")?;
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());
        let files = paths(&["a/b/one.md", "a/two.md"]);
        linker.create_links(files.iter().map(PathBuf::as_path), FailurePolicy::Continue);

        let slot = sandbox.repo.join("projects/demo");
        write(slot.join("a/keep.txt"), "stranger")?;

        let batch = linker.unlink_paths(files.iter().map(PathBuf::as_path));
        assert_eq!(batch.paths, files);
        assert!(!slot.join("a/b").exists());
        assert!(slot.join("a/keep.txt").exists());
        assert!(sandbox.root.join("a/b/one.md").exists());

        Ok(())
    }

    #[sealed_test]
    fn unlink_move_and_link_restores_file() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("sub/CLAUDE.local.md", "moved")?;
        let linker = Linker::new(sandbox.layout(Topology::MoveAndLink), CollectReport::new());
        let rel = Path::new("sub/CLAUDE.local.md");
        linker.create_link(rel)?;

        assert!(linker.unlink(rel)?);
        let restored = sandbox.root.join(rel);
        assert!(symlink_metadata(&restored)?.file_type().is_file());
        assert_eq!(read_to_string(&restored)?, "moved");
        assert!(!sandbox.repo.join("projects/demo").exists());
        assert!(sandbox.repo.join("projects").exists());

        // Second unlink has nothing to do.
        assert!(!linker.unlink(rel)?);

        Ok(())
    }

    #[sealed_test]
    fn unlink_refuses_real_file() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let slot = sandbox.repo.join("projects/demo");
        create_dir_all(&slot)?;
        write(slot.join("x.md"), "real")?;

        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());
        let result = linker.unlink(Path::new("x.md"));
        assert!(matches!(result, Err(LinkError::NotALink { .. })));
        assert!(slot.join("x.md").exists());

        Ok(())
    }

    #[sealed_test]
    fn verify_link_is_byte_exact() -> anyhow::Result<()> {
        let base = std::env::current_dir()?;
        write(base.join("real.md"), "x")?;
        symlink("real.md", base.join("relative"))?;
        symlink(base.join("real.md"), base.join("absolute"))?;

        assert!(verify_link(base.join("absolute"), base.join("real.md")));
        assert!(!verify_link(base.join("relative"), base.join("real.md")));
        assert!(!verify_link(base.join("real.md"), base.join("real.md")));
        assert!(!verify_link(base.join("missing"), base.join("real.md")));

        Ok(())
    }
}
