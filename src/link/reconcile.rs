// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconcile declared tracked files with actual link state.
//!
//! Every tracked path is classified into a [`LinkState`] by looking at the
//! entry where its link should live. Reconciliation then applies the smallest
//! set of changes that makes observed state match the tracked file list:
//!
//! | State        | Action                                             |
//! |--------------|----------------------------------------------------|
//! | orphan link  | removed                                            |
//! | `Missing`    | added, if the real file exists                     |
//! | `Stale`      | updated (removed and recreated)                    |
//! | `NotALink`   | left alone, reported as anomaly                    |
//! | `Dangling`   | left alone, reported as anomaly                    |
//! | `Correct`    | nothing                                            |
//!
//! Running reconciliation twice without touching the file system in between
//! yields an empty change set the second time.

use crate::{
    link::{is_file, verify_link, LinkBatch, LinkError, Linker},
    path::relative_to,
    registry::TrackedProject,
    report::Report,
};

use ignore::WalkBuilder;
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{metadata, symlink_metadata},
    path::{Path, PathBuf},
};

/// Observed state of one tracked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    /// Nothing at link location.
    Missing,

    /// Link with expected target that resolves.
    Correct,

    /// Link with expected target that no longer resolves.
    Dangling,

    /// Link with some other target.
    Stale,

    /// Real file or directory at link location.
    NotALink,
}

impl Display for LinkState {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Missing => "missing",
            Self::Correct => "linked",
            Self::Dangling => "dangling",
            Self::Stale => "stale",
            Self::NotALink => "not-a-link",
        };
        fmt.write_str(name)
    }
}

/// Drift that reconciliation reports instead of fixing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub path: PathBuf,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    /// Real file occupies the link location.
    NotALink,

    /// Link points at a real file that is gone.
    Dangling,

    /// Nothing to link against.
    SourceMissing,
}

impl Display for Anomaly {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let path = self.path.display();
        match self.kind {
            AnomalyKind::NotALink => write!(fmt, "{path} is occupied by a file that is not a link"),
            AnomalyKind::Dangling => write!(fmt, "{path} is linked, but its real file is gone"),
            AnomalyKind::SourceMissing => write!(fmt, "{path} is tracked, but has no file to link"),
        }
    }
}

/// Changes applied by reconciliation.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Links created for tracked paths.
    pub added: Vec<PathBuf>,

    /// Orphaned links removed.
    pub removed: Vec<PathBuf>,

    /// Stale links recreated.
    pub updated: Vec<PathBuf>,

    /// Drift left untouched.
    pub anomalies: Vec<Anomaly>,

    /// Operations that failed.
    pub failures: Vec<LinkError>,
}

impl ChangeSet {
    /// No link was added, removed, or updated.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

impl<R> Linker<R>
where
    R: Report,
{
    /// Classify link state of one tracked path.
    pub fn inspect(&self, relative_path: impl AsRef<Path>) -> LinkState {
        let link = self.layout.link_path(relative_path.as_ref());
        let Ok(entry) = symlink_metadata(&link) else {
            return LinkState::Missing;
        };

        if !entry.file_type().is_symlink() {
            return LinkState::NotALink;
        }

        if !verify_link(&link, self.layout.target_path(relative_path.as_ref())) {
            return LinkState::Stale;
        }

        match metadata(&link) {
            Ok(_) => LinkState::Correct,
            Err(_) => LinkState::Dangling,
        }
    }

    /// Make link state match tracked file list of `project`.
    pub fn reconcile(&self, project: &TrackedProject) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let tracked = &project.tracked_files;

        for orphan in self.present_entries().difference(tracked) {
            match self.unlink(orphan) {
                Ok(true) => {
                    self.report
                        .info(format!("removed orphan {}", orphan.display()));
                    changes.removed.push(orphan.clone());
                }
                Ok(false) => {}
                Err(error) => {
                    self.report.warn(error.to_string());
                    changes.failures.push(error);
                }
            }
        }

        for relative_path in tracked {
            let state = self.inspect(relative_path);
            let has_source = is_file(&self.layout.target_path(relative_path));
            let anomaly = match state {
                LinkState::Correct => None,
                LinkState::Dangling => Some(AnomalyKind::Dangling),
                LinkState::NotALink => Some(AnomalyKind::NotALink),
                LinkState::Missing | LinkState::Stale if !has_source => {
                    Some(AnomalyKind::SourceMissing)
                }
                LinkState::Missing | LinkState::Stale => {
                    match self.place_link(relative_path) {
                        Ok(()) if state == LinkState::Missing => {
                            changes.added.push(relative_path.clone())
                        }
                        Ok(()) => changes.updated.push(relative_path.clone()),
                        Err(error) => {
                            self.report.warn(error.to_string());
                            changes.failures.push(error);
                        }
                    }
                    None
                }
            };

            if let Some(kind) = anomaly {
                let anomaly = Anomaly {
                    path: relative_path.clone(),
                    kind,
                };
                self.report.warn(format!("{}: {anomaly}", project.name));
                changes.anomalies.push(anomaly);
            }
        }

        changes
    }

    /// Remove every tracked link of `project`.
    pub fn remove_links(&self, project: &TrackedProject) -> LinkBatch {
        self.unlink_paths(project.tracked_files.iter().map(PathBuf::as_path))
    }

    /// Entries in the slot that projsync manages.
    ///
    /// Links when the slot holds links, real files when it holds the real
    /// files.
    fn present_entries(&self) -> BTreeSet<PathBuf> {
        let slot = self.layout.slot();
        if !slot.is_dir() {
            return BTreeSet::new();
        }

        let links_in_slot = self.layout.link_dir() == slot;
        WalkBuilder::new(slot)
            .standard_filters(false)
            .follow_links(false)
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_some_and(|kind| {
                    if links_in_slot {
                        kind.is_symlink()
                    } else {
                        kind.is_file()
                    }
                })
            })
            .filter_map(|entry| relative_to(slot, entry.path()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Topology,
        link::{tests::Sandbox, FailurePolicy},
        report::{CollectReport, Level},
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        fs::{create_dir_all, read_to_string, remove_file, write},
        os::unix::fs::symlink,
    };

    fn project(sandbox: &Sandbox, tracked: &[&str]) -> TrackedProject {
        let now = Utc::now();
        TrackedProject {
            name: "demo".into(),
            root_path: sandbox.root.clone(),
            remote: None,
            branch: "main".into(),
            tracked_files: tracked.iter().map(PathBuf::from).collect(),
            metadata: crate::registry::ProjectMetadata {
                added_at: now,
                last_sync: None,
                last_modified: now,
            },
        }
    }

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[sealed_test]
    fn reconcile_adds_missing_and_is_idempotent() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("CLAUDE.local.md", "x")?;
        sandbox.plant("a/CLAUDE.local.md", "y")?;
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());
        let demo = project(&sandbox, &["CLAUDE.local.md", "a/CLAUDE.local.md"]);

        let first = linker.reconcile(&demo);
        assert_eq!(first.added, paths(&["CLAUDE.local.md", "a/CLAUDE.local.md"]));
        assert!(first.removed.is_empty() && first.updated.is_empty());

        let second = linker.reconcile(&demo);
        assert!(second.is_empty());
        assert!(second.anomalies.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn reconcile_removes_exactly_the_orphan() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("keep.md", "k")?;
        sandbox.plant("old/drop.md", "d")?;
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());
        let both = project(&sandbox, &["keep.md", "old/drop.md"]);
        linker.reconcile(&both);

        let kept = project(&sandbox, &["keep.md"]);
        let changes = linker.reconcile(&kept);
        assert_eq!(changes.removed, paths(&["old/drop.md"]));
        assert!(changes.added.is_empty() && changes.updated.is_empty());

        let slot = sandbox.layout(Topology::LinkInRepository).slot().to_path_buf();
        assert!(!slot.join("old").exists());
        assert_eq!(linker.inspect("keep.md"), LinkState::Correct);
        assert!(sandbox.root.join("old/drop.md").exists());

        Ok(())
    }

    #[sealed_test]
    fn reconcile_updates_stale_link() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("CLAUDE.local.md", "x")?;
        let layout = sandbox.layout(Topology::LinkInRepository);
        create_dir_all(layout.slot())?;
        symlink(sandbox.root.join("elsewhere.md"), layout.link_path("CLAUDE.local.md"))?;

        let linker = Linker::new(layout, CollectReport::new());
        assert_eq!(linker.inspect("CLAUDE.local.md"), LinkState::Stale);

        let changes = linker.reconcile(&project(&sandbox, &["CLAUDE.local.md"]));
        assert_eq!(changes.updated, paths(&["CLAUDE.local.md"]));
        assert_eq!(linker.inspect("CLAUDE.local.md"), LinkState::Correct);

        Ok(())
    }

    #[sealed_test]
    fn reconcile_never_deletes_real_file_in_slot() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("CLAUDE.local.md", "mine")?;
        let layout = sandbox.layout(Topology::LinkInRepository);
        create_dir_all(layout.slot())?;
        write(layout.link_path("CLAUDE.local.md"), "precious")?;

        let report = CollectReport::new();
        let linker = Linker::new(layout.clone(), &report);
        let changes = linker.reconcile(&project(&sandbox, &["CLAUDE.local.md"]));

        assert!(changes.is_empty());
        assert_eq!(
            changes.anomalies,
            vec![Anomaly {
                path: PathBuf::from("CLAUDE.local.md"),
                kind: AnomalyKind::NotALink,
            }]
        );
        assert_eq!(read_to_string(layout.link_path("CLAUDE.local.md"))?, "precious");
        assert_eq!(report.messages(Level::Warn).len(), 1);

        Ok(())
    }

    #[sealed_test]
    fn reconcile_reports_dangling_link_without_changes() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("CLAUDE.local.md", "x")?;
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());
        let demo = project(&sandbox, &["CLAUDE.local.md"]);
        let batch = linker.create_links([Path::new("CLAUDE.local.md")], FailurePolicy::Continue);
        assert!(batch.is_clean());

        remove_file(sandbox.root.join("CLAUDE.local.md"))?;
        let changes = linker.reconcile(&demo);
        assert!(changes.is_empty());
        assert_eq!(changes.anomalies[0].kind, AnomalyKind::Dangling);
        assert_eq!(linker.inspect("CLAUDE.local.md"), LinkState::Dangling);

        Ok(())
    }

    #[sealed_test]
    fn reconcile_missing_source_is_anomaly() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());
        let changes = linker.reconcile(&project(&sandbox, &["ghost.md"]));

        assert!(changes.is_empty());
        assert_eq!(changes.anomalies[0].kind, AnomalyKind::SourceMissing);

        Ok(())
    }

    #[sealed_test]
    fn reconcile_move_and_link_relinks_and_restores_orphans() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("keep.md", "k")?;
        sandbox.plant("drop.md", "d")?;
        let linker = Linker::new(sandbox.layout(Topology::MoveAndLink), CollectReport::new());
        let batch = linker.create_links(
            [Path::new("keep.md"), Path::new("drop.md")],
            FailurePolicy::Continue,
        );
        assert!(batch.is_clean());

        // Link left behind in the project got deleted by hand.
        remove_file(sandbox.root.join("keep.md"))?;
        let changes = linker.reconcile(&project(&sandbox, &["keep.md"]));

        assert_eq!(changes.added, paths(&["keep.md"]));
        assert_eq!(changes.removed, paths(&["drop.md"]));
        assert_eq!(read_to_string(sandbox.root.join("keep.md"))?, "k");
        assert!(symlink_metadata(sandbox.root.join("drop.md"))?.file_type().is_file());
        assert_eq!(read_to_string(sandbox.root.join("drop.md"))?, "d");

        let again = linker.reconcile(&project(&sandbox, &["keep.md"]));
        assert!(again.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn remove_links_clears_slot() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.plant("a/b/c.md", "c")?;
        let linker = Linker::new(sandbox.layout(Topology::LinkInRepository), CollectReport::new());
        let demo = project(&sandbox, &["a/b/c.md"]);
        linker.reconcile(&demo);

        let batch = linker.remove_links(&demo);
        assert_eq!(batch.paths, paths(&["a/b/c.md"]));
        assert!(!linker.layout().slot().exists());
        assert!(sandbox.root.join("a/b/c.md").exists());

        Ok(())
    }
}
