// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tracked file discovery.
//!
//! Walks a project tree and reports every regular file that matches the
//! inclusion patterns, and does not match the exclusion patterns. Excluded
//! directories are pruned before descending into them, so large dependency
//! directories like "node_modules" never get read.

use crate::{
    path::{relative_to, slash_path},
    pattern::PatternSet,
};

use ignore::WalkBuilder;
use std::{
    collections::BTreeMap,
    fs::symlink_metadata,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// Candidate file found by discovery.
///
/// Ephemeral record. Produced by a scan, consumed right away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file.
    pub absolute_path: PathBuf,

    /// Path relative to the scan root.
    pub relative_path: PathBuf,

    /// Size in bytes.
    pub size: u64,

    /// Last modification time.
    pub modified_at: SystemTime,
}

impl FileRecord {
    /// Build record for file at `relative_path` under `root`.
    ///
    /// Returns [`None`] if the entry does not exist or is not a regular file.
    /// Links are never candidates, they are what projsync creates.
    pub fn probe(root: impl AsRef<Path>, relative_path: impl AsRef<Path>) -> Option<Self> {
        let absolute_path = root.as_ref().join(relative_path.as_ref());
        let metadata = symlink_metadata(&absolute_path).ok()?;
        if !metadata.file_type().is_file() {
            return None;
        }

        Some(Self {
            absolute_path,
            relative_path: relative_path.as_ref().to_path_buf(),
            size: metadata.len(),
            modified_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }
}

/// Scan project tree for candidate files.
///
/// Result is duplicate free, and sorted lexicographically by relative path.
/// Missing files and unreadable entries are silently skipped.
pub fn scan(
    root: impl AsRef<Path>,
    include: impl IntoIterator<Item = impl AsRef<str>>,
    exclude: impl IntoIterator<Item = impl AsRef<str>>,
) -> Vec<FileRecord> {
    scan_with(root, &PatternSet::new(include, exclude))
}

/// Scan project tree with precompiled pattern set.
pub fn scan_with(root: impl AsRef<Path>, patterns: &PatternSet) -> Vec<FileRecord> {
    let root = root.as_ref();
    let mut found = BTreeMap::new();

    // INVARIANT: Exact literals are probed directly, no walk needed.
    for literal in patterns.literals() {
        if patterns.is_excluded(literal) {
            continue;
        }

        if let Some(record) = FileRecord::probe(root, literal) {
            found.insert(slash_path(&record.relative_path), record);
        }
    }

    if patterns.needs_walk() && root.is_dir() {
        let pruner = patterns.clone();
        let walk = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                // INVARIANT: Never prune the walk root itself.
                entry.depth() == 0
                    || !pruner.excludes_segment(entry.file_name().to_string_lossy().as_ref())
            })
            .build();

        for entry in walk.filter_map(|entry| entry.ok()) {
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }

            let Some(relative) = relative_to(root, entry.path()) else {
                continue;
            };

            let key = slash_path(&relative);
            if found.contains_key(&key) || !patterns.matches(&key) {
                continue;
            }

            if let Some(record) = FileRecord::probe(root, &relative) {
                found.insert(key, record);
            }
        }
    }

    found.into_values().collect()
}
