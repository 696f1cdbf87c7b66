// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod forward;

use anyhow::Result;
use git2::{IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use mkdirp::mkdirp;
use projsync::{config::Topology, report::CollectReport, Store};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Project work tree to be tracked by the centralized repository.
pub(crate) struct ProjectFixture {
    root: PathBuf,
    repo: Repository,
}

impl ProjectFixture {
    pub(crate) fn new(path: impl AsRef<Path>, remote: Option<&str>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        if let Some(url) = remote {
            repo.remote("origin", url)?;
        }

        Ok(Self {
            root: path.as_ref().to_path_buf(),
            repo,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Write untracked local file into work tree.
    pub(crate) fn write(&self, relative: impl AsRef<Path>, contents: &str) -> Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            mkdirp(parent)?;
        }
        fs::write(path, contents)?;

        Ok(())
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename.as_ref().to_string_lossy().into_owned().into_bytes(),
        };

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let signature = self.repo.signature()?;
        let parents = match self.repo.head().ok().and_then(|head| head.target()) {
            Some(parent) => vec![self.repo.find_commit(parent)?],
            None => Vec::new(),
        };
        let parents = parents.iter().collect::<Vec<_>>();

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }
}

/// Centralized repository under current directory, collecting reports.
pub(crate) fn open_store(topology: Option<Topology>) -> Result<Store<CollectReport>> {
    let path = std::env::current_dir()?.join("sync");
    Ok(Store::open_or_init(path, topology, CollectReport::new())?)
}

/// Drive async store operation to completion.
pub(crate) fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    Ok(tokio::runtime::Runtime::new()?.block_on(future))
}
