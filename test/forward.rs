// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{block_on, open_store, ProjectFixture};

use anyhow::Result;
use pretty_assertions::assert_eq;
use projsync::{
    forward::{current_project, Forwarder},
    repo::SyncRepo,
};
use sealed_test::prelude::*;
use std::{env::current_dir, ffi::OsString};

fn os(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

#[sealed_test]
fn status_is_narrowed_inside_tracked_project() -> Result<()> {
    let project = ProjectFixture::new(current_dir()?.join("app"), None)?;
    project.write("src/lib.rs", "")?;
    let mut store = open_store(None)?;
    block_on(store.init_project(project.root(), None))??;

    let current = current_project(project.root().join("src"), store.registry())
        .map(|project| SyncRepo::relative_slot(&project.name));
    assert_eq!(current.as_deref(), Some("projects/app"));

    let forwarder = Forwarder::new(store.root());
    let args = os(&["status", "--short"]);
    let plan = forwarder.classify(args.first().map(OsString::as_os_str), &args, current.as_deref());
    assert_eq!(plan.args, os(&["status", "--short", "--", "projects/app"]));
    assert_eq!(plan.working_dir, store.root());

    let args = os(&["commit", "-m", "sync"]);
    let plan = forwarder.classify(args.first().map(OsString::as_os_str), &args, current.as_deref());
    assert_eq!(plan.args, args);

    Ok(())
}

#[sealed_test]
fn untracked_directory_has_no_current_project() -> Result<()> {
    let other = ProjectFixture::new(current_dir()?.join("other"), None)?;
    let store = open_store(None)?;

    assert!(current_project(other.root(), store.registry()).is_none());
    assert!(current_project(current_dir()?, store.registry()).is_none());

    Ok(())
}

#[sealed_test]
fn forwarded_exit_code_passes_through() -> Result<()> {
    let store = open_store(None)?;
    let forwarder = Forwarder::new(store.root());

    let args = os(&["log", "--oneline"]);
    let plan = forwarder.classify(args.first().map(OsString::as_os_str), &args, None);
    let output = plan.output()?;
    assert!(output.success());
    assert!(output.stdout.contains("chore: add projsync.toml"));

    let args = os(&["rev-parse", "--verify", "nope"]);
    let plan = forwarder.classify(args.first().map(OsString::as_os_str), &args, None);
    let output = plan.output()?;
    assert_eq!(output.code, 128);
    assert!(!output.stderr.is_empty());
    assert_eq!(plan.run()?, 128);

    Ok(())
}

#[sealed_test]
fn store_forwards_from_project_subdirectory() -> Result<()> {
    let project = ProjectFixture::new(current_dir()?.join("app"), None)?;
    project.write("src/lib.rs", "")?;
    let mut store = open_store(None)?;
    block_on(store.init_project(project.root(), None))??;

    assert_eq!(store.forward(project.root().join("src"), &os(&["status"]))?, 0);
    assert_eq!(store.forward(project.root().join("src"), &[])?, 0);
    assert_eq!(
        store.forward(project.root(), &os(&["rev-parse", "--verify", "nope"]))?,
        128
    );

    Ok(())
}
