// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep per-project local files in one centralized Git repository.
//!
//! Files like `CLAUDE.local.md` are meant to stay out of a project's own
//! history, yet they are worth versioning. Projsync tracks them inside a
//! single __centralized repository__ that holds one __slot__ directory per
//! project, and keeps both places connected through symbolic links:
//!
//! - __link-in-repository__: real files stay in the project, and the slot
//!   holds links pointing back at them.
//! - __move-and-link__: real files move into the slot, and the project holds
//!   links pointing into the centralized repository.
//!
//! The topology is chosen once, when the centralized repository gets
//! initialized. Git commands are forwarded to the centralized repository, and
//! narrowed to the slot of the current project where that makes sense.

pub mod config;
pub mod discover;
pub mod forward;
pub mod link;
pub mod path;
pub mod pattern;
pub mod registry;
pub mod repo;
pub mod report;
pub mod store;

pub use config::{SyncSettings, Topology, UserConfig};
pub use link::{ChangeSet, LinkState};
pub use store::Store;
