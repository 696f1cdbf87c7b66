// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way. Also houses the small set of
//! path normalization helpers shared by the link reconciler and the command
//! forwarder.

use std::path::{Component, Path, PathBuf};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the centralized repository.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/projsync-store` as the
/// default. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if data directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_sync_repo_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("projsync-store"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the user configuration file.
///
/// Uses `$XDG_CONFIG_HOME/projsync/config.toml`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("projsync").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Anchor a possibly relative path at `base`.
///
/// Lexically removes `.` and resolves `..` components without touching the
/// file system, so the result is stable even if the path does not exist.
pub fn absolutize(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.as_ref().join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}

/// Canonicalize path if it exists, otherwise normalize it lexically.
pub fn canonical_or_lexical(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    std::fs::canonicalize(path).unwrap_or_else(|_| match std::env::current_dir() {
        Ok(cwd) => absolutize(cwd, path),
        Err(_) => path.to_path_buf(),
    })
}

/// Render relative path with forward slashes.
///
/// Git pathspecs and glob patterns both expect `/` as separator regardless
/// of platform.
pub fn slash_path(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Make `path` relative to `root` if it lives underneath it.
pub fn relative_to(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Option<PathBuf> {
    path.as_ref()
        .strip_prefix(root.as_ref())
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
