// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration files that projsync uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! There are two files in play:
//!
//! 1. The __user configuration__ at `$XDG_CONFIG_HOME/projsync/config.toml`,
//!    which only tells projsync where the centralized repository lives.
//! 2. The __sync manifest__ at the top-level of the centralized repository
//!    named "projsync.toml". It holds repository-wide settings, and the
//!    registry of every tracked project. Because it lives inside the
//!    centralized repository, it is versioned along with the tracked files.

use crate::registry::TrackedProject;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Name of sync manifest at top-level of centralized repository.
pub const MANIFEST_FILE: &str = "projsync.toml";

/// User configuration layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    /// Path to centralized repository.
    pub sync_repo: Option<PathBuf>,

    /// Emit debug level logs by default.
    #[serde(default)]
    pub verbose: bool,
}

impl FromStr for UserConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: UserConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on centralized repository path.
        if let Some(path) = config.sync_repo.take() {
            let expanded = shellexpand::full(path.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();
            config.sync_repo = Some(PathBuf::from(expanded));
        }

        Ok(config)
    }
}

/// Sync manifest layout.
///
/// Composed of two parts: repository-wide settings, and the project
/// registry. Project names are the keys of the `projects` table, so each
/// [`TrackedProject`] gets its name filled in from its key after parsing.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncManifest {
    /// Settings for the centralized repository.
    pub settings: SyncSettings,

    /// Every tracked project keyed by name.
    #[serde(default)]
    pub projects: BTreeMap<String, TrackedProject>,
}

impl FromStr for SyncManifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: SyncManifest =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Project name always mirrors its registry key.
        for (name, project) in manifest.projects.iter_mut() {
            project.name = name.clone();
        }

        Ok(manifest)
    }
}

impl Display for SyncManifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Repository-wide settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
    /// Link topology used for every project and every file.
    pub topology: Topology,

    /// Default inclusion patterns for file discovery.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Default exclusion patterns for file discovery.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            include: default_include(),
            exclude: default_exclude(),
        }
    }
}

fn default_include() -> Vec<String> {
    vec![
        "CLAUDE.local.md".into(),
        "**/CLAUDE.local.md".into(),
        ".claude/settings.local.json".into(),
    ]
}

fn default_exclude() -> Vec<String> {
    vec![
        ".git".into(),
        "node_modules".into(),
        "target".into(),
        "vendor".into(),
        "dist".into(),
        "build".into(),
    ]
}

/// Link topology.
///
/// Chosen once when the centralized repository is initialized. Mixing
/// topologies would make the tracked file list ambiguous, so there is no
/// way to pick one per file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Real file stays in project, link lives in project slot.
    #[default]
    LinkInRepository,

    /// Real file moves into project slot, link left in project.
    MoveAndLink,
}

impl Display for Topology {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::LinkInRepository => fmt.write_str("link-in-repository"),
            Self::MoveAndLink => fmt.write_str("move-and-link"),
        }
    }
}

impl FromStr for Topology {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "link-in-repository" => Ok(Self::LinkInRepository),
            "move-and-link" => Ok(Self::MoveAndLink),
            other => Err(ConfigError::UnknownTopology(other.into())),
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Topology name not recognized.
    #[error("unknown link topology {0:?}, expected \"link-in-repository\" or \"move-and-link\"")]
    UnknownTopology(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
