// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the settings file that bundlesync uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

/// Placeholder in the remote URL template replaced by the project name.
pub const PROJECT_PLACEHOLDER: &str = "{project}";

/// Settings layout.
///
/// # General Layout
///
/// Settings are split into sections that mirror the stages bundlesync runs
/// through for each archive: what to watch for, what to keep during
/// extraction, and where to push afterwards. Every section falls back to
/// sensible defaults, so an empty file is valid.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Project identity and location.
    pub project: ProjectSettings,

    /// Archive detection and storage.
    pub archive: ArchiveSettings,

    /// Extraction behavior.
    pub extract: ExtractSettings,

    /// Remote repository to push to.
    pub remote: RemoteSettings,

    /// Identity used for commits.
    pub committer: Committer,

    /// Status line behavior.
    pub status: StatusSettings,
}

impl Settings {
    /// Absolute or relative path to the archive store.
    pub fn store_dir(&self) -> PathBuf {
        self.project.root.join(&self.archive.store)
    }

    /// Remote URL with the project name filled in.
    pub fn remote_url(&self) -> String {
        self.remote.url.replace(PROJECT_PLACEHOLDER, &self.project.name)
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on project root field.
        settings.project.root = PathBuf::from(
            shellexpand::full(settings.project.root.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Project identity and location.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Name used for archive store entries and the remote URL.
    pub name: String,

    /// Directory to watch, extract into, and commit.
    pub root: PathBuf,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            root: PathBuf::from("."),
        }
    }
}

/// Archive detection and storage.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// File extension that marks a created file as a bundle, without the dot.
    pub extension: String,

    /// Archive store directory, relative to project root.
    pub store: PathBuf,

    /// Pause before reading a freshly created bundle.
    pub settle_millis: u64,
}

impl ArchiveSettings {
    /// Pause before reading a freshly created bundle.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            extension: "zip".into(),
            store: PathBuf::from("archive"),
            settle_millis: 250,
        }
    }
}

/// Extraction behavior.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractSettings {
    /// Base name patterns that extraction must never touch.
    pub preserve: Vec<String>,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            preserve: vec![
                ".env".into(),
                crate::path::CONFIG_FILE_NAME.into(),
                ".git".into(),
                ".gitignore".into(),
            ],
        }
    }
}

/// Remote repository to push to.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// URL template, where "{project}" is replaced by the project name.
    pub url: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: format!("git@github.com:bundlesync/{PROJECT_PLACEHOLDER}.git"),
        }
    }
}

/// Identity used for commits.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Default for Committer {
    fn default() -> Self {
        Self {
            name: "bundlesync".into(),
            email: "bundlesync@localhost".into(),
        }
    }
}

/// Status line behavior.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusSettings {
    /// Spinner redraw interval.
    pub tick_millis: u64,
}

impl StatusSettings {
    /// Spinner redraw interval.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self { tick_millis: 100 }
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
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
