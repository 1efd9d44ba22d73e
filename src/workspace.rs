// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Watched directory preparation.
//!
//! Before watching starts, the watched directory needs an archive store and
//! an ignore file that keeps archives, the archive store, scratch directories
//! and bundlesync's own settings out of the repository.

use crate::{config::Settings, extract::SCRATCH_PREFIX, path::CONFIG_FILE_NAME};

use std::{
    fs::OpenOptions,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Render ignore file contents for given settings.
pub fn gitignore_contents(settings: &Settings) -> String {
    let store = settings.archive.store.to_string_lossy();
    let store = store.trim_end_matches('/');
    [
        format!("{store}/"),
        format!("*.{}", settings.archive.extension),
        CONFIG_FILE_NAME.to_string(),
        format!("{SCRATCH_PREFIX}*/"),
        ".bolt".to_string(),
        "*.DS_Store".to_string(),
        "node_modules/".to_string(),
    ]
    .join("\n")
}

/// Watched directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    store: PathBuf,
    gitignore: String,
}

impl Workspace {
    /// Construct new workspace from settings.
    pub fn new(settings: &Settings) -> Self {
        Self {
            root: settings.project.root.clone(),
            store: settings.store_dir(),
            gitignore: gitignore_contents(settings),
        }
    }

    /// Path to watched directory.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Create archive store and ignore file if missing.
    ///
    /// An existing ignore file is left untouched.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::CreateDir`] if directories cannot be made.
    /// - Return [`WorkspaceError::WriteGitignore`] if ignore file cannot be
    ///   written.
    #[instrument(skip(self), level = "debug")]
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.root, &self.store] {
            mkdirp::mkdirp(dir).map_err(|err| WorkspaceError::CreateDir {
                source: err,
                path: dir.clone(),
            })?;
        }

        let gitignore = self.root.join(".gitignore");
        let result = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&gitignore);
        let mut file = match result {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!("keep existing {:?}", gitignore.display());
                return Ok(());
            }
            Err(err) => {
                return Err(WorkspaceError::WriteGitignore {
                    source: err,
                    path: gitignore,
                })
            }
        };

        file.write_all(self.gitignore.as_bytes())
            .map_err(|err| WorkspaceError::WriteGitignore {
                source: err,
                path: gitignore.clone(),
            })?;

        Ok(())
    }
}

/// Workspace preparation error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Ignore file cannot be written.
    #[error("failed to write ignore file {:?}", path.display())]
    WriteGitignore {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
