// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive store management.
//!
//! Processed bundles are moved into the __archive store__, a directory nested
//! inside the watched directory. Each bundle is renamed to
//! `<project>-v<N>.<ext>` on the way in. The archive store is append-only:
//! existing entries are never overwritten, renamed, or removed.

use crate::version::Version;

use std::{
    fs::{copy, remove_file, rename, symlink_metadata},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Name of archive store entry for a given project and version.
pub fn stored_archive_name(project: &str, version: Version, extension: &str) -> String {
    format!("{project}-v{}.{extension}", version.get())
}

/// Move processed bundles into the archive store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archiver {
    store_dir: PathBuf,
    project: String,
}

impl Archiver {
    /// Construct new archiver.
    pub fn new(store_dir: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            store_dir: store_dir.into(),
            project: project.into(),
        }
    }

    /// Path to the archive store.
    pub fn store_dir(&self) -> &Path {
        self.store_dir.as_path()
    }

    /// Move bundle into archive store under given version.
    ///
    /// Creates the archive store if it does not exist yet. The extension of
    /// the source file is carried over to the stored name.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::CreateStore`] if store cannot be created.
    /// - Return [`ArchiveError::Occupied`] if versioned name already exists.
    /// - Return [`ArchiveError::Move`] if bundle cannot be moved.
    #[instrument(skip(self, src), level = "debug")]
    pub fn archive(&self, src: impl AsRef<Path>, version: Version) -> Result<PathBuf> {
        let src = src.as_ref();
        mkdirp::mkdirp(&self.store_dir).map_err(|err| ArchiveError::CreateStore {
            source: err,
            path: self.store_dir.clone(),
        })?;

        let extension = src
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = self
            .store_dir
            .join(stored_archive_name(&self.project, version, &extension));

        // INVARIANT: The archive store is append-only.
        if symlink_metadata(&dest).is_ok() {
            return Err(ArchiveError::Occupied { path: dest });
        }

        debug!("move {:?} to {:?}", src.display(), dest.display());
        move_file(src, &dest).map_err(|err| ArchiveError::Move {
            source: err,
            from: src.to_path_buf(),
            to: dest.clone(),
        })?;

        Ok(dest)
    }
}

// Rename when possible, copy and remove when the store sits on another device.
fn move_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    let Err(err) = rename(src, dest) else {
        return Ok(());
    };

    // INVARIANT: Nothing to fall back on when the source itself is gone.
    if symlink_metadata(src).is_err() {
        return Err(err);
    }

    warn!("rename failed ({err}), falling back to copy");
    copy(src, dest)?;
    if let Err(err) = remove_file(src) {
        let _ = remove_file(dest);
        return Err(err);
    }

    Ok(())
}

/// Archive store error types.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Archive store directory cannot be created.
    #[error("failed to create archive store at {:?}", path.display())]
    CreateStore {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Versioned name is already taken in the archive store.
    #[error("archive store entry {:?} already exists", path.display())]
    Occupied { path: PathBuf },

    /// Bundle cannot be moved into the archive store.
    #[error("failed to move {:?} to {:?}", from.display(), to.display())]
    Move {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{read_to_string, write};

    #[test]
    fn moves_bundle_under_versioned_name() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let src = root.path().join("bundle.zip");
        write(&src, "zip bytes")?;

        let archiver = Archiver::new(root.path().join("archive"), "todo-test2");
        let stored = archiver.archive(&src, Version::new(3))?;

        assert_eq!(stored, root.path().join("archive/todo-test2-v3.zip"));
        assert_eq!(read_to_string(&stored)?, "zip bytes");
        assert!(!src.exists());

        Ok(())
    }

    #[test]
    fn refuses_to_overwrite_store_entry() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let archiver = Archiver::new(root.path().join("archive"), "app");
        let src = root.path().join("bundle.zip");
        write(&src, "first")?;
        archiver.archive(&src, Version::new(1))?;

        write(&src, "second")?;
        let result = archiver.archive(&src, Version::new(1));
        assert!(matches!(result, Err(ArchiveError::Occupied { .. })));
        assert_eq!(read_to_string(root.path().join("archive/app-v1.zip"))?, "first");
        assert!(src.exists());

        Ok(())
    }

    #[test]
    fn missing_source_is_move_error() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let archiver = Archiver::new(root.path().join("archive"), "app");
        let result = archiver.archive(root.path().join("gone.zip"), Version::new(1));
        assert!(matches!(result, Err(ArchiveError::Move { .. })));

        Ok(())
    }

    #[test]
    fn blocked_store_is_create_error() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(root.path().join("archive"), "not a directory")?;
        let src = root.path().join("bundle.zip");
        write(&src, "zip bytes")?;

        let archiver = Archiver::new(root.path().join("archive"), "app");
        let result = archiver.archive(&src, Version::new(1));
        assert!(matches!(result, Err(ArchiveError::CreateStore { .. })));
        assert!(src.exists());

        Ok(())
    }
}
