// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive extraction with file preservation.
//!
//! Bundles usually come wrapped in a single root directory, e.g.,
//! `project/src/main.ts`. Extraction strips that wrapper such that the
//! bundle's content lands directly in the target directory, i.e., the
//! watched directory itself.
//!
//! # Preserved Files
//!
//! The target directory contains content that must survive every extraction
//! untouched: environment files, version control metadata, the ignore file,
//! and bundlesync's own configuration. These are listed in a __preserve list__
//! of gitignore-style patterns that are matched against base names.
//!
//! - Archive entries whose base name matches the preserve list are never
//!   extracted, no matter how deep they sit in the archive.
//! - Top-level items in the target directory that match the preserve list
//!   are never replaced or removed.
//! - A preserved top-level directory that does __not__ exist yet may be
//!   supplied by the archive, e.g., a bundle shipping its own `.git`.
//!
//! # Scratch Merge
//!
//! Extraction first unpacks into a scratch directory inside the target
//! directory, and only then merges the scratch tree into the target. The
//! target is never touched when the archive cannot be read, and preserved
//! items are never moved around, so a crash mid-extraction cannot lose them.
//!
//! A scratch directory left behind by a killed process is removed before the
//! next extraction starts. Archive files that would land where the target has
//! a directory fail the extraction before anything is merged, so no directory
//! tree is ever deleted to make room for a file.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::{
    fs::{create_dir_all, read_dir, remove_dir_all, remove_file, rename, symlink_metadata, File},
    io::copy,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument, warn};
use zip::ZipArchive;

/// Name prefix of scratch directories created inside the target directory.
pub const SCRATCH_PREFIX: &str = ".bundlesync-";

/// Preserve list matched by base name.
#[derive(Debug, Clone)]
pub struct PreserveList {
    patterns: Vec<String>,
    matcher: Gitignore,
}

impl PreserveList {
    /// Construct new preserve list from gitignore-style patterns.
    ///
    /// # Errors
    ///
    /// - Return [`ExtractError::Pattern`] if a pattern is malformed.
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let patterns = patterns.into_iter().map(Into::into).collect::<Vec<String>>();

        // INVARIANT: Patterns are matched against bare names, so the root is irrelevant.
        let mut builder = GitignoreBuilder::new("");
        for pattern in &patterns {
            builder
                .add_line(None, pattern)
                .map_err(|err| ExtractError::Pattern {
                    source: err,
                    pattern: pattern.clone(),
                })?;
        }
        let matcher = builder.build().map_err(|err| ExtractError::Pattern {
            source: err,
            pattern: patterns.join(", "),
        })?;

        Ok(Self { patterns, matcher })
    }

    /// Check if base name is preserved.
    pub fn is_preserved(&self, name: impl AsRef<Path>) -> bool {
        let name = name.as_ref();
        // Directory-only patterns like "node_modules/" must match either way.
        self.matcher.matched(name, false).is_ignore() || self.matcher.matched(name, true).is_ignore()
    }

    /// Patterns this list was built from.
    pub fn patterns(&self) -> &[String] {
        self.patterns.as_slice()
    }
}

/// Summary of a finished extraction.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    /// Number of regular files written into the target directory.
    pub written: usize,

    /// Archive entries that were not extracted.
    pub skipped: Vec<PathBuf>,

    /// Top-level target items left alone because they are preserved.
    pub kept: Vec<PathBuf>,
}

/// Unpack bundles into a target directory.
#[derive(Debug, Clone)]
pub struct Extractor {
    preserve: PreserveList,
}

impl Extractor {
    /// Construct new extractor.
    pub fn new(preserve: PreserveList) -> Self {
        Self { preserve }
    }

    /// Preserve list in use.
    pub fn preserve(&self) -> &PreserveList {
        &self.preserve
    }

    /// Extract archive into target directory.
    ///
    /// Strips the leading path component of every entry, skips entries whose
    /// base name is preserved, and overwrites any existing non-preserved
    /// files in the target directory.
    ///
    /// # Errors
    ///
    /// - Return [`ExtractError::Open`] if archive cannot be opened.
    /// - Return [`ExtractError::Read`] if archive is not a valid zip file.
    /// - Return [`ExtractError::Entry`] if an entry cannot be decompressed.
    /// - Return [`ExtractError::Scratch`] if scratch directory cannot be made,
    ///   or a stale one cannot be removed.
    /// - Return [`ExtractError::Write`] if extracted content cannot be written.
    /// - Return [`ExtractError::Conflict`] if an archive file would replace a
    ///   directory in the target.
    #[instrument(skip(self, archive, target), level = "debug")]
    pub fn extract(&self, archive: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<ExtractReport> {
        let archive = archive.as_ref();
        let target = target.as_ref();
        debug!("extract {:?} into {:?}", archive.display(), target.display());

        let file = File::open(archive).map_err(|err| ExtractError::Open {
            source: err,
            path: archive.to_path_buf(),
        })?;
        let mut zip = ZipArchive::new(file).map_err(|err| ExtractError::Read {
            source: err,
            path: archive.to_path_buf(),
        })?;

        clear_stale_scratch(target)?;

        // INVARIANT: Scratch lives inside target so the merge is a plain rename.
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(target)
            .map_err(|err| ExtractError::Scratch {
                source: err,
                path: target.to_path_buf(),
            })?;

        let mut report = ExtractReport::default();
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|err| ExtractError::Entry {
                source: err,
                path: archive.to_path_buf(),
            })?;

            let Some(enclosed) = entry.enclosed_name() else {
                warn!("skip entry escaping archive root: {:?}", entry.name());
                report.skipped.push(PathBuf::from(entry.name()));
                continue;
            };

            if enclosed
                .file_name()
                .is_some_and(|name| self.preserve.is_preserved(name))
            {
                debug!("skip preserved entry {:?}", enclosed.display());
                report.skipped.push(enclosed);
                continue;
            }

            let relative = strip_wrapper(&enclosed, entry.is_dir());
            if relative.as_os_str().is_empty() {
                continue;
            }

            let dest = scratch.path().join(&relative);
            if entry.is_dir() {
                create_dir_all(&dest).map_err(|err| ExtractError::Write {
                    source: err,
                    path: dest.clone(),
                })?;
                continue;
            }

            if let Some(parent) = dest.parent() {
                create_dir_all(parent).map_err(|err| ExtractError::Write {
                    source: err,
                    path: parent.to_path_buf(),
                })?;
            }

            let mut out = File::create(&dest).map_err(|err| ExtractError::Write {
                source: err,
                path: dest.clone(),
            })?;
            copy(&mut entry, &mut out).map_err(|err| ExtractError::Write {
                source: err,
                path: dest.clone(),
            })?;
            report.written += 1;
        }

        self.merge_into(scratch.path(), target, &mut report)?;
        scratch.close().map_err(|err| ExtractError::Scratch {
            source: err,
            path: target.to_path_buf(),
        })?;

        Ok(report)
    }

    fn merge_into(&self, scratch: &Path, target: &Path, report: &mut ExtractReport) -> Result<()> {
        let mut merges = Vec::new();
        for entry in read_dir(scratch).map_err(|err| ExtractError::Merge {
            source: err,
            path: scratch.to_path_buf(),
        })? {
            let entry = entry.map_err(|err| ExtractError::Merge {
                source: err,
                path: scratch.to_path_buf(),
            })?;
            let name = entry.file_name();
            let dest = target.join(&name);

            // INVARIANT: Existing preserved items are never replaced.
            if self.preserve.is_preserved(&name) && symlink_metadata(&dest).is_ok() {
                debug!("keep preserved {:?}", dest.display());
                report.kept.push(PathBuf::from(name));
                continue;
            }

            merges.push((entry.path(), dest));
        }

        // INVARIANT: Conflicts are found before the target is touched.
        for (src, dest) in &merges {
            if let Some(path) = find_conflict(src, dest) {
                return Err(ExtractError::Conflict { path });
            }
        }

        for (src, dest) in &merges {
            merge_entry(src, dest)?;
        }

        Ok(())
    }
}

// Drop the single wrapper directory archives are expected to carry. Files
// without any directory prefix are kept as-is, while the wrapper directory
// entry itself maps to nothing.
fn strip_wrapper(path: &Path, is_dir: bool) -> PathBuf {
    let components = path
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect::<Vec<_>>();

    match components.len() {
        0 => PathBuf::new(),
        1 if is_dir => PathBuf::new(),
        1 => components.iter().collect(),
        _ => components[1..].iter().collect(),
    }
}

fn clear_stale_scratch(target: &Path) -> Result<()> {
    let scratch_err = |err| ExtractError::Scratch {
        source: err,
        path: target.to_path_buf(),
    };

    for entry in read_dir(target).map_err(scratch_err)? {
        let entry = entry.map_err(scratch_err)?;
        let is_scratch = entry.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX);
        if is_scratch && entry.file_type().map_err(scratch_err)?.is_dir() {
            warn!("remove stale scratch directory {:?}", entry.path().display());
            remove_dir_all(entry.path()).map_err(scratch_err)?;
        }
    }

    Ok(())
}

// Locate the first target directory that an extracted file would replace.
fn find_conflict(src: &Path, dest: &Path) -> Option<PathBuf> {
    let dest_is_dir = symlink_metadata(dest).is_ok_and(|meta| meta.is_dir());
    if !src.is_dir() {
        return dest_is_dir.then(|| dest.to_path_buf());
    }

    if !dest_is_dir {
        return None;
    }

    read_dir(src)
        .ok()?
        .flatten()
        .find_map(|child| find_conflict(&child.path(), &dest.join(child.file_name())))
}

fn merge_entry(src: &Path, dest: &Path) -> Result<()> {
    let merge_err = |err, path: &Path| ExtractError::Merge {
        source: err,
        path: path.to_path_buf(),
    };

    let dest_meta = symlink_metadata(dest).ok();
    if src.is_dir() {
        // INVARIANT: A file standing where a directory should go gets replaced.
        if dest_meta.as_ref().is_some_and(|meta| !meta.is_dir()) {
            remove_file(dest).map_err(|err| merge_err(err, dest))?;
        }
        create_dir_all(dest).map_err(|err| merge_err(err, dest))?;

        for child in read_dir(src).map_err(|err| merge_err(err, src))? {
            let child = child.map_err(|err| merge_err(err, src))?;
            merge_entry(&child.path(), &dest.join(child.file_name()))?;
        }

        return Ok(());
    }

    rename(src, dest).map_err(|err| merge_err(err, dest))?;

    Ok(())
}

/// Extraction error types.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Preserve pattern cannot be compiled.
    #[error("invalid preserve pattern {pattern:?}")]
    Pattern {
        #[source]
        source: ignore::Error,
        pattern: String,
    },

    /// Archive file cannot be opened.
    #[error("failed to open archive {:?}", path.display())]
    Open {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archive file is not a readable zip file.
    #[error("failed to read archive {:?}", path.display())]
    Read {
        #[source]
        source: zip::result::ZipError,
        path: PathBuf,
    },

    /// Archive entry cannot be decompressed.
    #[error("failed to read entry of archive {:?}", path.display())]
    Entry {
        #[source]
        source: zip::result::ZipError,
        path: PathBuf,
    },

    /// Scratch directory cannot be created or cleaned up.
    #[error("failed to manage scratch directory in {:?}", path.display())]
    Scratch {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Extracted content cannot be written to scratch directory.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archive file would replace a directory in target directory.
    #[error("archive file conflicts with directory {:?}", path.display())]
    Conflict { path: PathBuf },

    /// Extracted content cannot be merged into target directory.
    #[error("failed to merge into {:?}", path.display())]
    Merge {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ExtractError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{
        fs::{read, read_to_string, write},
        io::Write,
    };
    use zip::{write::SimpleFileOptions, ZipWriter};

    /// Write zip file where `None` content marks a directory entry.
    pub(crate) fn write_zip(
        path: impl AsRef<Path>,
        entries: &[(&str, Option<&str>)],
    ) -> anyhow::Result<()> {
        let mut writer = ZipWriter::new(File::create(path.as_ref())?);
        let options = SimpleFileOptions::default();
        for (name, contents) in entries {
            match contents {
                Some(contents) => {
                    writer.start_file(*name, options)?;
                    writer.write_all(contents.as_bytes())?;
                }
                None => writer.add_directory(*name, options)?,
            }
        }
        writer.finish()?;

        Ok(())
    }

    pub(crate) fn default_extractor() -> Extractor {
        Extractor::new(
            PreserveList::new([".env", "bundlesync.toml", ".git", ".gitignore"]).unwrap(),
        )
    }

    #[test]
    fn strips_single_wrapper_directory() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let zip = root.path().join("bundle.zip");
        write_zip(
            &zip,
            &[
                ("root/", None),
                ("root/app.txt", Some("app")),
                ("root/src/", None),
                ("root/src/main.ts", Some("main")),
                ("readme.txt", Some("top")),
            ],
        )?;

        let report = default_extractor().extract(&zip, root.path())?;

        assert_eq!(report.written, 3);
        assert_eq!(read_to_string(root.path().join("app.txt"))?, "app");
        assert_eq!(read_to_string(root.path().join("src/main.ts"))?, "main");
        assert_eq!(read_to_string(root.path().join("readme.txt"))?, "top");
        assert!(!root.path().join("root").exists());

        Ok(())
    }

    #[test]
    fn preserved_files_survive_colliding_entries() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(root.path().join(".env"), "SECRET=original\n")?;
        write(root.path().join(".gitignore"), "archive/\n")?;
        create_dir_all(root.path().join(".git"))?;
        write(root.path().join(".git/HEAD"), "ref: refs/heads/main\n")?;

        let zip = root.path().join("bundle.zip");
        write_zip(
            &zip,
            &[
                ("root/.env", Some("SECRET=archived\n")),
                ("root/config/.env", Some("NESTED=archived\n")),
                ("root/.gitignore", Some("dist/\n")),
                ("root/.git/HEAD", Some("ref: refs/heads/other\n")),
                ("root/.git/config", Some("[core]\n")),
                ("root/app.txt", Some("app")),
            ],
        )?;

        let report = default_extractor().extract(&zip, root.path())?;

        assert_eq!(read(root.path().join(".env"))?, b"SECRET=original\n");
        assert_eq!(read(root.path().join(".gitignore"))?, b"archive/\n");
        assert_eq!(read(root.path().join(".git/HEAD"))?, b"ref: refs/heads/main\n");
        assert!(!root.path().join(".git/config").exists());
        assert!(!root.path().join("config/.env").exists());
        assert_eq!(read_to_string(root.path().join("app.txt"))?, "app");
        assert_eq!(report.kept, vec![PathBuf::from(".git")]);

        Ok(())
    }

    #[test]
    fn missing_preserved_directory_comes_from_archive() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let zip = root.path().join("bundle.zip");
        write_zip(&zip, &[("root/.git/config", Some("[core]\n"))])?;

        default_extractor().extract(&zip, root.path())?;
        assert_eq!(read_to_string(root.path().join(".git/config"))?, "[core]\n");

        Ok(())
    }

    #[test]
    fn overwrites_existing_files_and_replaces_conflicts() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(root.path().join("app.txt"), "old")?;
        write(root.path().join("src"), "file where directory goes")?;

        let zip = root.path().join("bundle.zip");
        write_zip(
            &zip,
            &[("root/app.txt", Some("new")), ("root/src/lib.ts", Some("lib"))],
        )?;

        default_extractor().extract(&zip, root.path())?;
        assert_eq!(read_to_string(root.path().join("app.txt"))?, "new");
        assert_eq!(read_to_string(root.path().join("src/lib.ts"))?, "lib");

        Ok(())
    }

    #[test]
    fn file_never_replaces_directory() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        create_dir_all(root.path().join("config"))?;
        write(root.path().join("config/.env"), "NESTED=original\n")?;
        write(root.path().join("app.txt"), "old")?;

        let zip = root.path().join("bundle.zip");
        write_zip(
            &zip,
            &[("root/app.txt", Some("new")), ("root/config", Some("now a file"))],
        )?;

        let result = default_extractor().extract(&zip, root.path());
        match result {
            Err(ExtractError::Conflict { path }) => assert_eq!(path, root.path().join("config")),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(read_to_string(root.path().join("config/.env"))?, "NESTED=original\n");
        assert_eq!(read_to_string(root.path().join("app.txt"))?, "old");

        Ok(())
    }

    #[test]
    fn stale_scratch_directories_are_removed() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let stale = root.path().join(format!("{SCRATCH_PREFIX}Xy12ab"));
        create_dir_all(&stale)?;
        write(stale.join("half.txt"), "partial")?;

        let zip = root.path().join("bundle.zip");
        write_zip(&zip, &[("root/app.txt", Some("app"))])?;

        default_extractor().extract(&zip, root.path())?;
        assert!(!stale.exists());
        assert_eq!(read_to_string(root.path().join("app.txt"))?, "app");

        Ok(())
    }

    #[test]
    fn corrupt_archive_leaves_target_untouched() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(root.path().join("app.txt"), "old")?;
        let zip = root.path().join("bundle.zip");
        write(&zip, "definitely not a zip file")?;

        let result = default_extractor().extract(&zip, root.path());
        assert!(matches!(result, Err(ExtractError::Read { .. })));
        assert_eq!(read_to_string(root.path().join("app.txt"))?, "old");

        let leftovers = read_dir(root.path())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX))
            .count();
        assert_eq!(leftovers, 0);

        Ok(())
    }

    #[test]
    fn wrapper_stripping() {
        assert_eq!(strip_wrapper(Path::new("root/a/b.txt"), false), PathBuf::from("a/b.txt"));
        assert_eq!(strip_wrapper(Path::new("root/a"), true), PathBuf::from("a"));
        assert_eq!(strip_wrapper(Path::new("root"), true), PathBuf::new());
        assert_eq!(strip_wrapper(Path::new("top.txt"), false), PathBuf::from("top.txt"));
    }

    #[test]
    fn preserve_list_matches_base_names() -> anyhow::Result<()> {
        let list = PreserveList::new([".env", "*.local", "node_modules/"])?;
        assert!(list.is_preserved(".env"));
        assert!(list.is_preserved("settings.local"));
        assert!(list.is_preserved("node_modules"));
        assert!(!list.is_preserved("app.txt"));
        assert!(!list.is_preserved(".envrc"));

        Ok(())
    }
}
