// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive detection.
//!
//! Watches the top-level of a single directory for newly created bundles.
//! Creation events are delivered by the operating system through `notify`,
//! filtered down to bundles, and forwarded through an unbounded channel to
//! whoever processes them. Subdirectories, e.g., the archive store, are
//! never watched.

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use notify::{
    event::{ModifyKind, RenameMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Freshly created bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEvent {
    pub path: PathBuf,
}

impl ArchiveEvent {
    /// Construct new archive event.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Check if path names a bundle by its extension.
pub fn is_archive(path: impl AsRef<Path>, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .is_some_and(|ext| ext.to_string_lossy() == extension)
}

/// Check if root contains given path directly.
pub fn is_direct_child(root: impl AsRef<Path>, path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .parent()
        .is_some_and(|parent| parent == root.as_ref())
}

/// Extract bundle creations from a raw filesystem event.
///
/// Files renamed into the watched directory count as created, since many
/// download tools write to a temporary name first.
pub fn archive_events(event: &Event, extension: &str) -> Vec<ArchiveEvent> {
    let created = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => true,
        _ => false,
    };
    if !created {
        return Vec::new();
    }

    // INVARIANT: Rename events carrying both paths list the destination last.
    let paths = match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..).unwrap_or_default()
        }
        _ => event.paths.as_slice(),
    };

    paths
        .iter()
        .filter(|path| is_archive(path, extension))
        .cloned()
        .map(ArchiveEvent::new)
        .collect()
}

/// Non-recursive watcher over a single directory.
///
/// Watching stops, and the paired event stream ends, once this is dropped.
#[derive(Debug)]
pub struct ArchiveWatcher {
    _watcher: RecommendedWatcher,
}

impl ArchiveWatcher {
    /// Start watching root directory for bundles.
    ///
    /// # Errors
    ///
    /// - Return [`WatchError::Notify`] if watching cannot start.
    #[instrument(skip(root), level = "debug")]
    pub fn spawn(
        root: impl AsRef<Path>,
        extension: impl Into<String> + std::fmt::Debug,
    ) -> Result<(Self, UnboundedReceiver<ArchiveEvent>)> {
        let (sender, receiver) = unbounded();
        let extension = extension.into();
        let handler = EventForwarder { sender, extension };

        let mut watcher = notify::recommended_watcher(handler)?;
        watcher.watch(root.as_ref(), RecursiveMode::NonRecursive)?;
        debug!("watching {:?}", root.as_ref().display());

        Ok((Self { _watcher: watcher }, receiver))
    }
}

struct EventForwarder {
    sender: UnboundedSender<ArchiveEvent>,
    extension: String,
}

impl notify::EventHandler for EventForwarder {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!("watch error: {err}");
                return;
            }
        };

        for archive in archive_events(&event, &self.extension) {
            debug!("archive created: {:?}", archive.path.display());
            if self.sender.unbounded_send(archive).is_err() {
                debug!("event receiver dropped");
                return;
            }
        }
    }
}

/// Watcher error types.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Operations from notify fail.
    #[error(transparent)]
    Notify(#[from] notify::Error),
}

/// Friendly result alias :3
pub type Result<T, E = WatchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn created_archives_pass() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/srv/app/bundle.zip"));
        assert_eq!(
            archive_events(&event, "zip"),
            vec![ArchiveEvent::new("/srv/app/bundle.zip")]
        );
    }

    #[test]
    fn renamed_archives_pass() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/srv/app/bundle.zip"));
        assert_eq!(archive_events(&event, "zip").len(), 1);

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/srv/app/bundle.zip.part"))
            .add_path(PathBuf::from("/srv/app/bundle.zip"));
        assert_eq!(
            archive_events(&event, "zip"),
            vec![ArchiveEvent::new("/srv/app/bundle.zip")]
        );

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/srv/app/bundle.zip"))
            .add_path(PathBuf::from("/srv/app/bundle.bak"));
        assert_eq!(archive_events(&event, "zip"), Vec::new());
    }

    #[test]
    fn everything_else_is_ignored() {
        let cases = [
            Event::new(EventKind::Create(CreateKind::File))
                .add_path(PathBuf::from("/srv/app/notes.txt")),
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
                .add_path(PathBuf::from("/srv/app/bundle.zip")),
            Event::new(EventKind::Remove(RemoveKind::File))
                .add_path(PathBuf::from("/srv/app/bundle.zip")),
        ];

        for event in cases {
            assert_eq!(archive_events(&event, "zip"), Vec::new());
        }
    }

    #[test]
    fn archive_extension_and_location() {
        assert!(is_archive("bundle.zip", "zip"));
        assert!(!is_archive("bundle.zip.part", "zip"));
        assert!(!is_archive("zip", "zip"));
        assert!(is_direct_child("/srv/app", "/srv/app/bundle.zip"));
        assert!(!is_direct_child("/srv/app", "/srv/app/archive/bundle.zip"));
    }
}
