// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bundle ingestion.
//!
//! Ingestion is a small state machine that runs once per detected bundle:
//!
//! ```text
//! Idle -> Extracting -> Archiving -> Syncing -> Idle
//! ```
//!
//! Each stage only runs if the previous one succeeded. A failing stage sends
//! the controller straight back to idle, ready for the next bundle. Failures
//! never stop the controller itself.
//!
//! # Version Consumption
//!
//! The next version number is consumed as soon as archiving is attempted.
//! Should archiving fail, that number is skipped for good, such that no two
//! archive store entries can ever share a version.
//!
//! # Serial Processing
//!
//! The controller owns the version counter and mutates the watched directory.
//! Bundles are therefore handled strictly one at a time through
//! [`IngestionController::run`], which drains an event stream on the
//! calling thread. Bundles detected mid-ingestion queue up behind the
//! current one.

use crate::{
    archive::{ArchiveError, Archiver},
    config::Settings,
    extract::{ExtractError, ExtractReport, Extractor, PreserveList},
    report::Reporter,
    sync::{CommitOutcome, GitSync, SyncError, SyncReport, Synchronizer},
    version::{Version, VersionTracker},
    watch::{is_archive, is_direct_child, ArchiveEvent},
};

use futures::{executor::block_on_stream, Stream};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    thread::sleep,
};
use tracing::{debug, error, info, instrument};

/// Stage the controller is currently in.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    #[default]
    Idle,
    Extracting,
    Archiving,
    Syncing,
}

impl Display for IngestState {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let state = match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Archiving => "archiving",
            Self::Syncing => "syncing",
        };
        fmt.write_str(state)
    }
}

/// Summary of a fully ingested bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    /// Version assigned to the bundle.
    pub version: Version,

    /// Where the bundle now lives in the archive store.
    pub stored: PathBuf,

    /// What extraction did.
    pub extract: ExtractReport,

    /// What synchronization did.
    pub sync: SyncReport,
}

/// Drive bundles through extraction, archiving, and synchronization.
#[derive(Debug)]
pub struct IngestionController<S = GitSync>
where
    S: Synchronizer,
{
    settings: Settings,
    extractor: Extractor,
    archiver: Archiver,
    synchronizer: S,
    reporter: Reporter,
    tracker: VersionTracker,
    state: IngestState,
}

impl IngestionController<GitSync> {
    /// Construct new controller that pushes through Git.
    ///
    /// # Errors
    ///
    /// - Return [`IngestError::Extraction`] if preserve list is invalid.
    pub fn with_git(settings: Settings, reporter: Reporter) -> Result<Self> {
        let synchronizer = GitSync::new(settings.committer.clone());
        Self::new(settings, synchronizer, reporter)
    }
}

impl<S> IngestionController<S>
where
    S: Synchronizer,
{
    /// Construct new controller.
    ///
    /// Recomputes the current version from the archive store. This is the
    /// only time the archive store is consulted for versioning.
    ///
    /// # Errors
    ///
    /// - Return [`IngestError::Extraction`] if preserve list is invalid.
    pub fn new(settings: Settings, synchronizer: S, reporter: Reporter) -> Result<Self> {
        let preserve = PreserveList::new(settings.extract.preserve.iter().cloned())?;
        let extractor = Extractor::new(preserve);
        let archiver = Archiver::new(settings.store_dir(), settings.project.name.clone());
        let tracker = VersionTracker::from_store(settings.store_dir(), &settings.archive.extension);
        info!("resume at version {}", tracker.current());

        Ok(Self {
            settings,
            extractor,
            archiver,
            synchronizer,
            reporter,
            tracker,
            state: IngestState::Idle,
        })
    }

    /// Version of the most recently archived bundle.
    pub fn version(&self) -> Version {
        self.tracker.current()
    }

    /// Stage the controller is currently in.
    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Process bundle events one after another until the stream ends.
    ///
    /// Blocks the current thread. A panic while handling one bundle is
    /// reported and does not end the loop.
    pub fn run(mut self, events: impl Stream<Item = ArchiveEvent> + Unpin) {
        for event in block_on_stream(events) {
            let outcome = catch_unwind(AssertUnwindSafe(|| self.handle(&event)));
            if outcome.is_err() {
                error!("ingestion of {:?} panicked", event.path.display());
                self.reporter
                    .failure(format!("Error processing archive: {}", file_name(&event.path)));
                self.state = IngestState::Idle;
            }
        }

        debug!("event stream closed");
    }

    /// Handle one bundle event, reporting every outcome.
    ///
    /// Events that do not name a bundle directly inside the watched directory,
    /// or whose bundle has already disappeared, are ignored.
    pub fn handle(&mut self, event: &ArchiveEvent) -> Option<Ingested> {
        let root = self.settings.project.root.as_path();
        if !is_archive(&event.path, &self.settings.archive.extension)
            || !is_direct_child(root, &event.path)
        {
            debug!("ignore {:?}", event.path.display());
            return None;
        }

        let settle = self.settings.archive.settle();
        if !settle.is_zero() {
            sleep(settle);
        }

        if !event.path.is_file() {
            debug!("archive {:?} no longer exists", event.path.display());
            return None;
        }

        let name = file_name(&event.path);
        self.reporter.success(format!("New archive detected: {name}"));

        self.reporter.status("Processing archive...");
        match self.ingest(&event.path) {
            Ok(ingested) => {
                match &ingested.sync.commit {
                    CommitOutcome::Committed(message) => debug!("pushed commit {message:?}"),
                    CommitOutcome::NothingToCommit => debug!("pushed without new commit"),
                }
                self.reporter.success("Git operations completed successfully");
                Some(ingested)
            }
            Err(err) => {
                self.reporter.failure(failure_message(&err));
                None
            }
        }
    }

    /// Run bundle through every stage.
    ///
    /// # Errors
    ///
    /// - Return [`IngestError::Extraction`] if extraction fails. The version
    ///   is left untouched.
    /// - Return [`IngestError::Archive`] if archiving fails. The version is
    ///   consumed regardless.
    /// - Return [`IngestError::Sync`] if synchronization fails. The bundle
    ///   stays archived under its new version.
    #[instrument(skip(self, archive), level = "debug")]
    pub fn ingest(&mut self, archive: impl AsRef<Path>) -> Result<Ingested> {
        let result = self.run_stages(archive.as_ref());
        self.state = IngestState::Idle;
        result
    }

    fn run_stages(&mut self, archive: &Path) -> Result<Ingested> {
        let root = self.settings.project.root.clone();

        self.state = IngestState::Extracting;
        let extract = self.extractor.extract(archive, &root)?;
        debug!("extracted {} files", extract.written);

        self.state = IngestState::Archiving;
        let version = self.tracker.advance();
        let stored = self.archiver.archive(archive, version)?;
        self.reporter.success(format!(
            "Files extracted and archived as {}",
            file_name(&stored)
        ));

        self.state = IngestState::Syncing;
        self.reporter.status("Processing git operations...");
        let sync = self
            .synchronizer
            .sync(&root, &self.settings.remote_url(), version)?;

        Ok(Ingested {
            version,
            stored,
            extract,
            sync,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn failure_message(error: &IngestError) -> String {
    match error {
        IngestError::Extraction(err) => format!("Failed to extract archive: {}", error_chain(err)),
        IngestError::Archive(err) => format!("Failed to archive: {}", error_chain(err)),
        IngestError::Sync(err) => format!("Git error: {}", error_chain(err)),
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(format!(": {cause}").as_str());
        source = cause.source();
    }

    message
}

/// Ingestion error types.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Bundle cannot be extracted.
    #[error(transparent)]
    Extraction(#[from] ExtractError),

    /// Bundle cannot be moved into archive store.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Watched directory cannot be pushed to remote.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Friendly result alias :3
pub type Result<T, E = IngestError> = std::result::Result<T, E>;
