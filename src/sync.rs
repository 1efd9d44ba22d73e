// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository synchronization.
//!
//! After a bundle has been extracted and archived, the watched directory is
//! committed and force-pushed to a remote repository. Mutations go through
//! the Git binary itself, while read-only queries, e.g., listing remotes or
//! checking for existing commits, go through libgit2.
//!
//! # Sync Sequence
//!
//! 1. Initialize repository if there is no ".git" directory yet.
//! 2. Set committer identity.
//! 3. Point "origin" at the remote URL, replacing any previous "origin".
//! 4. Stage everything.
//! 5. Commit as "Initial commit" if there are no commits yet, otherwise as
//!    the version, e.g., "v3". Nothing to commit is not a failure.
//! 6. Rename current branch to "main".
//! 7. Force-push "main" to "origin".
//!
//! Any failing step stops the sequence. Nothing is rolled back, so the
//! repository may legitimately be left committed but not pushed.

use crate::{config::Committer, version::Version};

use git2::Repository;
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    process::Command,
};
use tracing::{debug, info, instrument};

/// Name of the remote bundlesync pushes to.
pub const REMOTE_NAME: &str = "origin";

/// Name of the branch bundlesync commits to.
pub const BRANCH_NAME: &str = "main";

/// Commit message of the very first commit.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// Layer of indirection for pushing the watched directory somewhere.
pub trait Synchronizer: Send + 'static {
    /// Commit current state of working directory and publish it to remote.
    fn sync(&self, work_dir: &Path, remote_url: &str, version: Version) -> Result<SyncReport>;
}

/// Outcome of the commit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// New commit was made with the given message.
    Committed(String),

    /// Working tree had no changes to commit.
    NothingToCommit,
}

/// Summary of a finished sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Whether repository was initialized during this sync.
    pub initialized: bool,

    /// What the commit step did.
    pub commit: CommitOutcome,
}

/// Individual steps of the sync sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Init,
    Identity,
    Remote,
    Stage,
    Commit,
    Branch,
    Push,
}

impl Display for SyncStage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let stage = match self {
            Self::Init => "init",
            Self::Identity => "identity",
            Self::Remote => "remote",
            Self::Stage => "stage",
            Self::Commit => "commit",
            Self::Branch => "branch",
            Self::Push => "push",
        };
        fmt.write_str(stage)
    }
}

/// Synchronize through the Git binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSync {
    committer: Committer,
}

impl GitSync {
    /// Construct new Git synchronizer.
    pub fn new(committer: Committer) -> Self {
        Self { committer }
    }
}

impl Synchronizer for GitSync {
    #[instrument(skip(self, work_dir, remote_url), level = "debug")]
    fn sync(&self, work_dir: &Path, remote_url: &str, version: Version) -> Result<SyncReport> {
        let initialized = !work_dir.join(".git").exists();
        if initialized {
            info!("initialize repository in {:?}", work_dir.display());
            gitcall(work_dir, SyncStage::Init, ["init"])?;
        }

        gitcall(
            work_dir,
            SyncStage::Identity,
            ["config", "user.email", self.committer.email.as_str()],
        )?;
        gitcall(
            work_dir,
            SyncStage::Identity,
            ["config", "user.name", self.committer.name.as_str()],
        )?;

        let repository = Repository::open(work_dir)?;
        if has_remote(&repository, REMOTE_NAME)? {
            gitcall(work_dir, SyncStage::Remote, ["remote", "remove", REMOTE_NAME])?;
        }
        gitcall(
            work_dir,
            SyncStage::Remote,
            ["remote", "add", REMOTE_NAME, remote_url],
        )?;

        gitcall(work_dir, SyncStage::Stage, ["add", "."])?;

        let message = if has_commits(&repository) {
            version.to_string()
        } else {
            INITIAL_COMMIT_MESSAGE.to_string()
        };
        let output = syscall_non_interactive("git", ["commit", "-m", message.as_str()], work_dir)
            .map_err(|err| SyncError::Spawn {
                source: err,
                stage: SyncStage::Commit,
            })?;
        let commit = if output.success {
            CommitOutcome::Committed(message)
        } else if is_nothing_to_commit(&output.message) {
            debug!("nothing to commit");
            CommitOutcome::NothingToCommit
        } else {
            return Err(SyncError::Failed {
                stage: SyncStage::Commit,
                message: output.message,
            });
        };

        gitcall(work_dir, SyncStage::Branch, ["branch", "-M", BRANCH_NAME])?;
        gitcall(
            work_dir,
            SyncStage::Push,
            ["push", "-f", REMOTE_NAME, BRANCH_NAME],
        )?;

        Ok(SyncReport {
            initialized,
            commit,
        })
    }
}

/// Check if Git's commit output means there was nothing to commit.
pub fn is_nothing_to_commit(message: &str) -> bool {
    message.contains("nothing to commit") || message.contains("nothing added to commit")
}

fn has_remote(repository: &Repository, name: &str) -> Result<bool> {
    Ok(repository
        .remotes()?
        .iter()
        .flatten()
        .any(|remote| remote == name))
}

fn has_commits(repository: &Repository) -> bool {
    repository
        .head()
        .ok()
        .and_then(|head| head.target())
        .and_then(|oid| repository.find_commit(oid).ok())
        .is_some()
}

fn gitcall<'a>(
    work_dir: &Path,
    stage: SyncStage,
    args: impl IntoIterator<Item = &'a str>,
) -> Result<String> {
    let output = syscall_non_interactive("git", args, work_dir)
        .map_err(|err| SyncError::Spawn { source: err, stage })?;
    if !output.success {
        return Err(SyncError::Failed {
            stage,
            message: output.message,
        });
    }

    debug!("git {stage}: {}", output.message);
    Ok(output.message)
}

#[derive(Debug)]
struct SyscallOutput {
    success: bool,
    message: String,
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    current_dir: &Path,
) -> std::io::Result<SyscallOutput> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .current_dir(current_dir)
        .output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    Ok(SyscallOutput {
        success: output.status.success(),
        message,
    })
}

/// Repository synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Git binary could not be run at all.
    #[error("failed to run git for {stage} step")]
    Spawn {
        #[source]
        source: std::io::Error,
        stage: SyncStage,
    },

    /// Git binary reported failure.
    #[error("git {stage} step failed:\n{message}")]
    Failed { stage: SyncStage, message: String },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

impl SyncError {
    /// Step of the sync sequence that failed, if known.
    pub fn stage(&self) -> Option<SyncStage> {
        match self {
            Self::Spawn { stage, .. } | Self::Failed { stage, .. } => Some(*stage),
            Self::Git2(_) => None,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("stdout: On branch main\nnothing to commit, working tree clean", true; "clean tree")]
    #[test_case("stdout: nothing added to commit but untracked files present", true; "untracked only")]
    #[test_case("stderr: fatal: unable to auto-detect email address", false; "identity failure")]
    #[test_case("", false; "silent failure")]
    #[test]
    fn detect_nothing_to_commit(message: &str, expect: bool) {
        pretty_assertions::assert_eq!(is_nothing_to_commit(message), expect);
    }

    #[test]
    fn failed_step_reports_stage() {
        let error = SyncError::Failed {
            stage: SyncStage::Push,
            message: "stderr: rejected".into(),
        };
        assert_eq!(error.stage(), Some(SyncStage::Push));
        assert_eq!(error.to_string(), "git push step failed:\nstderr: rejected");
    }

    #[test]
    fn syscall_captures_failure_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let output = syscall_non_interactive("git", ["rev-parse", "HEAD"], dir.path())?;
        assert!(!output.success);
        assert!(output.message.starts_with("stderr: "));

        Ok(())
    }
}
