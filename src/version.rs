// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive version tracking.
//!
//! Every archive that bundlesync processes is moved into the __archive store__
//! under a name of the form `<project>-v<N>.<ext>`. These file names are the
//! only durable record of how many archives have been processed. Thus, the
//! version counter is rebuilt from the archive store once at startup, and is
//! only ever advanced in memory afterwards.
//!
//! # Gaps
//!
//! Version numbers are never reused, and gaps in the archive store are never
//! backfilled. A store containing `v1`, `v3`, and `v5` resumes at `v6`.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_dir,
    path::Path,
};
use tracing::{debug, instrument};

/// Monotonic archive version.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Version of an empty archive store.
    pub const ZERO: Self = Self(0);

    /// Construct new version.
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    /// Raw version number.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Version that directly follows this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Display for Version {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "v{}", self.0)
    }
}

/// In-memory version counter seeded from the archive store.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct VersionTracker {
    current: Version,
}

impl VersionTracker {
    /// Construct new tracker starting at a known version.
    pub fn new(current: Version) -> Self {
        Self { current }
    }

    /// Construct new tracker seeded from archive store.
    pub fn from_store(store_dir: impl AsRef<Path>, extension: &str) -> Self {
        Self::new(Self::recompute(store_dir, extension))
    }

    /// Determine the highest version present in the archive store.
    ///
    /// Entries that do not follow the `<anything>-v<N>.<ext>` naming scheme are
    /// skipped. A missing or unreadable store yields [`Version::ZERO`].
    #[instrument(skip(store_dir), level = "debug")]
    pub fn recompute(store_dir: impl AsRef<Path>, extension: &str) -> Version {
        let entries = match read_dir(store_dir.as_ref()) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(
                    "cannot read archive store {:?}: {err}",
                    store_dir.as_ref().display()
                );
                return Version::ZERO;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                parse_stored_version(name.to_string_lossy().as_ref(), extension)
            })
            .max()
            .unwrap_or(Version::ZERO)
    }

    /// Current version, i.e., the version of the last archived bundle.
    pub fn current(&self) -> Version {
        self.current
    }

    /// Consume the next version number.
    ///
    /// The returned version is never handed out again for the lifetime of
    /// this tracker, even if the caller fails to use it.
    pub fn advance(&mut self) -> Version {
        self.current = self.current.next();
        self.current
    }
}

/// Parse version out of an archive store entry name.
///
/// Expects `<anything>-v<N>.<extension>`. Returns `None` for anything else.
pub fn parse_stored_version(file_name: &str, extension: &str) -> Option<Version> {
    let stem = file_name
        .strip_suffix(extension)
        .and_then(|rest| rest.strip_suffix('.'))?;
    let (_, number) = stem.rsplit_once("-v")?;

    // INVARIANT: Only plain digits count, e.g., no signs or whitespace.
    if number.is_empty() || !number.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    number.parse().ok().map(Version::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::fs::write;

    #[test_case("todo-test2-v1.zip", Some(1); "plain")]
    #[test_case("todo-test2-v42.zip", Some(42); "multi digit")]
    #[test_case("my-v2-project-v7.zip", Some(7); "last marker wins")]
    #[test_case("todo-test2-v.zip", None; "missing number")]
    #[test_case("todo-test2-vx1.zip", None; "not a number")]
    #[test_case("todo-test2-v1.tar", None; "wrong extension")]
    #[test_case("todo-test2.zip", None; "no marker")]
    #[test_case("todo-test2-v-3.zip", None; "negative")]
    #[test]
    fn parse_store_entry_names(name: &str, expect: Option<u64>) {
        pretty_assertions::assert_eq!(parse_stored_version(name, "zip"), expect.map(Version::new));
    }

    #[test]
    fn recompute_takes_maximum_and_keeps_gaps() -> anyhow::Result<()> {
        let store = tempfile::tempdir()?;
        for name in ["app-v1.zip", "app-v3.zip", "app-v5.zip", "notes.txt", "app-vX.zip"] {
            write(store.path().join(name), b"")?;
        }

        let mut tracker = VersionTracker::from_store(store.path(), "zip");
        assert_eq!(tracker.current(), Version::new(5));
        assert_eq!(tracker.advance(), Version::new(6));
        assert_eq!(tracker.current(), Version::new(6));

        Ok(())
    }

    #[test]
    fn recompute_missing_store_is_zero() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let result = VersionTracker::recompute(root.path().join("archive"), "zip");
        assert_eq!(result, Version::ZERO);

        Ok(())
    }

    #[test]
    fn version_display() {
        assert_eq!(Version::new(12).to_string(), "v12");
        assert_eq!(Version::ZERO.next().to_string(), "v1");
    }
}
