// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where bundlesync should look for its settings file.

use std::path::{Path, PathBuf};

/// Name of the settings file inside a watched directory.
pub const CONFIG_FILE_NAME: &str = "bundlesync.toml";

/// Determine default absolute path to user-wide settings file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/bundlesync/config.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("bundlesync").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Locate settings file for a watched directory.
///
/// An explicit path always wins. Otherwise the settings file at the top-level
/// of the watched directory is used, then the user-wide settings file. Returns
/// `None` if neither exists.
pub fn config_file(root: impl AsRef<Path>, explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let local = root.as_ref().join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    default_config_file().ok().filter(|path| path.is_file())
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::write;

    #[test]
    fn explicit_config_file_wins() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(root.path().join(CONFIG_FILE_NAME), "")?;

        let explicit = PathBuf::from("/etc/bundlesync.toml");
        assert_eq!(config_file(root.path(), Some(explicit.clone())), Some(explicit));

        Ok(())
    }

    #[test]
    fn local_config_file_found() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(root.path().join(CONFIG_FILE_NAME), "")?;

        assert_eq!(
            config_file(root.path(), None),
            Some(root.path().join(CONFIG_FILE_NAME))
        );

        Ok(())
    }
}
