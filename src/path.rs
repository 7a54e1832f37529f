// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the running configuration, environment configurations, and
//! snapshots live on the user's file system. Every component of envkeep is
//! handed a [`PathConfig`] at construction time, and never mutates it
//! afterwards.
//!
//! # Layout
//!
//! ```text
//! ~/.envkeep/
//! ├── envkeep.env        primary (running) configuration
//! ├── .environments/     named environment configurations
//! └── .snapshots/        archived copies taken before overwrites
//! ```

use std::path::{Path, PathBuf};

/// Name of the directory holding all envkeep state inside the home directory.
pub const ROOT_DIR_NAME: &str = ".envkeep";

/// File name of the primary configuration file.
pub const PRIMARY_FILE_NAME: &str = "envkeep.env";

/// Directory name for environment configuration files.
pub const ENVIRONMENTS_DIR_NAME: &str = ".environments";

/// Directory name for configuration snapshots.
pub const SNAPSHOTS_DIR_NAME: &str = ".snapshots";

/// Resolved locations of every file and directory envkeep manages.
///
/// Paths are derived from a single root directory. Nothing here checks if the
/// paths actually exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    root: PathBuf,
    primary_file: PathBuf,
    environments_dir: PathBuf,
    snapshots_dir: PathBuf,
}

impl PathConfig {
    /// Construct path layout rooted at target directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            primary_file: root.join(PRIMARY_FILE_NAME),
            environments_dir: root.join(ENVIRONMENTS_DIR_NAME),
            snapshots_dir: root.join(SNAPSHOTS_DIR_NAME),
            root,
        }
    }

    /// Construct default path layout at `~/.envkeep`.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if home directory path cannot be determined.
    pub fn try_default() -> Result<Self> {
        Ok(Self::new(home_dir()?.join(ROOT_DIR_NAME)))
    }

    /// Directory that holds all managed state, and the synchronized work tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the primary configuration file.
    pub fn primary_file(&self) -> &Path {
        &self.primary_file
    }

    /// Directory of environment configuration files.
    pub fn environments_dir(&self) -> &Path {
        &self.environments_dir
    }

    /// Directory of configuration snapshots.
    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    /// Path of an environment entry inside the environments directory.
    ///
    /// Only the base name of `name` is used, so `./some/dir/dev.env` maps to
    /// `.environments/dev.env`.
    pub fn environment_entry(&self, name: impl AsRef<Path>) -> PathBuf {
        match name.as_ref().file_name() {
            Some(base) => self.environments_dir.join(base),
            None => self.environments_dir.join(name.as_ref()),
        }
    }
}

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Default location of the private key used for SSH remotes.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_ssh_key() -> Result<PathBuf> {
    Ok(home_dir()?.join(".ssh").join("id_rsa"))
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
