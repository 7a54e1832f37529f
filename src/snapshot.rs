// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration snapshots.
//!
//! Before envkeep overwrites an existing configuration file it archives the
//! current content into the snapshot directory. A snapshot is named after the
//! base name of its source file plus the time it was taken, e.g.,
//! `envkeep-02042020_170240.env`. A second snapshot of the same file within
//! the same second gets a counter suffix, e.g.,
//! `envkeep-02042020_170240-1.env`. Snapshots are never modified after they are
//! written; the only thing that ever touches them again is the retention
//! sweep.

use crate::{
    path::PathConfig,
    store::{KeyValueStore, StoreError},
};

use chrono::{DateTime, Local};
use std::{
    fs::OpenOptions,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Snapshots taken within the same second get a counter suffix, up to this many.
const MAX_COLLISIONS: usize = 1000;

/// Format of timestamps used in snapshot names and commit messages.
pub const TIMESTAMP_FORMAT: &str = "%d%m%Y_%H%M%S";

/// Format timestamp as `DDMMYYYY_HHMMSS`.
pub fn timestamp(time: DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Derive snapshot file name for a source file at a given timestamp.
///
/// Everything after the first dot of the base name is dropped, so
/// `envkeep.env` and `envkeep.old.env` both become `envkeep-<timestamp>.env`.
pub fn snapshot_name(source: impl AsRef<Path>, stamp: impl AsRef<str>) -> String {
    let base = source
        .as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = base.split('.').next().unwrap_or_default();

    format!("{stem}-{}.env", stamp.as_ref())
}

/// Archive configuration files into the snapshot directory.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    snapshots_dir: PathBuf,
}

impl SnapshotManager {
    /// Construct new snapshot manager for target path layout.
    pub fn new(paths: &PathConfig) -> Self {
        Self {
            snapshots_dir: paths.snapshots_dir().to_path_buf(),
        }
    }

    /// Directory snapshots are written to.
    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    /// Take snapshot of a configuration file using the current local time.
    ///
    /// Caller must make sure the file exists. Content is loaded and
    /// re-serialized, so the snapshot holds normalized formatting rather than
    /// a byte-for-byte copy.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::CreateDir`] if snapshot directory cannot be
    ///   created.
    /// - Return [`BackupError::Load`] if source cannot be loaded.
    /// - Return [`BackupError::Write`] if snapshot cannot be written.
    pub fn backup(&self, file: impl AsRef<Path>) -> Result<PathBuf> {
        self.backup_at(file, Local::now())
    }

    /// Take snapshot of a configuration file stamped with given time.
    ///
    /// # Errors
    ///
    /// - Same as [`SnapshotManager::backup`].
    #[instrument(skip(self, file, time), level = "debug")]
    pub fn backup_at(&self, file: impl AsRef<Path>, time: DateTime<Local>) -> Result<PathBuf> {
        let file = file.as_ref();
        if !self.snapshots_dir.exists() {
            debug!(
                "snapshot directory {:?} does not exist, creating it",
                self.snapshots_dir.display()
            );
        }
        mkdirp::mkdirp(&self.snapshots_dir).map_err(|err| BackupError::CreateDir {
            source: err,
            path: self.snapshots_dir.clone(),
        })?;

        let content = KeyValueStore::read(file).map_err(BackupError::Load)?;
        let stamp = timestamp(time);
        let mut counter = 0;
        loop {
            let stamp = match counter {
                0 => stamp.clone(),
                n => format!("{stamp}-{n}"),
            };
            let snapshot = self.snapshots_dir.join(snapshot_name(file, stamp));

            // INVARIANT: Existing snapshots are never overwritten.
            match create_snapshot(&snapshot, &content) {
                Ok(()) => {
                    info!("backed up {:?} to {:?}", file.display(), snapshot.display());
                    return Ok(snapshot);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists && counter < MAX_COLLISIONS => {
                    debug!("snapshot {:?} already taken", snapshot.display());
                    counter += 1;
                }
                Err(err) => {
                    return Err(BackupError::Write {
                        source: err,
                        path: snapshot,
                    })
                }
            }
        }
    }
}

fn create_snapshot(path: &Path, content: &KeyValueStore) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content.to_string().as_bytes())?;
    file.sync_all()
}

/// Snapshot error types.
///
/// Any of these must abort the mutation that asked for the snapshot.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Snapshot directory cannot be created.
    #[error("backup failed: cannot create snapshot directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File to back up cannot be loaded.
    #[error("backup failed: cannot load file to back up")]
    Load(#[source] StoreError),

    /// Snapshot cannot be written.
    #[error("backup failed: cannot write snapshot {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = BackupError> = std::result::Result<T, E>;
