// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration lifecycle.
//!
//! Orchestrates every mutation of the running configuration and of the
//! environment configurations. All mutations follow the same sequence:
//!
//! 1. Validate the source file against the expected flavor.
//! 2. Resolve the destination, and check whether it already exists.
//! 3. Snapshot the destination if it exists. A failed snapshot aborts the
//!    mutation before anything is overwritten.
//! 4. Write or merge the new content into the destination.
//!
//! # Flavor Gate
//!
//! Environment mutations require a source carrying `ENVIRONMENT_VERSION`, and
//! nothing else. Primary mutations only reject a source that carries
//! `ENVIRONMENT_VERSION`, so plain key files can be imported into the running
//! configuration. The primary file never loses its own `PRIMARY_VERSION`
//! marker: when the incoming content lacks it, the previous marker is kept.

use crate::{
    config::{
        self, ConfigError, Flavor, ValidationError, DEFAULT_PRIMARY_VERSION, ENVIRONMENT_VERSION,
        PRIMARY_VERSION,
    },
    path::PathConfig,
    snapshot::{BackupError, SnapshotManager},
    store::{check_key, InvalidKey, KeyValueStore, StoreError},
};

use std::{
    fs::read_dir,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Kind of entry found in the environments directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentKind {
    /// Single environment configuration file.
    File,

    /// Directory holding a synchronized environment repository.
    Repository,
}

/// Entry of the environments directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub path: PathBuf,
    pub kind: EnvironmentKind,
}

/// Manage the running configuration and environment configurations.
#[derive(Debug, Clone)]
pub struct ConfigLifecycle {
    paths: PathConfig,
    snapshots: SnapshotManager,
}

impl ConfigLifecycle {
    /// Construct new configuration lifecycle for target path layout.
    pub fn new(paths: PathConfig) -> Self {
        let snapshots = SnapshotManager::new(&paths);
        Self { paths, snapshots }
    }

    /// Path layout being managed.
    pub fn paths(&self) -> &PathConfig {
        &self.paths
    }

    /// Load the running configuration.
    ///
    /// Creates a minimal primary configuration holding only
    /// `PRIMARY_VERSION=1` if none exists yet.
    ///
    /// # Errors
    ///
    /// - Return [`LifecycleError::CreateDir`] if parent directories of primary
    ///   configuration cannot be created.
    /// - Return [`LifecycleError::Store`] if primary configuration cannot be
    ///   written or read.
    pub fn read_primary(&self) -> Result<KeyValueStore> {
        let primary = self.paths.primary_file();
        if !primary.exists() {
            info!("creating default configuration at {:?}", primary.display());
            if let Some(parent) = primary.parent() {
                create_dir(parent)?;
            }

            KeyValueStore::from_iter([(PRIMARY_VERSION, DEFAULT_PRIMARY_VERSION)]).write(primary)?;
        }

        Ok(KeyValueStore::read(primary)?)
    }

    /// Check configuration file against the markers of a flavor.
    ///
    /// # Errors
    ///
    /// - Return [`LifecycleError::Config`] if file cannot be loaded, or
    ///   carries the wrong marker.
    pub fn validate(&self, path: impl AsRef<Path>, flavor: Flavor) -> Result<KeyValueStore> {
        Ok(config::validate(path, flavor)?)
    }

    /// Replace a configuration file with the content of a source file.
    ///
    /// The destination is the primary configuration, or the entry named after
    /// the source's base name inside the environments directory. Returns the
    /// path that was written.
    ///
    /// # Errors
    ///
    /// - Return [`LifecycleError::Config`] if source fails the flavor gate.
    /// - Return [`LifecycleError::CreateDir`] if environments directory
    ///   cannot be created.
    /// - Return [`LifecycleError::Backup`] if destination cannot be
    ///   snapshotted. Destination is left untouched.
    /// - Return [`LifecycleError::Store`] if destination cannot be written.
    #[instrument(skip(self, source), level = "debug")]
    pub fn replace(&self, source: impl AsRef<Path>, flavor: Flavor) -> Result<PathBuf> {
        let source = source.as_ref();
        let mut incoming = self.check_source(source, flavor)?;

        let destination = match flavor {
            Flavor::Primary => self.paths.primary_file().to_path_buf(),
            Flavor::Environment => {
                create_dir(self.paths.environments_dir())?;
                self.paths.environment_entry(source)
            }
        };
        info!(
            "updating {flavor} configuration {:?} with {:?}",
            destination.display(),
            source.display()
        );

        let previous = self.backup_existing(&destination)?;
        if flavor == Flavor::Primary {
            retain_primary_marker(&mut incoming, previous.as_ref())?;
        }
        incoming.write(&destination)?;

        Ok(destination)
    }

    /// Merge a source file into an existing configuration file.
    ///
    /// Every key of the source is overlaid on top of the destination.
    /// Conflicting keys take the source's value, and keys only present in the
    /// destination are preserved.
    ///
    /// Primary merges always target the primary configuration, regardless of
    /// `destination`. Environment merges target the entry named after
    /// `destination` inside the environments directory, or after `source` if
    /// no destination was given.
    ///
    /// # Errors
    ///
    /// - Return [`LifecycleError::MissingSource`] if `source` is empty.
    /// - Return [`LifecycleError::Config`] if source fails the flavor gate.
    /// - Return [`LifecycleError::DestinationNotFound`] if the resolved
    ///   destination does not exist. Merging never creates a destination.
    /// - Return [`LifecycleError::Backup`] if destination cannot be
    ///   snapshotted. Destination is left untouched.
    /// - Return [`LifecycleError::Store`] if destination cannot be read or
    ///   written.
    #[instrument(skip(self, source, destination), level = "debug")]
    pub fn merge(
        &self,
        source: impl AsRef<Path>,
        destination: Option<&Path>,
        flavor: Flavor,
    ) -> Result<PathBuf> {
        let source = source.as_ref();
        if source.as_os_str().is_empty() {
            return Err(LifecycleError::MissingSource);
        }

        let destination = self.merge_destination(source, destination, flavor);
        let incoming = self.check_source(source, flavor)?;
        if !destination.exists() {
            return Err(LifecycleError::DestinationNotFound { path: destination });
        }

        info!(
            "merging {:?} into {flavor} configuration {:?}",
            source.display(),
            destination.display()
        );
        let mut merged = self
            .backup_existing(&destination)?
            .unwrap_or_default();
        merged.overlay(&incoming);
        if flavor == Flavor::Primary {
            retain_primary_marker(&mut merged, None)?;
        }
        merged.write(&destination)?;

        Ok(destination)
    }

    /// Apply assignments to the running configuration.
    ///
    /// Snapshots the running configuration first, like every other mutation.
    /// Returns the updated configuration.
    ///
    /// # Errors
    ///
    /// - Return [`LifecycleError::InvalidKey`] if any key cannot be written
    ///   as an assignment. Nothing is touched in that case.
    /// - Return [`LifecycleError::Backup`] if running configuration cannot be
    ///   snapshotted.
    /// - Return [`LifecycleError::Store`] if running configuration cannot be
    ///   read or written.
    #[instrument(skip(self, assignments), level = "debug")]
    pub fn set<K, V>(&self, assignments: impl IntoIterator<Item = (K, V)>) -> Result<KeyValueStore>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let assignments = assignments
            .into_iter()
            .map(|(key, value)| check_key(key.as_ref()).map(|_| (key, value)))
            .collect::<std::result::Result<Vec<_>, InvalidKey>>()?;

        let mut store = self.read_primary()?;
        let primary = self.paths.primary_file();
        self.snapshots.backup(primary)?;

        for (key, value) in assignments {
            store.set(key.as_ref(), value.as_ref())?;
            info!("set {} in running configuration", key.as_ref().trim().to_uppercase());
        }
        store.write(primary)?;

        Ok(store)
    }

    /// List entries of the environments directory sorted by name.
    ///
    /// Configuration files ending in `.env` and directories are listed. A
    /// missing environments directory simply yields nothing.
    ///
    /// # Errors
    ///
    /// - Return [`LifecycleError::ReadDir`] if environments directory exists
    ///   but cannot be read.
    pub fn list_environments(&self) -> Result<Vec<Environment>> {
        let dir = self.paths.environments_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = read_dir(dir).map_err(|err| LifecycleError::ReadDir {
            source: err,
            path: dir.to_path_buf(),
        })?;

        let mut environments = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let environment = if path.is_dir() {
                Environment {
                    name: file_name,
                    path,
                    kind: EnvironmentKind::Repository,
                }
            } else if let Some(name) = file_name.strip_suffix(".env") {
                Environment {
                    name: name.to_owned(),
                    path,
                    kind: EnvironmentKind::File,
                }
            } else {
                debug!("skipping {:?}", path.display());
                continue;
            };
            environments.push(environment);
        }
        environments.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(environments)
    }

    /// Collect configuration of a named environment.
    ///
    /// A repository environment overlays every `*.env` file at its top-level
    /// in name order. A file environment is loaded as is, and may be named
    /// with or without its `.env` extension.
    ///
    /// # Errors
    ///
    /// - Return [`LifecycleError::EnvironmentNotFound`] if no such environment
    ///   exists.
    /// - Return [`LifecycleError::Store`] if environment file cannot be read.
    pub fn inspect_environment(&self, name: impl AsRef<str>) -> Result<KeyValueStore> {
        let name = name.as_ref();
        let entry = self.paths.environment_entry(name);
        if entry.is_dir() {
            return collect_env_files(&entry);
        }

        let with_extension = self.paths.environment_entry(format!("{name}.env"));
        for candidate in [entry, with_extension] {
            if candidate.is_file() {
                return Ok(KeyValueStore::read(candidate)?);
            }
        }

        Err(LifecycleError::EnvironmentNotFound {
            name: name.to_owned(),
        })
    }

    fn merge_destination(
        &self,
        source: &Path,
        destination: Option<&Path>,
        flavor: Flavor,
    ) -> PathBuf {
        match flavor {
            Flavor::Primary => self.paths.primary_file().to_path_buf(),
            Flavor::Environment => match destination {
                Some(path) if !path.as_os_str().is_empty() => self.paths.environment_entry(path),
                _ => self.paths.environment_entry(source),
            },
        }
    }

    fn check_source(&self, source: &Path, flavor: Flavor) -> Result<KeyValueStore> {
        match flavor {
            Flavor::Environment => Ok(config::validate(source, flavor)?),
            Flavor::Primary => {
                let store = KeyValueStore::read(source).map_err(ConfigError::Store)?;
                if store.contains_key(ENVIRONMENT_VERSION) {
                    return Err(ConfigError::Invalid {
                        source: ValidationError::EnvironmentForPrimary,
                        path: source.to_path_buf(),
                    }
                    .into());
                }

                Ok(store)
            }
        }
    }

    // INVARIANT: Never overwrite an existing file without a snapshot of it.
    fn backup_existing(&self, destination: &Path) -> Result<Option<KeyValueStore>> {
        if !destination.exists() {
            debug!("{:?} does not exist yet, no snapshot needed", destination.display());
            return Ok(None);
        }

        self.snapshots.backup(destination)?;
        Ok(Some(KeyValueStore::read(destination)?))
    }
}

fn retain_primary_marker(
    incoming: &mut KeyValueStore,
    previous: Option<&KeyValueStore>,
) -> Result<()> {
    if incoming.contains_key(PRIMARY_VERSION) {
        return Ok(());
    }

    let version = previous
        .and_then(|store| store.get(PRIMARY_VERSION))
        .unwrap_or(DEFAULT_PRIMARY_VERSION)
        .to_owned();
    incoming.set(PRIMARY_VERSION, version)?;

    Ok(())
}

fn collect_env_files(dir: &Path) -> Result<KeyValueStore> {
    let pattern = format!("{}/*.env", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut files = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("cannot access {:?}: {err}", err.path().display());
                None
            }
        })
        .collect::<Vec<_>>();
    files.sort();

    let mut merged = KeyValueStore::new();
    for file in files {
        match KeyValueStore::read(&file) {
            Ok(store) => merged.overlay(&store),
            Err(err) => warn!("skipping {:?}: {err}", file.display()),
        }
    }

    Ok(merged)
}

fn create_dir(path: &Path) -> Result<()> {
    mkdirp::mkdirp(path).map_err(|err| LifecycleError::CreateDir {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(())
}

/// Configuration lifecycle error types.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Merge invoked without a source file.
    #[error("please provide valid source/destination configuration files for merge")]
    MissingSource,

    /// Merge destination does not exist.
    #[error("destination not found: {:?}", path.display())]
    DestinationNotFound { path: PathBuf },

    /// Named environment does not exist.
    #[error("environment {name:?} not found")]
    EnvironmentNotFound { name: String },

    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory cannot be listed.
    #[error("failed to read directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Source file cannot be loaded, or fails validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Snapshot of destination failed.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Configuration file I/O fails.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Key cannot be written as an assignment.
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),

    /// Environment file pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

/// Friendly result alias :3
type Result<T, E = LifecycleError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, read_to_string, write};

    fn lifecycle() -> anyhow::Result<ConfigLifecycle> {
        let paths = PathConfig::new(std::env::current_dir()?.join(".envkeep"));
        Ok(ConfigLifecycle::new(paths))
    }

    fn snapshot_count(lifecycle: &ConfigLifecycle) -> usize {
        read_dir(lifecycle.paths().snapshots_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[sealed_test]
    fn read_primary_creates_default() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        let store = lifecycle.read_primary()?;

        assert_eq!(store, KeyValueStore::from_iter([(PRIMARY_VERSION, "1")]));
        assert_eq!(read_to_string(lifecycle.paths().primary_file())?, "PRIMARY_VERSION=1\n");

        // Second read leaves existing file alone.
        write(lifecycle.paths().primary_file(), "PRIMARY_VERSION=7\nFOO=bar\n")?;
        assert_eq!(lifecycle.read_primary()?.get("foo"), Some("bar"));
        assert_eq!(snapshot_count(&lifecycle), 0);

        Ok(())
    }

    #[sealed_test]
    fn replace_environment_creates_entry_without_snapshot() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        write("zero1.env", "zerokey1=zeroval1\nENVIRONMENT_VERSION=1\n")?;

        let destination = lifecycle.replace("zero1.env", Flavor::Environment)?;
        assert_eq!(destination, lifecycle.paths().environments_dir().join("zero1.env"));
        assert_eq!(
            KeyValueStore::read(&destination)?,
            KeyValueStore::from_iter([("ZEROKEY1", "zeroval1"), (ENVIRONMENT_VERSION, "1")])
        );
        assert_eq!(snapshot_count(&lifecycle), 0);

        // Replacing again archives the previous content.
        write("zero1.env", "zerokey1=other\nENVIRONMENT_VERSION=1\n")?;
        lifecycle.replace("zero1.env", Flavor::Environment)?;
        assert_eq!(snapshot_count(&lifecycle), 1);
        assert_eq!(KeyValueStore::read(&destination)?.get("zerokey1"), Some("other"));

        Ok(())
    }

    #[sealed_test]
    fn replace_rejects_wrong_flavor_without_mutation() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        lifecycle.read_primary()?;
        write("env.env", "ENVIRONMENT_VERSION=1\nKEY=1\n")?;

        let error = lifecycle.replace("env.env", Flavor::Primary).unwrap_err();
        assert!(matches!(
            error,
            LifecycleError::Config(ConfigError::Invalid {
                source: ValidationError::EnvironmentForPrimary,
                ..
            })
        ));

        write("plain.env", "KEY=1\n")?;
        let error = lifecycle.replace("plain.env", Flavor::Environment).unwrap_err();
        assert!(matches!(
            error,
            LifecycleError::Config(ConfigError::Invalid {
                source: ValidationError::NoMarker,
                ..
            })
        ));

        assert_eq!(read_to_string(lifecycle.paths().primary_file())?, "PRIMARY_VERSION=1\n");
        assert!(!lifecycle.paths().environments_dir().join("plain.env").exists());
        assert_eq!(snapshot_count(&lifecycle), 0);

        Ok(())
    }

    #[sealed_test]
    fn replace_primary_keeps_version_marker() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        create_dir_all(lifecycle.paths().root())?;
        write(lifecycle.paths().primary_file(), "PRIMARY_VERSION=3\nOLD=1\n")?;
        write("config.env", "testkey1=testval1")?;

        lifecycle.replace("config.env", Flavor::Primary)?;
        assert_eq!(
            KeyValueStore::read(lifecycle.paths().primary_file())?,
            KeyValueStore::from_iter([("TESTKEY1", "testval1"), (PRIMARY_VERSION, "3")])
        );
        assert_eq!(snapshot_count(&lifecycle), 1);

        Ok(())
    }

    #[sealed_test]
    fn merge_overlays_source_onto_destination() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        create_dir_all(lifecycle.paths().environments_dir())?;
        let destination = lifecycle.paths().environments_dir().join("dev.env");
        write(&destination, "ENVIRONMENT_VERSION=1\nA=1\nB=2\n")?;
        write("patch.env", "ENVIRONMENT_VERSION=1\nB=3\nC=4\n")?;

        let result = lifecycle.merge("patch.env", Some(Path::new("dev.env")), Flavor::Environment)?;
        assert_eq!(result, destination);
        assert_eq!(
            KeyValueStore::read(&destination)?,
            KeyValueStore::from_iter([
                (ENVIRONMENT_VERSION, "1"),
                ("A", "1"),
                ("B", "3"),
                ("C", "4"),
            ])
        );
        assert_eq!(snapshot_count(&lifecycle), 1);

        Ok(())
    }

    #[sealed_test]
    fn merge_environment_defaults_to_source_name() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        write("dev.env", "ENVIRONMENT_VERSION=1\nKEY=1\n")?;

        let error = lifecycle.merge("dev.env", None, Flavor::Environment).unwrap_err();
        assert!(matches!(error, LifecycleError::DestinationNotFound { ref path }
            if path == &lifecycle.paths().environments_dir().join("dev.env")));
        assert_eq!(snapshot_count(&lifecycle), 0);

        Ok(())
    }

    #[sealed_test]
    fn merge_primary_ignores_destination_hint() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        lifecycle.read_primary()?;
        write("extra.env", "GC_AUTO=yes\n")?;

        let result =
            lifecycle.merge("extra.env", Some(Path::new("whatever.env")), Flavor::Primary)?;
        assert_eq!(result, lifecycle.paths().primary_file());
        assert_eq!(
            read_to_string(lifecycle.paths().primary_file())?,
            indoc! {"
                GC_AUTO=yes
                PRIMARY_VERSION=1
            "}
        );

        Ok(())
    }

    #[sealed_test]
    fn merge_without_source_is_rejected() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        let error = lifecycle.merge("", None, Flavor::Primary).unwrap_err();
        assert_eq!(
            error.to_string(),
            "please provide valid source/destination configuration files for merge"
        );

        let error = lifecycle.merge("abc.env", None, Flavor::Primary).unwrap_err();
        assert!(matches!(error, LifecycleError::Config(ConfigError::Store(_))));

        Ok(())
    }

    #[sealed_test]
    fn failed_backup_aborts_overwrite() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        lifecycle.read_primary()?;
        // A plain file where the snapshot directory should be.
        write(lifecycle.paths().snapshots_dir(), "not a directory")?;
        write("config.env", "KEY=1\n")?;

        let error = lifecycle.replace("config.env", Flavor::Primary).unwrap_err();
        assert!(matches!(error, LifecycleError::Backup(_)));
        assert!(error.to_string().starts_with("backup failed"));
        assert_eq!(read_to_string(lifecycle.paths().primary_file())?, "PRIMARY_VERSION=1\n");

        Ok(())
    }

    #[sealed_test]
    fn set_snapshots_then_writes() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        let store = lifecycle.set([("remote_storage", " git@example.com:me/cfg.git ")])?;

        assert_eq!(store.get("REMOTE_STORAGE"), Some("git@example.com:me/cfg.git"));
        assert_eq!(
            KeyValueStore::read(lifecycle.paths().primary_file())?,
            KeyValueStore::from_iter([
                (PRIMARY_VERSION, "1"),
                ("REMOTE_STORAGE", "git@example.com:me/cfg.git"),
            ])
        );
        assert_eq!(snapshot_count(&lifecycle), 1);

        Ok(())
    }

    #[sealed_test]
    fn set_rejects_unwritable_key_without_touching_anything() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        lifecycle.read_primary()?;

        let error = lifecycle
            .set([("EDITOR", "vim"), ("BAD=KEY", "value")])
            .unwrap_err();
        assert!(matches!(error, LifecycleError::InvalidKey(_)), "{error:?}");
        assert_eq!(read_to_string(lifecycle.paths().primary_file())?, "PRIMARY_VERSION=1\n");
        assert_eq!(snapshot_count(&lifecycle), 0);

        Ok(())
    }

    #[sealed_test]
    fn set_values_survive_later_reads_and_merges() -> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        lifecycle.set([("NOTE", "line one\nline two"), ("GREETING", "'hi'")])?;

        let store = lifecycle.read_primary()?;
        assert_eq!(store.get("NOTE"), Some("line one\nline two"));
        assert_eq!(store.get("GREETING"), Some("'hi'"));

        for _ in 0..2 {
            write("extra.env", "EXTRA=1\n")?;
            lifecycle.merge("extra.env", None, Flavor::Primary)?;
        }
        let store = lifecycle.read_primary()?;
        assert_eq!(store.get("NOTE"), Some("line one\nline two"));
        assert_eq!(store.get("GREETING"), Some("'hi'"));
        assert_eq!(store.get(PRIMARY_VERSION), Some("1"));

        Ok(())
    }

    #[sealed_test]
    fn environments_are_listed_and_inspected()-> anyhow::Result<()> {
        let lifecycle = lifecycle()?;
        assert_eq!(lifecycle.list_environments()?, Vec::new());

        let envs = lifecycle.paths().environments_dir();
        create_dir_all(envs.join("staging"))?;
        write(envs.join("dev.env"), "ENVIRONMENT_VERSION=1\nDB=dev\n")?;
        write(envs.join("notes.txt"), "ignored")?;
        write(envs.join("staging").join("zero.env"), "ZERO=1\nSHARED=zero\n")?;
        write(envs.join("staging").join("dash1.env"), "DASH=1\nSHARED=dash\n")?;

        let listed = lifecycle
            .list_environments()?
            .into_iter()
            .map(|env| (env.name, env.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            listed,
            vec![
                ("dev".to_owned(), EnvironmentKind::File),
                ("staging".to_owned(), EnvironmentKind::Repository),
            ]
        );

        assert_eq!(lifecycle.inspect_environment("dev")?.get("db"), Some("dev"));
        assert_eq!(lifecycle.inspect_environment("dev.env")?.get("db"), Some("dev"));
        assert_eq!(
            lifecycle.inspect_environment("staging")?,
            KeyValueStore::from_iter([("DASH", "1"), ("ZERO", "1"), ("SHARED", "zero")])
        );
        assert!(matches!(
            lifecycle.inspect_environment("prod"),
            Err(LifecycleError::EnvironmentNotFound { .. })
        ));

        Ok(())
    }
}
