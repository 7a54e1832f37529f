// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote synchronization.
//!
//! The envkeep root directory, and any cloned environment repository, can be
//! kept in sync with a git remote. A sync runs the following protocol:
//!
//! 1. Acquire the repository. A directory without repository metadata is
//!    initialized and bound to the given URL as `origin`. An existing
//!    repository keeps its own `origin`, which always wins over the given URL.
//! 2. Authenticate against the remote.
//! 3. Detect drift, i.e., uncommitted local changes. If there is any, the
//!    caller decides through a [`Disposition`] whether to auto-commit it or to
//!    stop so the operator can resolve it by hand.
//! 4. Pull from the remote. An up to date branch or an empty remote are fine.
//! 5. Only if auto-commit was chosen: stage every changed path, commit, and
//!    push.
//!
//! Choosing manual resolution is not an error. It simply yields
//! [`SyncOutcome::ManualResolutionRequired`] with nothing synchronized.

pub mod auth;
pub mod repo;

use crate::{
    config::REMOTE_STORAGE,
    path::PathConfig,
    snapshot::timestamp,
    sync::{
        auth::{AuthError, Authenticator},
        repo::{LocalChangeSet, PullOutcome, RepositoryAccess, RepositoryHandle, VcsError, ORIGIN},
    },
};

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Operator's choice on how to handle drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Commit every changed path, and push it to the remote.
    AutoCommit,

    /// Stop, and leave drift for the operator to resolve.
    Manual,
}

/// Result of a sync that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Remote was pulled, and local changes were pushed if requested.
    Synchronized { pull: PullOutcome, pushed: bool },

    /// Operator chose to resolve drift by hand. Nothing was synchronized.
    ManualResolutionRequired { changes: LocalChangeSet },
}

/// Commit message used for auto-committed drift.
pub fn commit_message(time: DateTime<Local>) -> String {
    format!("feat: updating config files - {}", timestamp(time))
}

/// Derive environment name from a remote URL.
///
/// Takes the last path component, and drops everything after its first dot,
/// e.g., `git@example.com:me/staging.git` becomes `staging`.
pub fn environment_name(url: &str) -> Option<&str> {
    let base = url
        .trim()
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?;
    let name = base.split('.').next()?;

    (!name.is_empty()).then_some(name)
}

/// Drive synchronization of configuration with remote repositories.
#[derive(Debug)]
pub struct SyncCoordinator<R, A>
where
    R: RepositoryAccess,
    A: Authenticator,
{
    paths: PathConfig,
    access: R,
    authenticator: A,
}

impl<R, A> SyncCoordinator<R, A>
where
    R: RepositoryAccess,
    A: Authenticator,
{
    /// Construct new sync coordinator.
    pub fn new(paths: PathConfig, access: R, authenticator: A) -> Self {
        Self {
            paths,
            access,
            authenticator,
        }
    }

    /// Synchronize the envkeep root directory with a remote.
    ///
    /// Uses `remote_url` unless the root is already a repository with an
    /// `origin` remote. The `resolver` is only called when drift is detected.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::NotConfigured`] if `remote_url` is empty. Nothing
    ///   is touched in that case.
    /// - Return [`SyncError::CreateDir`] if root directory cannot be created.
    /// - Return [`SyncError::Authentication`] if credentials cannot be
    ///   acquired.
    /// - Return [`SyncError::Repository`] if any repository step fails.
    #[instrument(skip(self, resolver), level = "debug")]
    pub fn sync(
        &mut self,
        remote_url: &str,
        resolver: impl FnMut(&LocalChangeSet) -> Disposition,
    ) -> Result<SyncOutcome> {
        let remote_url = remote_url.trim();
        if remote_url.is_empty() {
            return Err(SyncError::NotConfigured {
                key: REMOTE_STORAGE,
            });
        }

        let root = self.paths.root().to_path_buf();
        let (handle, url) = self.acquire(&root, remote_url)?;
        self.run(handle, &url, resolver)
    }

    /// Synchronize an environment repository with its own remote.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::RepositoryNotFound`] if no environment
    ///   repository of that name exists.
    /// - Return [`SyncError::MissingOrigin`] if environment repository has no
    ///   `origin` remote.
    /// - Return [`SyncError::Authentication`] if credentials cannot be
    ///   acquired.
    /// - Return [`SyncError::Repository`] if any repository step fails.
    #[instrument(skip(self, resolver), level = "debug")]
    pub fn sync_environment(
        &mut self,
        name: &str,
        resolver: impl FnMut(&LocalChangeSet) -> Disposition,
    ) -> Result<SyncOutcome> {
        let path = self.paths.environment_entry(name);
        if !self.access.is_repository(&path) {
            return Err(SyncError::RepositoryNotFound { path });
        }

        let handle = self.access.open(&path)?;
        let Some(url) = handle.remote_url(ORIGIN)? else {
            return Err(SyncError::MissingOrigin { path });
        };
        self.run(handle, &url, resolver)
    }

    /// Clone remote environment repository into the environments directory.
    ///
    /// Returns path of the new environment repository.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::InvalidRemote`] if no environment name can be
    ///   derived from `url`.
    /// - Return [`SyncError::AlreadyExists`] if target path is taken.
    /// - Return [`SyncError::CreateDir`] if environments directory cannot be
    ///   created.
    /// - Return [`SyncError::Authentication`] if credentials cannot be
    ///   acquired.
    /// - Return [`SyncError::Repository`] if clone fails.
    #[instrument(skip(self), level = "debug")]
    pub fn clone_environment(&mut self, url: &str) -> Result<PathBuf> {
        let url = url.trim();
        let name = environment_name(url).ok_or_else(|| SyncError::InvalidRemote {
            url: url.to_owned(),
        })?;

        let path = self.paths.environment_entry(name);
        if path.exists() {
            return Err(SyncError::AlreadyExists { path });
        }

        let credentials = self.authenticator.authenticate(url)?;
        create_dir(self.paths.environments_dir())?;
        self.access.clone_repository(url, &path, &credentials)?;
        info!("cloned environment {name:?} into {:?}", path.display());

        Ok(path)
    }

    fn acquire(&self, dir: &Path, remote_url: &str) -> Result<(R::Handle, String)> {
        if self.access.is_repository(dir) {
            let mut handle = self.access.open(dir)?;
            let url = match handle.remote_url(ORIGIN)? {
                Some(existing) => {
                    if existing != remote_url {
                        warn!("using existing {ORIGIN} {existing:?} instead of {remote_url:?}");
                    }
                    existing
                }
                None => {
                    handle.add_remote(ORIGIN, remote_url)?;
                    remote_url.to_owned()
                }
            };

            return Ok((handle, url));
        }

        create_dir(dir)?;
        let mut handle = self.access.init(dir)?;
        handle.add_remote(ORIGIN, remote_url)?;

        Ok((handle, remote_url.to_owned()))
    }

    fn run(
        &mut self,
        mut handle: R::Handle,
        url: &str,
        mut resolver: impl FnMut(&LocalChangeSet) -> Disposition,
    ) -> Result<SyncOutcome> {
        let credentials = self.authenticator.authenticate(url)?;

        let changes = handle.status()?;
        let auto_commit = if changes.is_empty() {
            false
        } else {
            info!("{} local change(s) detected", changes.len());
            match resolver(&changes) {
                Disposition::AutoCommit => true,
                Disposition::Manual => {
                    info!("leaving local changes for manual resolution");
                    return Ok(SyncOutcome::ManualResolutionRequired { changes });
                }
            }
        };

        let pull = handle.pull(&credentials)?;
        if !auto_commit {
            return Ok(SyncOutcome::Synchronized {
                pull,
                pushed: false,
            });
        }

        for change in changes.iter() {
            handle.stage(&change.path)?;
        }
        handle.commit(&commit_message(Local::now()))?;
        handle.push(&credentials)?;

        Ok(SyncOutcome::Synchronized { pull, pushed: true })
    }
}

fn create_dir(path: &Path) -> Result<()> {
    mkdirp::mkdirp(path).map_err(|err| SyncError::CreateDir {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(())
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No remote to synchronize with.
    #[error("no remote configured, set {key} in the running configuration")]
    NotConfigured { key: &'static str },

    /// Credentials cannot be acquired.
    #[error("authentication error")]
    Authentication(#[from] AuthError),

    /// Repository step fails.
    #[error(transparent)]
    Repository(#[from] VcsError),

    /// Named environment repository does not exist.
    #[error("no environment repository at {:?}", path.display())]
    RepositoryNotFound { path: PathBuf },

    /// Environment repository has no remote to synchronize with.
    #[error("environment repository at {:?} has no origin remote", path.display())]
    MissingOrigin { path: PathBuf },

    /// Clone target is already taken.
    #[error("environment already exists at {:?}", path.display())]
    AlreadyExists { path: PathBuf },

    /// Environment name cannot be derived from remote URL.
    #[error("cannot derive environment name from {url:?}")]
    InvalidRemote { url: String },

    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = SyncError> = std::result::Result<T, E>;
