// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository access.
//!
//! Thin layer over the handful of git operations the sync protocol needs. The
//! layer is split in two traits: [`RepositoryAccess`] to obtain a repository
//! (init, open, clone), and [`RepositoryHandle`] to operate on one. The libgit2
//! implementation lives in [`Git2Access`] and [`Git2Repository`].
//!
//! Nothing here retries. Every failure is reported through [`VcsError`],
//! tagged by the step that produced it.
//!
//! # Pull Semantics
//!
//! Pulling fetches every branch of `origin`, then fast-forwards the current
//! branch. Merges are never attempted: diverged history is an error that the
//! operator has to resolve by hand. Checkouts are "safe", so local edits are
//! never clobbered.

use crate::sync::auth::Credentials;

use auth_git2::GitAuthenticator;
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    ErrorCode, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository, ResetType, Signature,
    Status, StatusOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    cell::RefCell,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time,
};
use tracing::{debug, info, instrument, warn};

/// Name of the remote every synchronized repository is bound to.
pub const ORIGIN: &str = "origin";

const FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
const FALLBACK_NAME: &str = "envkeep";
const FALLBACK_EMAIL: &str = "envkeep@localhost";

/// Layer of indirection for repository access.
pub trait RepositoryAccess {
    type Handle: RepositoryHandle;

    /// Check if directory holds repository metadata.
    fn is_repository(&self, path: &Path) -> bool;

    /// Initialize a new repository.
    fn init(&self, path: &Path) -> Result<Self::Handle>;

    /// Open existing repository.
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Clone remote repository into target path.
    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        credentials: &Credentials,
    ) -> Result<Self::Handle>;
}

/// Operations on an acquired repository.
pub trait RepositoryHandle {
    /// Bind remote under name to URL.
    fn add_remote(&mut self, name: &str, url: &str) -> Result<()>;

    /// URL of named remote, if it exists.
    fn remote_url(&self, name: &str) -> Result<Option<String>>;

    /// Fetch from origin, and fast-forward current branch.
    fn pull(&mut self, credentials: &Credentials) -> Result<PullOutcome>;

    /// Uncommitted changes of the working tree.
    fn status(&self) -> Result<LocalChangeSet>;

    /// Stage a single path relative to the working tree.
    fn stage(&mut self, path: &Path) -> Result<()>;

    /// Commit staged changes onto the current branch.
    fn commit(&mut self, message: &str) -> Result<()>;

    /// Push current branch to origin.
    fn push(&mut self, credentials: &Credentials) -> Result<()>;
}

/// Non-fatal result of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Nothing new on the remote.
    UpToDate,

    /// Remote has no branches yet.
    EmptyRemote,

    /// Current branch moved forward to match the remote.
    FastForward,
}

impl Display for PullOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::UpToDate => fmt.write_str("already up to date"),
            Self::EmptyRemote => fmt.write_str("remote repository is empty"),
            Self::FastForward => fmt.write_str("fast-forwarded to remote"),
        }
    }
}

/// Kind of change made to a path in the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    TypeChange,
    Conflicted,
}

impl From<Status> for ChangeKind {
    fn from(status: Status) -> Self {
        if status.is_conflicted() {
            Self::Conflicted
        } else if status.intersects(Status::WT_NEW | Status::INDEX_NEW) {
            Self::Added
        } else if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
            Self::Deleted
        } else if status.intersects(Status::WT_RENAMED | Status::INDEX_RENAMED) {
            Self::Renamed
        } else if status.intersects(Status::WT_TYPECHANGE | Status::INDEX_TYPECHANGE) {
            Self::TypeChange
        } else {
            Self::Modified
        }
    }
}

impl Display for ChangeKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::TypeChange => "typechange",
            Self::Conflicted => "conflicted",
        };
        fmt.write_str(label)
    }
}

/// Changed path in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangedPath {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Set of uncommitted changes, i.e., drift.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocalChangeSet {
    changes: Vec<ChangedPath>,
}

impl LocalChangeSet {
    pub fn new(changes: Vec<ChangedPath>) -> Self {
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangedPath> {
        self.changes.iter()
    }
}

impl FromIterator<ChangedPath> for LocalChangeSet {
    fn from_iter<I: IntoIterator<Item = ChangedPath>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Display for LocalChangeSet {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for change in &self.changes {
            writeln!(fmt, "{:>12}: {}", change.kind, change.path.display())?;
        }

        Ok(())
    }
}

/// Repository access through libgit2.
#[derive(Debug, Clone)]
pub struct Git2Access {
    bar: ProgressBar,
}

impl Git2Access {
    /// Construct new libgit2 access reporting transfers on progress bar.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Default for Git2Access {
    fn default() -> Self {
        Self::new(ProgressBar::hidden())
    }
}

impl RepositoryAccess for Git2Access {
    type Handle = Git2Repository;

    fn is_repository(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    #[instrument(skip(self, path), level = "debug")]
    fn init(&self, path: &Path) -> Result<Git2Repository> {
        info!("initialize new repository: {:?}", path.display());
        let repository = Repository::init(path).map_err(|err| VcsError::Init {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(Git2Repository::new(repository, self.bar.clone()))
    }

    #[instrument(skip(self, path), level = "debug")]
    fn open(&self, path: &Path) -> Result<Git2Repository> {
        debug!("open repository: {:?}", path.display());
        let repository = Repository::open(path).map_err(|err| VcsError::Open {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(Git2Repository::new(repository, self.bar.clone()))
    }

    /// Clone remote repository into target path.
    ///
    /// Progress of the clone is displayed through the progress bar. Any
    /// credential prompt blocks the progress bar.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Clone`] if libgit2 fails to clone.
    /// - Return [`VcsError::ProgressTemplate`] if progress bar cannot be
    ///   styled.
    #[instrument(skip(self, url, path, credentials), level = "debug")]
    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        credentials: &Credentials,
    ) -> Result<Git2Repository> {
        let clone_failed = |source| VcsError::Clone {
            source,
            url: url.to_owned(),
        };

        info!("clone {url:?} into {:?}", path.display());
        start_progress(&self.bar, format!("clone {url}"))?;
        let authenticator = credentials.git_authenticator();
        let config = git2::Config::open_default().map_err(clone_failed)?;

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(&authenticator, &config, &self.bar));
        let repository = RepoBuilder::new()
            .fetch_options(fo)
            .clone(url, path)
            .map_err(clone_failed)?;
        self.bar.finish_and_clear();

        Ok(Git2Repository::new(repository, self.bar.clone()))
    }
}

/// Repository operated on through libgit2.
pub struct Git2Repository {
    repository: Repository,
    bar: ProgressBar,
}

impl Git2Repository {
    /// Wrap opened libgit2 repository.
    pub fn new(repository: Repository, bar: ProgressBar) -> Self {
        Self { repository, bar }
    }

    /// Path to working tree.
    pub fn workdir(&self) -> Option<&Path> {
        self.repository.workdir()
    }

    fn head_branch(&self) -> std::result::Result<(String, Option<Oid>), git2::Error> {
        let head = self.repository.find_reference("HEAD")?;
        let target = head
            .symbolic_target()
            .ok_or_else(|| git2::Error::from_str("HEAD is detached"))?
            .to_owned();
        let oid = self.repository.refname_to_id(&target).ok();
        let name = target
            .strip_prefix("refs/heads/")
            .unwrap_or(&target)
            .to_owned();

        Ok((name, oid))
    }

    fn remote_branches(&self) -> std::result::Result<Vec<String>, git2::Error> {
        let mut names = Vec::new();
        for reference in self.repository.references_glob("refs/remotes/origin/*")? {
            let reference = reference?;
            let name = reference
                .name()
                .and_then(|name| name.strip_prefix("refs/remotes/origin/"));
            match name {
                Some("HEAD") | None => continue,
                Some(name) => names.push(name.to_owned()),
            }
        }
        names.sort();

        Ok(names)
    }

    fn safe_checkout(&self, oid: Oid) -> std::result::Result<(), git2::Error> {
        let commit = self.repository.find_commit(oid)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repository
            .checkout_tree(commit.as_object(), Some(&mut checkout))
    }

    // INVARIANT: Files already present locally are never overwritten. They
    // stay behind as modifications on top of the adopted commit.
    fn adopt(&self, local_ref: &str, oid: Oid) -> std::result::Result<(), git2::Error> {
        let commit = self.repository.find_commit(oid)?;
        self.repository.reference(local_ref, oid, false, "envkeep: adopt remote branch")?;
        self.repository.set_head(local_ref)?;
        self.repository.reset(commit.as_object(), ResetType::Mixed, None)?;

        let mut checkout = CheckoutBuilder::new();
        checkout.safe().recreate_missing(true);
        self.repository.checkout_head(Some(&mut checkout))
    }

    fn fast_forward(&self) -> std::result::Result<PullOutcome, VcsError> {
        let remote_branches = self.remote_branches().map_err(pull_failed)?;
        if remote_branches.is_empty() {
            return Ok(PullOutcome::EmptyRemote);
        }

        let (branch, local_oid) = self.head_branch().map_err(pull_failed)?;
        let Some(local_oid) = local_oid else {
            // INVARIANT: Unborn branch adopts a remote branch wholesale.
            let target = adopt_branch(&branch, &remote_branches).unwrap_or(&branch);
            let remote_oid = self
                .repository
                .refname_to_id(&format!("refs/remotes/{ORIGIN}/{target}"))
                .map_err(pull_failed)?;
            let local_ref = format!("refs/heads/{target}");

            info!("adopting remote branch {target:?}");
            self.adopt(&local_ref, remote_oid).map_err(pull_failed)?;

            return Ok(PullOutcome::FastForward);
        };

        if !remote_branches.contains(&branch) {
            debug!("remote has no branch {branch:?} yet");
            return Ok(PullOutcome::UpToDate);
        }

        let remote_oid = self
            .repository
            .refname_to_id(&format!("refs/remotes/{ORIGIN}/{branch}"))
            .map_err(pull_failed)?;
        if remote_oid == local_oid {
            return Ok(PullOutcome::UpToDate);
        }

        let graph = |descendant, ancestor| {
            self.repository
                .graph_descendant_of(descendant, ancestor)
                .map_err(pull_failed)
        };
        if graph(local_oid, remote_oid)? {
            debug!("local branch {branch:?} is ahead of remote");
            return Ok(PullOutcome::UpToDate);
        }

        if !graph(remote_oid, local_oid)? {
            return Err(VcsError::Diverged { branch });
        }

        self.safe_checkout(remote_oid).map_err(pull_failed)?;
        self.repository
            .find_reference(&format!("refs/heads/{branch}"))
            .and_then(|mut reference| reference.set_target(remote_oid, "envkeep: fast-forward"))
            .map_err(pull_failed)?;

        Ok(PullOutcome::FastForward)
    }

    fn signature(&self) -> std::result::Result<Signature<'static>, git2::Error> {
        match self.repository.signature() {
            Ok(signature) => Ok(signature),
            Err(err) => {
                warn!("no git identity configured ({err}), committing as {FALLBACK_NAME} <{FALLBACK_EMAIL}>");
                Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)
            }
        }
    }
}

impl RepositoryHandle for Git2Repository {
    fn add_remote(&mut self, name: &str, url: &str) -> Result<()> {
        info!("bind remote {name:?} to {url:?}");
        self.repository
            .remote(name, url)
            .map_err(|err| VcsError::Remote {
                source: err,
                name: name.to_owned(),
            })?;

        Ok(())
    }

    fn remote_url(&self, name: &str) -> Result<Option<String>> {
        match self.repository.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(str::to_owned)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(VcsError::Remote {
                source: err,
                name: name.to_owned(),
            }),
        }
    }

    #[instrument(skip(self, credentials), level = "debug")]
    fn pull(&mut self, credentials: &Credentials) -> Result<PullOutcome> {
        let authenticator = credentials.git_authenticator();
        let config = self.repository.config().map_err(pull_failed)?;
        let mut remote = self.repository.find_remote(ORIGIN).map_err(pull_failed)?;

        start_progress(&self.bar, format!("pull {}", remote.url().unwrap_or(ORIGIN)))?;
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(&authenticator, &config, &self.bar));
        remote
            .fetch(&[FETCH_REFSPEC], Some(&mut fo), None)
            .map_err(pull_failed)?;
        self.bar.finish_and_clear();

        let outcome = self.fast_forward()?;
        info!("pull: {outcome}");

        Ok(outcome)
    }

    fn status(&self) -> Result<LocalChangeSet> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self
            .repository
            .statuses(Some(&mut opts))
            .map_err(|err| VcsError::Status { source: err })?;

        let changes = statuses
            .iter()
            .filter_map(|entry| {
                let path = entry.path()?;
                // INVARIANT: Nested repositories show up as directories, skip them.
                if path.ends_with('/') {
                    debug!("skipping nested repository {path:?}");
                    return None;
                }
                Some(ChangedPath::new(path, ChangeKind::from(entry.status())))
            })
            .collect();

        Ok(changes)
    }

    fn stage(&mut self, path: &Path) -> Result<()> {
        let stage_failed = |source: git2::Error| VcsError::Stage {
            source,
            path: path.to_path_buf(),
        };

        let workdir = self
            .repository
            .workdir()
            .ok_or_else(|| stage_failed(git2::Error::from_str("repository has no working tree")))?;
        let mut index = self.repository.index().map_err(stage_failed)?;
        if workdir.join(path).exists() {
            index.add_path(path).map_err(stage_failed)?;
        } else {
            index.remove_path(path).map_err(stage_failed)?;
        }
        index.write().map_err(stage_failed)?;
        debug!("staged {:?}", path.display());

        Ok(())
    }

    #[instrument(skip(self, message), level = "debug")]
    fn commit(&mut self, message: &str) -> Result<()> {
        let commit_failed = |source| VcsError::Commit { source };
        let signature = self.signature().map_err(commit_failed)?;

        // INVARIANT: Always use new tree produced by index after staging.
        let mut index = self.repository.index().map_err(commit_failed)?;
        let tree_oid = index.write_tree().map_err(commit_failed)?;
        let tree = self.repository.find_tree(tree_oid).map_err(commit_failed)?;

        // INVARIANT: Unborn branch gets a root commit.
        let parent = match self.repository.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(commit_failed)?),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(err) => return Err(commit_failed(err)),
        };
        let parents = parent.iter().collect::<Vec<_>>();

        let oid = self
            .repository
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(commit_failed)?;
        info!("committed {oid}: {message}");

        Ok(())
    }

    #[instrument(skip(self, credentials), level = "debug")]
    fn push(&mut self, credentials: &Credentials) -> Result<()> {
        let (branch, oid) = self.head_branch().map_err(push_failed)?;
        if oid.is_none() {
            return Err(push_failed(git2::Error::from_str(
                "current branch has no commits to push",
            )));
        }

        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let authenticator = credentials.git_authenticator();
        let config = self.repository.config().map_err(push_failed)?;
        let mut remote = self.repository.find_remote(ORIGIN).map_err(push_failed)?;
        start_progress(&self.bar, format!("push {}", remote.url().unwrap_or(ORIGIN)))?;

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut rc = remote_callbacks(&authenticator, &config, &self.bar);
            rc.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });

            let mut po = PushOptions::new();
            po.remote_callbacks(rc);
            remote
                .push(&[refspec.as_str()], Some(&mut po))
                .map_err(push_failed)?;
        }
        self.bar.finish_and_clear();

        if let Some(reason) = rejection.into_inner() {
            return Err(VcsError::Rejected { reason });
        }
        info!("pushed {branch:?} to {ORIGIN}");

        Ok(())
    }
}

/// Pick the remote branch an unborn local branch should adopt.
///
/// Prefers the local branch name, then "main", then "master", then whatever
/// sorts first.
pub fn adopt_branch<'a>(local: &'a str, remote: &'a [String]) -> Option<&'a str> {
    [local, "main", "master"]
        .into_iter()
        .find(|candidate| remote.iter().any(|name| name == candidate))
        .or_else(|| remote.first().map(String::as_str))
}

fn start_progress(bar: &ProgressBar, message: String) -> Result<()> {
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.reset();
    bar.set_style(style);
    bar.set_message(message);
    bar.enable_steady_tick(time::Duration::from_millis(100));

    Ok(())
}

fn remote_callbacks<'a>(
    authenticator: &'a GitAuthenticator,
    config: &'a git2::Config,
    bar: &ProgressBar,
) -> RemoteCallbacks<'a> {
    let bar = bar.clone();
    let mut throttle = time::Instant::now();
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(config));
    rc.transfer_progress(move |progress| {
        if throttle.elapsed() > time::Duration::from_millis(10) {
            throttle = time::Instant::now();
            bar.set_length(progress.total_objects() as u64);
            bar.set_position(progress.received_objects() as u64);
        }
        true
    });

    rc
}

fn pull_failed(source: git2::Error) -> VcsError {
    VcsError::Pull { source }
}

fn push_failed(source: git2::Error) -> VcsError {
    VcsError::Push { source }
}

/// Repository error types, tagged by step.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Repository cannot be initialized.
    #[error("failed to initialize repository at {:?}", path.display())]
    Init {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Remote cannot be bound or looked up.
    #[error("failed to access remote {name:?}")]
    Remote {
        #[source]
        source: git2::Error,
        name: String,
    },

    /// Repository cannot be opened.
    #[error("failed to open repository at {:?}", path.display())]
    Open {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Working tree status cannot be computed.
    #[error("failed to compute working tree status")]
    Status {
        #[source]
        source: git2::Error,
    },

    /// Fetch or fast-forward fails.
    #[error("pull failed")]
    Pull {
        #[source]
        source: git2::Error,
    },

    /// Local and remote history cannot be fast-forwarded.
    #[error("pull failed: branch {branch:?} diverged from remote, resolve manually")]
    Diverged { branch: String },

    /// Path cannot be staged.
    #[error("failed to stage {:?}", path.display())]
    Stage {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Commit cannot be created.
    #[error("commit failed")]
    Commit {
        #[source]
        source: git2::Error,
    },

    /// Push fails to go through.
    #[error("push failed")]
    Push {
        #[source]
        source: git2::Error,
    },

    /// Remote refuses pushed reference.
    #[error("push failed: remote rejected {reason}")]
    Rejected { reason: String },

    /// Remote repository cannot be cloned.
    #[error("failed to clone {url:?}")]
    Clone {
        #[source]
        source: git2::Error,
        url: String,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
