// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration lifecycle and sync engine.
//!
//! Envkeep manages a small set of flat `KEY=VALUE` configuration files: one
//! __primary__ (running) configuration, and any number of named
//! __environment__ configurations. Every overwrite is preceded by a
//! timestamped snapshot of the old content, and snapshots are swept once they
//! age past a configurable retention period. The whole configuration tree can
//! be synchronized with a git remote.
//!
//! # Layout
//!
//! - [`store`]: flat key/value file format.
//! - [`config`]: configuration flavors, version markers, and validation.
//! - [`snapshot`]: pre-overwrite snapshots.
//! - [`retention`]: snapshot garbage collection.
//! - [`lifecycle`]: replace, merge, and set operations on configuration files.
//! - [`sync`]: git synchronization of the configuration tree.
//! - [`path`]: where everything lives on disk.

pub mod config;
pub mod lifecycle;
pub mod path;
pub mod retention;
pub mod snapshot;
pub mod store;
pub mod sync;

pub use config::Flavor;
pub use lifecycle::{ConfigLifecycle, LifecycleError};
pub use path::PathConfig;
pub use retention::{RetentionSweeper, SweepReport};
pub use snapshot::SnapshotManager;
pub use store::KeyValueStore;
pub use sync::{Disposition, SyncCoordinator, SyncError, SyncOutcome};
