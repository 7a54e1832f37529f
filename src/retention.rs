// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snapshot retention.
//!
//! Snapshots pile up every time a configuration file is overwritten. The
//! retention sweep deletes snapshots older than a configured amount of days.
//! It is controlled by two keys in the primary configuration:
//!
//! - `GC_AUTO` enables the sweep. Accepts "yes"/"no" in any case, along with
//!   the usual boolean literals "1", "t", "true", "0", "f", "false". Anything
//!   else counts as disabled.
//! - `GC_PERIOD` is the age threshold in days, 30 when unset.
//!
//! Both keys are read fresh from the primary configuration on every sweep.
//! Sweeping is best-effort: a snapshot that cannot be removed is logged and
//! skipped.

use crate::{
    config::{GC_AUTO, GC_PERIOD},
    path::PathConfig,
    store::KeyValueStore,
};

use std::{
    fs::{read_dir, remove_file, Metadata},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{debug, info, instrument, warn};

/// Retention period used when `GC_PERIOD` is not set.
pub const DEFAULT_GC_PERIOD_DAYS: u64 = 30;

const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

/// Parse `GC_AUTO` value leniently.
///
/// Accepts "yes" and "no" in any case, plus the usual boolean literals in
/// lower, upper, or title case. Unrecognized values are treated as `false`,
/// exactly like an explicit "no".
pub fn parse_gc_auto(value: impl AsRef<str>) -> bool {
    let value = value.as_ref().trim();
    if value.eq_ignore_ascii_case("yes") {
        return true;
    }

    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => true,
        "0" | "f" | "F" | "false" | "FALSE" | "False" => false,
        _ => false,
    }
}

/// Snapshot retention settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Whether sweeping is enabled at all.
    pub enabled: bool,

    /// Snapshots at least this many days old are deleted.
    pub period_days: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            period_days: DEFAULT_GC_PERIOD_DAYS,
        }
    }
}

impl RetentionPolicy {
    /// Extract retention settings from a primary configuration.
    pub fn from_store(store: &KeyValueStore) -> Self {
        let enabled = parse_gc_auto(store.get_or_empty(GC_AUTO));
        let period_days = match store.get(GC_PERIOD).map(str::trim) {
            None | Some("") => DEFAULT_GC_PERIOD_DAYS,
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!("cannot parse {GC_PERIOD}={value:?}, using {DEFAULT_GC_PERIOD_DAYS} days");
                DEFAULT_GC_PERIOD_DAYS
            }),
        };

        Self {
            enabled,
            period_days,
        }
    }
}

/// Outcome of a retention sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Snapshots that were deleted.
    pub removed: Vec<PathBuf>,

    /// Snapshots that were due for deletion but could not be removed.
    pub failed: Vec<PathBuf>,
}

/// Delete snapshots older than the configured retention period.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    primary_file: PathBuf,
    snapshots_dir: PathBuf,
}

impl RetentionSweeper {
    /// Construct new sweeper for target path layout.
    pub fn new(paths: &PathConfig) -> Self {
        Self {
            primary_file: paths.primary_file().to_path_buf(),
            snapshots_dir: paths.snapshots_dir().to_path_buf(),
        }
    }

    /// Read current retention policy from the primary configuration.
    ///
    /// A primary configuration that cannot be read yields the default
    /// (disabled) policy.
    pub fn policy(&self) -> RetentionPolicy {
        match KeyValueStore::read(&self.primary_file) {
            Ok(store) => RetentionPolicy::from_store(&store),
            Err(err) if err.is_not_found() => RetentionPolicy::default(),
            Err(err) => {
                warn!("cannot read retention settings: {err}");
                RetentionPolicy::default()
            }
        }
    }

    /// Sweep snapshot directory using the current time.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now())
    }

    /// Sweep snapshot directory as if the current time was `now`.
    #[instrument(skip(self, now), level = "debug")]
    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        let policy = self.policy();
        if !policy.enabled {
            debug!("snapshot garbage collection disabled");
            return report;
        }

        let entries = match read_dir(&self.snapshots_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("cannot read snapshots at {:?}: {err}", self.snapshots_dir.display());
                return report;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                warn!("cannot stat snapshot {:?}", path.display());
                continue;
            };

            if !metadata.is_file() {
                continue;
            }

            let Some(taken) = snapshot_time(&metadata) else {
                warn!("cannot determine age of snapshot {:?}", path.display());
                continue;
            };

            if age_in_days(taken, now) < policy.period_days {
                continue;
            }

            match remove_file(&path) {
                Ok(()) => {
                    info!("removed expired snapshot {:?}", path.display());
                    report.removed.push(path);
                }
                Err(err) => {
                    warn!("failed to remove snapshot {:?}: {err}", path.display());
                    report.failed.push(path);
                }
            }
        }

        report
    }

    /// Directory being swept.
    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }
}

/// Time a snapshot was taken.
///
/// Prefers the creation time where the file system records it, otherwise
/// falls back to the modification time.
pub fn snapshot_time(metadata: &Metadata) -> Option<SystemTime> {
    metadata.created().or_else(|_| metadata.modified()).ok()
}

/// Whole days elapsed between two points in time, rounded down.
///
/// A time in the future counts as zero days old.
pub fn age_in_days(then: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(then)
        .map(|elapsed| elapsed.as_secs() / SECONDS_PER_DAY)
        .unwrap_or(0)
}

/// Duration of a whole amount of days.
pub fn days(amount: u64) -> Duration {
    Duration::from_secs(amount * SECONDS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, metadata, write};

    #[test_case("yes", true; "yes lower")]
    #[test_case("YES", true; "yes upper")]
    #[test_case("true", true; "true lower")]
    #[test_case("True", true; "true title")]
    #[test_case("TRUE", true; "true upper")]
    #[test_case("1", true; "one")]
    #[test_case("t", true; "t")]
    #[test_case("no", false; "no lower")]
    #[test_case("NO", false; "no upper")]
    #[test_case("false", false; "false lower")]
    #[test_case("False", false; "false title")]
    #[test_case("0", false; "zero")]
    #[test_case("f", false; "f")]
    #[test_case("yEs", true; "yes mixed")]
    #[test_case("T", true; "t upper")]
    #[test_case("tRuE", false; "true mixed")]
    #[test_case("fAlSe", false; "false mixed")]
    #[test_case("maybe", false; "unparseable")]
    #[test_case("", false; "empty")]
    #[test]
    fn gc_auto_parsing(input: &str, expect: bool) {
        assert_eq!(parse_gc_auto(input), expect);
    }

    #[test]
    fn policy_defaults() {
        let policy = RetentionPolicy::from_store(&KeyValueStore::from_iter([(GC_AUTO, "yes")]));
        assert_eq!(
            policy,
            RetentionPolicy {
                enabled: true,
                period_days: 30
            }
        );

        let policy = RetentionPolicy::from_store(&KeyValueStore::from_iter([
            (GC_AUTO, "yes"),
            (GC_PERIOD, "soon"),
        ]));
        assert_eq!(policy.period_days, DEFAULT_GC_PERIOD_DAYS);

        let policy = RetentionPolicy::from_store(&KeyValueStore::new());
        assert_eq!(policy, RetentionPolicy::default());
    }

    #[test]
    fn age_rounds_down_and_ignores_future() {
        let then = SystemTime::UNIX_EPOCH;
        assert_eq!(age_in_days(then, then + days(3) + Duration::from_secs(60)), 3);
        assert_eq!(age_in_days(then, then + days(3) - Duration::from_secs(1)), 2);
        assert_eq!(age_in_days(then + days(1), then), 0);
    }

    fn setup(settings: &str) -> anyhow::Result<(RetentionSweeper, PathBuf, SystemTime)> {
        let paths = PathConfig::new(std::env::current_dir()?.join(".envkeep"));
        create_dir_all(paths.snapshots_dir())?;
        write(paths.primary_file(), settings)?;

        let snapshot = paths.snapshots_dir().join("envkeep-01012024_120000.env");
        write(&snapshot, "PRIMARY_VERSION=1\n")?;
        let taken = snapshot_time(&metadata(&snapshot)?).expect("snapshot time");

        Ok((RetentionSweeper::new(&paths), snapshot, taken))
    }

    #[sealed_test]
    fn snapshot_aged_exactly_period_is_removed() -> anyhow::Result<()> {
        let (sweeper, snapshot, taken) = setup("GC_AUTO=yes\nGC_PERIOD=30\n")?;

        let report = sweeper.sweep_at(taken + days(30));
        assert_eq!(report.removed, vec![snapshot.clone()]);
        assert!(!snapshot.exists());

        Ok(())
    }

    #[sealed_test]
    fn snapshot_younger_than_period_survives() -> anyhow::Result<()> {
        let (sweeper, snapshot, taken) = setup("GC_AUTO=yes\nGC_PERIOD=30\n")?;

        let report = sweeper.sweep_at(taken + days(29) + Duration::from_secs(3600));
        assert_eq!(report, SweepReport::default());
        assert!(snapshot.exists());

        Ok(())
    }

    #[sealed_test]
    fn disabled_sweep_keeps_everything() -> anyhow::Result<()> {
        let (sweeper, snapshot, taken) = setup("GC_AUTO=No\nGC_PERIOD=0\n")?;

        let report = sweeper.sweep_at(taken + days(365));
        assert_eq!(report, SweepReport::default());
        assert!(snapshot.exists());

        Ok(())
    }

    #[sealed_test]
    fn sweeping_twice_matches_sweeping_once() -> anyhow::Result<()> {
        let (sweeper, snapshot, taken) = setup("GC_AUTO=Yes\nGC_PERIOD=0\n")?;
        let now = taken + Duration::from_secs(5);

        let first = sweeper.sweep_at(now);
        assert_eq!(first.removed, vec![snapshot]);

        let second = sweeper.sweep_at(now);
        assert_eq!(second, SweepReport::default());
        assert_eq!(read_dir(sweeper.snapshots_dir())?.count(), 0);

        Ok(())
    }

    #[sealed_test]
    fn missing_primary_disables_sweep() -> anyhow::Result<()> {
        let paths = PathConfig::new(std::env::current_dir()?.join(".envkeep"));
        let sweeper = RetentionSweeper::new(&paths);
        assert_eq!(sweeper.policy(), RetentionPolicy::default());
        assert_eq!(sweeper.sweep(), SweepReport::default());

        Ok(())
    }
}
