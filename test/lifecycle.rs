// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use envkeep::{
    config::{ENVIRONMENT_VERSION, PRIMARY_VERSION},
    ConfigLifecycle, Flavor, KeyValueStore, PathConfig, RetentionSweeper,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{metadata, read_dir, write},
    path::{Path, PathBuf},
};

fn lifecycle() -> Result<ConfigLifecycle> {
    Ok(ConfigLifecycle::new(PathConfig::new(
        std::env::current_dir()?.join("home").join(".envkeep"),
    )))
}

fn snapshots(dir: &Path) -> Vec<PathBuf> {
    let mut entries = read_dir(dir)
        .map(|entries| entries.flatten().map(|entry| entry.path()).collect::<Vec<_>>())
        .unwrap_or_default();
    entries.sort();
    entries
}

#[sealed_test]
fn replace_then_merge_into_running_configuration() -> Result<()> {
    let lifecycle = lifecycle()?;
    let primary = lifecycle.paths().primary_file().to_path_buf();
    std::fs::create_dir_all(lifecycle.paths().root())?;

    write("config.env", "testkey1=testval1")?;
    lifecycle.replace("config.env", Flavor::Primary)?;
    assert_eq!(
        KeyValueStore::read(&primary)?,
        KeyValueStore::from_iter([("TESTKEY1", "testval1"), (PRIMARY_VERSION, "1")])
    );
    assert_eq!(snapshots(lifecycle.paths().snapshots_dir()), Vec::<PathBuf>::new());

    write("config2.env", "testkey2=testval2")?;
    lifecycle.merge("config2.env", None, Flavor::Primary)?;
    let merged = KeyValueStore::read(&primary)?;
    assert_eq!(merged.get("TESTKEY1"), Some("testval1"));
    assert_eq!(merged.get("TESTKEY2"), Some("testval2"));

    let taken = snapshots(lifecycle.paths().snapshots_dir());
    assert_eq!(taken.len(), 1);
    assert_eq!(
        KeyValueStore::read(&taken[0])?,
        KeyValueStore::from_iter([("TESTKEY1", "testval1"), (PRIMARY_VERSION, "1")])
    );

    Ok(())
}

#[sealed_test]
fn snapshot_is_taken_before_every_overwrite() -> Result<()> {
    let lifecycle = lifecycle()?;
    write(
        "dev.env",
        indoc! {"
            ENVIRONMENT_VERSION=1
            DB_HOST=localhost
        "},
    )?;
    let destination = lifecycle.replace("dev.env", Flavor::Environment)?;
    let before = metadata(&destination)?.modified()?;

    write(
        "dev.env",
        indoc! {"
            ENVIRONMENT_VERSION=2
            DB_HOST=db.internal
        "},
    )?;
    lifecycle.replace("dev.env", Flavor::Environment)?;

    let taken = snapshots(lifecycle.paths().snapshots_dir());
    assert_eq!(taken.len(), 1);
    let name = taken[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("dev-") && name.ends_with(".env"), "{name}");
    assert!(metadata(&taken[0])?.modified()? >= before);
    assert_eq!(KeyValueStore::read(&taken[0])?.get("db_host"), Some("localhost"));
    assert_eq!(
        KeyValueStore::read(&destination)?,
        KeyValueStore::from_iter([(ENVIRONMENT_VERSION, "2"), ("DB_HOST", "db.internal")])
    );

    Ok(())
}

#[sealed_test]
fn rapid_replaces_archive_every_superseded_version() -> Result<()> {
    let lifecycle = lifecycle()?;
    for version in ["original", "second", "third"] {
        write("dev.env", format!("ENVIRONMENT_VERSION=1\nV={version}\n"))?;
        lifecycle.replace("dev.env", Flavor::Environment)?;
    }

    let mut archived = snapshots(lifecycle.paths().snapshots_dir())
        .iter()
        .map(|path| -> Result<String> {
            Ok(KeyValueStore::read(path)?.get_or_empty("V").to_owned())
        })
        .collect::<Result<Vec<_>>>()?;
    archived.sort();
    assert_eq!(archived, vec!["original", "second"]);

    Ok(())
}

#[sealed_test]
fn sweep_after_config_commands_keeps_fresh_snapshots() -> Result<()> {
    let lifecycle = lifecycle()?;
    lifecycle.set([("GC_AUTO", "yes"), ("GC_PERIOD", "30")])?;
    lifecycle.set([("REMOTE_STORAGE", "/srv/git/config.git")])?;
    let taken = snapshots(lifecycle.paths().snapshots_dir());
    assert_eq!(taken.len(), 2);

    let report = RetentionSweeper::new(lifecycle.paths()).sweep();
    assert!(report.removed.is_empty());
    assert_eq!(snapshots(lifecycle.paths().snapshots_dir()), taken);

    Ok(())
}
