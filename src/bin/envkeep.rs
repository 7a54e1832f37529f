// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use envkeep::{
    config::{Flavor, REMOTE_STORAGE, SSH_KEY_PATH},
    lifecycle::EnvironmentKind,
    path::default_ssh_key,
    store::check_key,
    sync::{
        auth::{InquirePrompter, PromptAuthenticator},
        repo::{Git2Access, LocalChangeSet},
    },
    ConfigLifecycle, Disposition, KeyValueStore, PathConfig, RetentionSweeper, SyncCoordinator,
    SyncOutcome,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use inquire::Confirm;
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "envkeep [options] <envkeep-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let paths = PathConfig::try_default()?;
        match self.command {
            Command::Config(command) => run_config(&paths, command),
            Command::Sync(opts) => run_sync(&paths, opts),
            Command::Env(command) => run_env(&paths, command),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Manage the running configuration and environment configurations.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Synchronize configuration with its remote repository.
    #[command(override_usage = "envkeep sync [options] [<environment>]")]
    Sync(SyncOptions),

    /// Inspect and fetch environments.
    #[command(subcommand)]
    Env(EnvCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Show running configuration.
    Show,

    /// Replace a configuration with the contents of a file.
    #[command(override_usage = "envkeep config add [options] <file>")]
    Add(AddOptions),

    /// Merge a file into an existing configuration.
    #[command(override_usage = "envkeep config merge [options] --src <file>")]
    Merge(MergeOptions),

    /// Set keys of the running configuration.
    #[command(override_usage = "envkeep config set <KEY=VALUE>...")]
    Set(SetOptions),

    /// Delete snapshots older than the retention period.
    Gc,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Configuration file to add.
    #[arg(value_name = "file")]
    pub file: String,

    /// Treat file as an environment configuration.
    #[arg(short, long)]
    pub env: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MergeOptions {
    /// Configuration file to merge from.
    #[arg(short, long, value_name = "file")]
    pub src: String,

    /// Environment configuration to merge into.
    #[arg(short, long, value_name = "file")]
    pub dst: Option<String>,

    /// Treat files as environment configurations.
    #[arg(short, long)]
    pub env: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetOptions {
    /// Assignments to apply.
    #[arg(required = true, value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub assignments: Vec<(String, String)>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Environment repository to synchronize instead of the running configuration.
    #[arg(value_name = "environment")]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
enum EnvCommand {
    /// List known environments.
    List,

    /// Show collected configuration of an environment.
    #[command(override_usage = "envkeep env inspect <name>")]
    Inspect {
        #[arg(value_name = "name")]
        name: String,
    },

    /// Clone environment repository from remote.
    #[command(override_usage = "envkeep env clone <url>")]
    Clone {
        #[arg(value_name = "url")]
        url: String,
    },
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_config(paths: &PathConfig, command: ConfigCommand) -> Result<()> {
    let lifecycle = ConfigLifecycle::new(paths.clone());
    match command {
        ConfigCommand::Show => print!("{}", lifecycle.read_primary()?),
        ConfigCommand::Add(opts) => {
            lifecycle.replace(expand_path(&opts.file)?, Flavor::from_secondary(opts.env))?;
        }
        ConfigCommand::Merge(opts) => {
            let dst = opts.dst.as_deref().map(expand_path).transpose()?;
            lifecycle.merge(
                expand_path(&opts.src)?,
                dst.as_deref(),
                Flavor::from_secondary(opts.env),
            )?;
        }
        ConfigCommand::Set(opts) => {
            lifecycle.set(opts.assignments)?;
        }
        ConfigCommand::Gc => {}
    }

    // INVARIANT: Every config command ends with a retention sweep.
    let report = RetentionSweeper::new(paths).sweep();
    if !report.removed.is_empty() {
        info!("removed {} expired snapshot(s)", report.removed.len());
    }

    Ok(())
}

fn run_sync(paths: &PathConfig, opts: SyncOptions) -> Result<()> {
    let lifecycle = ConfigLifecycle::new(paths.clone());
    let primary = lifecycle.read_primary()?;
    let bar = ProgressBar::new(0);
    let mut coordinator = coordinator(paths, &primary, bar.clone())?;

    let outcome = match opts.environment {
        Some(name) => coordinator.sync_environment(&name, confirm_drift),
        None => coordinator.sync(primary.get_or_empty(REMOTE_STORAGE), confirm_drift),
    };
    bar.finish_and_clear();

    match outcome? {
        SyncOutcome::Synchronized { pull, pushed } => {
            info!("pull: {pull}");
            if pushed {
                info!("local changes committed and pushed");
            }
        }
        SyncOutcome::ManualResolutionRequired { changes } => {
            info!(
                "{} local change(s) left for manual resolution, nothing was synchronized",
                changes.len()
            );
        }
    }

    Ok(())
}

fn run_env(paths: &PathConfig, command: EnvCommand) -> Result<()> {
    let lifecycle = ConfigLifecycle::new(paths.clone());
    match command {
        EnvCommand::List => {
            for environment in lifecycle.list_environments()? {
                let kind = match environment.kind {
                    EnvironmentKind::File => "file",
                    EnvironmentKind::Repository => "repository",
                };
                println!("{:<24} {kind}", environment.name);
            }
        }
        EnvCommand::Inspect { name } => print!("{}", lifecycle.inspect_environment(name)?),
        EnvCommand::Clone { url } => {
            let primary = lifecycle.read_primary()?;
            let bar = ProgressBar::new(0);
            let mut coordinator = coordinator(paths, &primary, bar.clone())?;
            let path = coordinator.clone_environment(&url);
            bar.finish_and_clear();
            info!("environment ready at {:?}", path?.display());
        }
    }

    Ok(())
}

fn coordinator(
    paths: &PathConfig,
    primary: &KeyValueStore,
    bar: ProgressBar,
) -> Result<SyncCoordinator<Git2Access, PromptAuthenticator>> {
    let ssh_key = match primary.get(SSH_KEY_PATH).filter(|path| !path.is_empty()) {
        Some(path) => expand_path(path)?,
        None => default_ssh_key()?,
    };
    let authenticator = PromptAuthenticator::new(InquirePrompter::new(bar.clone()), ssh_key);

    Ok(SyncCoordinator::new(
        paths.clone(),
        Git2Access::new(bar),
        authenticator,
    ))
}

fn confirm_drift(changes: &LocalChangeSet) -> Disposition {
    println!("local changes detected:\n{changes}");
    let answer = Confirm::new("commit and push these changes?")
        .with_default(false)
        .prompt();

    match answer {
        Ok(true) => Disposition::AutoCommit,
        Ok(false) | Err(_) => Disposition::Manual,
    }
}

fn expand_path(path: &str) -> Result<PathBuf> {
    Ok(PathBuf::from(shellexpand::full(path)?.into_owned()))
}

fn parse_assignment(assignment: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {assignment:?}"))?;
    check_key(key).map_err(|err| err.to_string())?;

    Ok((key.to_owned(), value.to_owned()))
}
