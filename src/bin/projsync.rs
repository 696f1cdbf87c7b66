// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use projsync::{
    config::{Topology, UserConfig},
    link::{ChangeSet, LinkBatch, LinkState},
    path::{default_config_file, default_sync_repo_dir},
    report::TracingReport,
    store::{ProjectSummary, Store},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use inquire::Confirm;
use std::{env, ffi::OsString, fs, path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the centralized repository path.
const SYNC_REPO_ENV: &str = "PROJSYNC_REPO";

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  projsync [options] <projsync-command>\n  projsync [options] <git-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to centralized repository.
    #[arg(long, global = true, value_name = "path")]
    pub sync_repo: Option<PathBuf>,

    /// Run as if started in this directory.
    #[arg(short = 'C', long, global = true, value_name = "path")]
    pub directory: Option<PathBuf>,

    /// Emit debug level logs.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    async fn run(self, config: UserConfig) -> Result<i32> {
        let cwd = match self.directory {
            Some(path) => path,
            None => env::current_dir().context("cannot determine current directory")?,
        };
        let sync_repo = resolve_sync_repo(self.sync_repo, &config)?;

        match self.command {
            Some(Command::Init(opts)) => run_init(sync_repo, cwd, opts).await,
            Some(Command::Add(opts)) => run_add(sync_repo, cwd, opts),
            Some(Command::Remove(opts)) => run_remove(sync_repo, cwd, opts),
            Some(Command::List(opts)) => run_list(sync_repo, opts),
            Some(Command::Sync) => run_sync(sync_repo),
            Some(Command::Git(args)) => run_git(sync_repo, cwd, args),
            None => run_git(sync_repo, cwd, Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Track current project, and link its default files.
    #[command(override_usage = "projsync init [options] [<name>]")]
    Init(InitOptions),

    /// Track and link files of current project.
    #[command(override_usage = "projsync add [options] [<file>]...")]
    Add(AddOptions),

    /// Unlink and stop tracking files, or the whole current project.
    #[command(override_usage = "projsync remove [options] [<file>]...")]
    Remove(RemoveOptions),

    /// Show tracked projects.
    #[command(override_usage = "projsync list [options]")]
    List(ListOptions),

    /// Reconcile links of every tracked project.
    #[command(override_usage = "projsync sync")]
    Sync,

    /// Run Git command in centralized repository.
    #[command(external_subcommand)]
    Git(Vec<OsString>),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Project name, derived from remote or directory name if not given.
    #[arg(value_name = "name")]
    pub name: Option<String>,

    /// Link topology to use if centralized repository does not exist yet.
    #[arg(short, long, value_name = "topology")]
    pub topology: Option<Topology>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Files to track, relative to current directory.
    #[arg(group = "target", value_name = "file")]
    pub files: Vec<PathBuf>,

    /// Track every file matched by the discovery patterns.
    #[arg(short, long, group = "target")]
    pub all: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Files to stop tracking, relative to current directory.
    #[arg(group = "target", value_name = "file")]
    pub files: Vec<PathBuf>,

    /// Stop tracking current project altogether.
    #[arg(short, long, group = "target")]
    pub project: bool,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// Show link state of every tracked file.
    #[arg(short, long)]
    pub long: bool,

    /// Print listing as JSON.
    #[arg(short, long)]
    pub json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_user_config();

    let verbose = cli.verbose || config.as_ref().is_ok_and(|config| config.verbose);
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let result = match config {
        Ok(config) => cli.run(config).await,
        Err(error) => Err(error),
    };

    match result {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

/// Load user configuration, or defaults if there is none.
fn load_user_config() -> Result<UserConfig> {
    let path = default_config_file()?;
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let data =
        fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;
    data.parse::<UserConfig>()
        .with_context(|| format!("malformed user configuration {}", path.display()))
}

/// Pick centralized repository path by flag, environment, config, default.
fn resolve_sync_repo(flag: Option<PathBuf>, config: &UserConfig) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }

    if let Some(path) = env::var_os(SYNC_REPO_ENV).filter(|path| !path.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    match &config.sync_repo {
        Some(path) => Ok(path.clone()),
        None => Ok(default_sync_repo_dir()?),
    }
}

async fn run_init(sync_repo: PathBuf, cwd: PathBuf, opts: InitOptions) -> Result<i32> {
    let mut store = Store::open_or_init(sync_repo, opts.topology, TracingReport)?;
    let (name, batch) = store.init_project(cwd, opts.name.as_deref()).await?;
    info!(
        "initialized {name} with {} linked file(s) using {}",
        batch.paths.len(),
        store.settings().topology
    );

    Ok(report_batch(&batch))
}

fn run_add(sync_repo: PathBuf, cwd: PathBuf, opts: AddOptions) -> Result<i32> {
    let mut store = Store::open(sync_repo)?;
    let name = store.current_project_name(&cwd)?;

    let batch = if opts.all {
        store.add_all(&name)?
    } else if opts.files.is_empty() {
        bail!("nothing to add, name some files or pass --all");
    } else {
        store.add_files(&name, &cwd, &opts.files)?
    };

    for path in &batch.paths {
        info!("linked {}", path.display());
    }

    Ok(report_batch(&batch))
}

fn run_remove(sync_repo: PathBuf, cwd: PathBuf, opts: RemoveOptions) -> Result<i32> {
    let mut store = Store::open(sync_repo)?;
    let name = store.current_project_name(&cwd)?;

    let batch = if opts.project {
        let confirmed = opts.yes
            || Confirm::new(&format!("Stop tracking {name} and remove all of its links?"))
                .with_default(false)
                .prompt()?;
        if !confirmed {
            info!("nothing removed");
            return Ok(0);
        }
        store.remove_project(&name)?
    } else if opts.files.is_empty() {
        bail!("nothing to remove, name some files or pass --project");
    } else {
        store.remove_files(&name, &cwd, &opts.files)?
    };

    for path in &batch.paths {
        info!("unlinked {}", path.display());
    }

    Ok(report_batch(&batch))
}

fn run_list(sync_repo: PathBuf, opts: ListOptions) -> Result<i32> {
    let store = Store::open(sync_repo)?;
    let summaries = store.list();

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(0);
    }

    if summaries.is_empty() {
        info!("no projects tracked yet, run `projsync init` inside a project");
    }

    for summary in &summaries {
        print_summary(summary, opts.long);
    }

    Ok(0)
}

fn print_summary(summary: &ProjectSummary, long: bool) {
    let linked = summary
        .files
        .iter()
        .filter(|file| file.state == LinkState::Correct)
        .count();
    let root = if summary.root_missing {
        format!("{} (missing)", summary.root_path.display())
    } else {
        summary.root_path.display().to_string()
    };
    println!(
        "{} [{}] {} ({linked}/{} linked)",
        summary.name,
        summary.branch,
        root,
        summary.files.len()
    );

    if long {
        for file in &summary.files {
            println!("    {:<10} {}", file.state.to_string(), file.path.display());
        }
    }
}

fn run_sync(sync_repo: PathBuf) -> Result<i32> {
    let mut store = Store::open(sync_repo)?;
    let results = store.sync()?;

    let mut code = 0;
    for (name, changes) in &results {
        code = code.max(report_changes(name, changes));
    }

    Ok(code)
}

fn run_git(sync_repo: PathBuf, cwd: PathBuf, args: Vec<OsString>) -> Result<i32> {
    let store = Store::open(sync_repo)?;
    Ok(store.forward(cwd, &args)?)
}

/// Log per-file failures, and pick exit code.
fn report_batch(batch: &LinkBatch) -> i32 {
    for failure in &batch.failures {
        warn!("{failure}");
    }

    i32::from(!batch.is_clean())
}

fn report_changes(name: &str, changes: &ChangeSet) -> i32 {
    if changes.is_empty() && changes.failures.is_empty() {
        info!("{name}: up to date");
    } else {
        info!(
            "{name}: {} added, {} removed, {} updated",
            changes.added.len(),
            changes.removed.len(),
            changes.updated.len()
        );
    }

    for failure in &changes.failures {
        warn!("{name}: {failure}");
    }

    i32::from(!changes.failures.is_empty())
}
