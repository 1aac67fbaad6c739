//! # gitfleet
//!
//! **gitfleet** runs one git operation across every repository listed in
//! `$(gitfleet home)/config.toml`.
//!
//! Features:
//! - `gitfleet pull|push|fetch|sync` talk to remotes in parallel
//! - `gitfleet checkout|create-branch|delete-branch|stash|reset|clean|status`
//!   work on local state
//! - `gitfleet check` shows which repositories would run and why others won't
//! - `gitfleet list` prints the configured repositories
//! - `gitfleet home` prints the gitfleet home directory
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gitfleet::bulk::{
    CheckoutParams, CleanParams, CreateBranchParams, DeleteBranchParams, FetchParams, Operation,
    RemoteParams, ResetMode, ResetParams, StashParams,
};
use gitfleet::{RunSettings, cmd_check, cmd_list, cmd_run, gitfleet_home};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "gitfleet",
    version,
    about = "gitfleet - run git operations across many repositories",
    arg_required_else_help = true
)]
struct Cli {
    /// Path to config.toml (defaults to $(gitfleet home)/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Options shared by every bulk subcommand.
#[derive(Args, Debug)]
struct RunArgs {
    /// Only run on repositories whose id or name matches (glob, repeatable)
    #[arg(long = "repo", value_name = "GLOB")]
    repos: Vec<String>,
    /// Maximum number of repositories processed at once
    #[arg(long)]
    max_concurrent: Option<usize>,
    /// Per-repository timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Stop dispatching after the first failure
    #[arg(long)]
    abort_on_error: bool,
}

impl From<&RunArgs> for RunSettings {
    fn from(a: &RunArgs) -> Self {
        RunSettings {
            repos: a.repos.clone(),
            max_concurrent: a.max_concurrent,
            timeout_ms: a.timeout_ms,
            abort_on_error: a.abort_on_error,
        }
    }
}

#[derive(Args, Debug)]
struct RemoteArgs {
    /// Remote name
    #[arg(long, default_value = "origin")]
    remote: String,
    /// Branch (defaults to the current branch)
    #[arg(long)]
    branch: Option<String>,
}

impl RemoteArgs {
    fn params(&self) -> RemoteParams {
        RemoteParams {
            remote: self.remote.clone(),
            branch: self.branch.clone(),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// Fetch and fast-forward the current branch
    Pull {
        #[command(flatten)]
        remote: RemoteArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Push a branch to its remote
    Push {
        #[command(flatten)]
        remote: RemoteArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Fetch from a remote
    Fetch {
        #[arg(long, default_value = "origin")]
        remote: String,
        /// Remove remote-tracking refs that no longer exist
        #[arg(long)]
        prune: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Switch to an existing branch
    Checkout {
        branch: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Create a branch at HEAD
    CreateBranch {
        name: String,
        /// Switch to the new branch
        #[arg(long)]
        checkout: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Delete a local branch
    DeleteBranch {
        name: String,
        /// Delete even if not merged into HEAD
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Stash local changes
    Stash {
        #[arg(short, long)]
        message: Option<String>,
        /// Include untracked files
        #[arg(short = 'u', long)]
        include_untracked: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Reset HEAD to a commit
    Reset {
        /// soft, mixed or hard
        #[arg(long, default_value = "mixed")]
        mode: ResetMode,
        #[arg(default_value = "HEAD")]
        target: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Remove untracked files
    Clean {
        /// Also remove untracked directories
        #[arg(short, long)]
        directories: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Summarize working tree status
    Status {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Pull then push
    Sync {
        #[command(flatten)]
        remote: RemoteArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show which repositories would run, and why the others would not
    Check {
        #[arg(long = "repo", value_name = "GLOB")]
        repos: Vec<String>,
    },
    /// List configured repositories
    List,
    /// Print the gitfleet home directory
    Home,
}

/// Logs go to stderr so they never mix with per-repository output.
/// `GITFLEET_LOG` takes precedence over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "gitfleet=warn",
        1 => "gitfleet=info",
        _ => "gitfleet=debug",
    };
    let filter = EnvFilter::try_from_env("GITFLEET_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.config.as_deref();

    let (operation, run) = match cli.cmd {
        Cmd::Pull { remote, run } => (Operation::Pull(remote.params()), run),
        Cmd::Push { remote, run } => (Operation::Push(remote.params()), run),
        Cmd::Sync { remote, run } => (Operation::Sync(remote.params()), run),
        Cmd::Fetch { remote, prune, run } => (Operation::Fetch(FetchParams { remote, prune }), run),
        Cmd::Checkout { branch, run } => (Operation::Checkout(CheckoutParams { branch }), run),
        Cmd::CreateBranch {
            name,
            checkout,
            run,
        } => (
            Operation::CreateBranch(CreateBranchParams { name, checkout }),
            run,
        ),
        Cmd::DeleteBranch { name, force, run } => (
            Operation::DeleteBranch(DeleteBranchParams { name, force }),
            run,
        ),
        Cmd::Stash {
            message,
            include_untracked,
            run,
        } => (
            Operation::Stash(StashParams {
                message,
                include_untracked,
            }),
            run,
        ),
        Cmd::Reset { mode, target, run } => (Operation::Reset(ResetParams { mode, target }), run),
        Cmd::Clean { directories, run } => (Operation::Clean(CleanParams { directories }), run),
        Cmd::Status { run } => (Operation::Status, run),
        Cmd::Check { repos } => return cmd_check(config, &repos),
        Cmd::List => return cmd_list(config),
        Cmd::Home => {
            println!("{}", gitfleet_home()?.display());
            return Ok(());
        }
    };

    cmd_run(config, operation, &RunSettings::from(&run))
}
