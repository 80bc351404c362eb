mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{app::AppSubcommand, changes::ChangesSubcommand, host::HostSubcommand};
use roost_core::comm::HttpDispatcher;
use roost_core::manager::ConfigManager;
use roost_core::store::RedbStore;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "roost",
    about = "Configuration change orchestrator for Kea fleets — stage, commit, and schedule host reservation changes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Orchestrator database file
    #[arg(long, global = true, env = "ROOST_DB", default_value = "roost.db")]
    db: PathBuf,

    /// Control command timeout in seconds
    #[arg(long, global = true, value_name = "SECS", default_value = "10")]
    timeout: u64,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage apps and their daemons
    App {
        #[command(subcommand)]
        subcommand: AppSubcommand,
    },

    /// Manage host reservations
    Host {
        #[command(subcommand)]
        subcommand: HostSubcommand,
    },

    /// Inspect scheduled configuration changes
    Changes {
        #[command(subcommand)]
        subcommand: ChangesSubcommand,
    },

    /// Execute every scheduled change whose deadline has passed
    Sweep,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Sweep => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let manager = open_manager(&cli.db, cli.timeout)?;
    match cli.command {
        Commands::App { subcommand } => cmd::app::run(&manager, subcommand, cli.json),
        Commands::Host { subcommand } => cmd::host::run(&manager, subcommand, cli.json),
        Commands::Changes { subcommand } => cmd::changes::run(&manager, subcommand, cli.json),
        Commands::Sweep => cmd::sweep::run(&manager, cli.json),
    }
}

fn open_manager(db: &Path, timeout_secs: u64) -> anyhow::Result<ConfigManager> {
    use anyhow::Context;
    let store =
        RedbStore::open(db).with_context(|| format!("cannot open database {}", db.display()))?;
    let dispatcher = HttpDispatcher::with_timeout(Duration::from_secs(timeout_secs))?;
    Ok(ConfigManager::new(store, Box::new(dispatcher)))
}
