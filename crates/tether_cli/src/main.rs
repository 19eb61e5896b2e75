//! Tether CLI
//!
//! Query platform feature keys and exercise the handle/signal bridge against
//! the headless toolkit.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod simulate;

use config::TetherConfig;
use tether_core::headless::DeleteMode;
use tether_core::Features;

#[derive(Parser)]
#[command(name = "tether")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tether native bridge tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./tether.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether feature keys are supported
    Features {
        /// Feature keys to query (defaults to the known multimedia keys)
        keys: Vec<String>,
    },

    /// Run a headless item lifecycle simulation
    Simulate {
        /// Number of grid items (overrides config)
        #[arg(short, long)]
        items: Option<usize>,

        /// Queue native deletes until the end of the run
        #[arg(long)]
        deferred: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cwd = std::env::current_dir()?;
    let config = TetherConfig::load(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Features { keys } => cmd_features(&config, keys),
        Commands::Simulate { items, deferred } => cmd_simulate(&config, items, deferred),
    }
}

fn cmd_features(config: &TetherConfig, keys: Vec<String>) -> Result<()> {
    let info = config.system_info();
    let keys = if keys.is_empty() {
        Features::ALL.iter().map(|k| k.to_string()).collect()
    } else {
        keys
    };

    info!(known = info.len(), "querying {} feature keys", keys.len());
    for key in &keys {
        let supported = Features::is_supported(&info, key);
        println!("{:<13} {}", if supported { "supported" } else { "unsupported" }, key);
    }

    Ok(())
}

fn cmd_simulate(config: &TetherConfig, items: Option<usize>, deferred: bool) -> Result<()> {
    let items = items.unwrap_or(config.simulate.items);
    let mode = if deferred {
        DeleteMode::Deferred
    } else {
        config.simulate.delete_mode.into()
    };

    info!(items, ?mode, "starting simulation");
    let report = simulate::run(items, mode)?;

    println!("created              {}", report.created);
    println!("selections           {}", report.selections);
    println!("deleted (explicit)   {}", report.deleted_explicitly);
    println!("destroyed (native)   {}", report.destroyed_natively);
    println!("deleted events       {}", report.deleted_notifications);
    println!("remaining items      {}", report.remaining_items);
    println!("remaining signals    {}", report.remaining_registrations);

    if report.remaining_items != 0 || report.remaining_registrations != 0 {
        anyhow::bail!("simulation left live bookkeeping behind");
    }
    Ok(())
}
