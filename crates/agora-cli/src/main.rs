//! agora - CLI for the agora offline-first client.
//!
//! A thin wrapper over the agora crates for inspecting the offline queue,
//! forcing a resync, reading through the offline cache, watching a realtime
//! feed and computing booking slots.

mod backend;
mod cli;
mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use commands::{fetch, queue, slots, sync, watch};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    let global = cli.global;
    match cli.command {
        Commands::Queue(cmd) => queue::handle(cmd, &global).await,
        Commands::Sync(args) => sync::run(args, &global).await,
        Commands::Fetch(args) => fetch::run(args, &global).await,
        Commands::Watch(args) => watch::run(args, &global).await,
        Commands::Slots(args) => slots::run(args).await,
    }
}

fn init_logging(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries command output; logs go to stderr.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
