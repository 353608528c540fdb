//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::fetch::FetchArgs;
use crate::commands::queue::QueueCommand;
use crate::commands::slots::SlotsArgs;
use crate::commands::sync::SyncArgs;
use crate::commands::watch::WatchArgs;

/// Offline queue, cache and booking tool for agora.
#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where local state lives and which backend to talk to.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the offline queue and snapshots
    #[arg(long, env = "AGORA_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Backend URL (https://<project>, http://localhost:<port>, or file:///path)
    #[arg(long, env = "AGORA_URL", global = true)]
    pub url: Option<String>,

    /// Public API key for a hosted backend
    #[arg(long, env = "AGORA_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// User access token for a hosted backend
    #[arg(long, env = "AGORA_ACCESS_TOKEN", global = true, hide_env_values = true)]
    pub access_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and edit the offline queue
    Queue(QueueCommand),

    /// Replay queued actions against the backend
    Sync(SyncArgs),

    /// Read a collection, falling back to the offline snapshot
    Fetch(FetchArgs),

    /// Keep a list current from the realtime feed
    Watch(WatchArgs),

    /// Compute free booking slots for a date
    Slots(SlotsArgs),
}
