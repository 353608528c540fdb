//! Sync command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use agora_sync::{Connectivity, SyncConfig, SyncEngine, SyncReport};

use crate::cli::GlobalArgs;
use crate::context;
use crate::output::{self, ConsoleNotifier};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Dead-letter an action after this many failed replays
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Give up on a single replayed call after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub async fn run(args: SyncArgs, global: &GlobalArgs) -> Result<()> {
    let backend = context::backend(global)?;
    let store = context::store(global)?;

    let config = SyncConfig {
        max_attempts: args.max_attempts,
        action_timeout: args.timeout.map(Duration::from_secs),
        ..Default::default()
    };

    let engine = SyncEngine::new(Arc::new(backend), store, Connectivity::new(true))
        .with_notifier(Arc::new(ConsoleNotifier))
        .with_config(config);

    let report = engine
        .sync_offline_actions()
        .await
        .context("Sync aborted")?;

    match report {
        SyncReport::AlreadyRunning => {
            eprintln!("{}", "Another sync is already running.".dimmed());
        }
        SyncReport::Offline => {
            eprintln!("{}", "Offline, nothing replayed.".dimmed());
        }
        SyncReport::Completed(summary) if summary.applied + summary.failed == 0 => {
            eprintln!("{}", "Nothing to sync.".dimmed());
        }
        SyncReport::Completed(summary) => {
            output::field("Applied", &summary.applied.to_string());
            output::field("Failed", &summary.failed.to_string());
            if summary.dead_lettered > 0 {
                output::field("Dead-lettered", &summary.dead_lettered.to_string());
            }
            output::field("Remaining", &summary.remaining.to_string());
        }
    }

    Ok(())
}
