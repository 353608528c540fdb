//! Watch command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;

use agora_core::repo::ChangeEvent;
use agora_core::traits::Backend;
use agora_core::types::Collection;
use agora_sync::{ListCache, PatchOutcome, RealtimePatcher};

use crate::cli::GlobalArgs;
use crate::context;
use crate::output;

use super::fetch::build_query;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Collection to watch
    pub collection: String,

    /// Equality filter (column=value); the first one narrows the subscription
    #[arg(long)]
    pub filter: Vec<String>,

    /// Column expression used to re-fetch inserted rows
    #[arg(long)]
    pub select: Option<String>,

    /// Sort column for the initial load, with an optional .asc or .desc suffix
    #[arg(long)]
    pub order: Option<String>,

    /// Print each event instead of the patched list
    #[arg(long)]
    pub events: bool,
}

pub async fn run(args: WatchArgs, global: &GlobalArgs) -> Result<()> {
    let collection = Collection::new(&args.collection).context("Invalid collection name")?;
    let query = build_query(
        &args.filter,
        args.select.as_deref(),
        args.order.as_deref(),
        None,
    )?;

    let backend = Arc::new(context::backend(global)?);
    let patcher = RealtimePatcher::new(backend.clone(), Arc::new(ListCache::new()), collection, query);

    let rows = patcher.load().await.context("Failed to load list")?;
    output::json(&rows)?;

    let mut feed = backend
        .subscribe(patcher.subscription())
        .await
        .context("Failed to start subscription")?;

    eprintln!("{}", "Watching for changes...".dimmed());
    eprintln!("{}", "Press Ctrl+C to stop.".dimmed());
    eprintln!();

    loop {
        let item = tokio::select! {
            item = feed.next() => item,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(item) = item else {
            break;
        };

        match item {
            Ok(event) => {
                let label = describe(&event);
                let outcome = patcher.apply(event).await;
                if args.events {
                    eprintln!("{} {:?}", label, outcome);
                    continue;
                }
                if outcome != PatchOutcome::Ignored {
                    output::json(&patcher.rows().unwrap_or_default())?;
                }
            }
            Err(e) => output::error(&e.to_string()),
        }
    }

    Ok(())
}

fn describe(event: &ChangeEvent) -> String {
    let kind = match event.kind_name() {
        "insert" => "INSERT".green(),
        "update" => "UPDATE".yellow(),
        "delete" => "DELETE".red(),
        other => other.normal(),
    };
    let id = event
        .record_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "?".to_string());
    format!("{} {} {}", kind, event.collection.as_str().dimmed(), id)
}
