//! Fetch command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use agora_core::error::OfflineError;
use agora_core::repo::{Filter, Order, Query, Record};
use agora_core::types::Collection;
use agora_sync::{Connectivity, OfflineStore, SyncEngine};

use crate::cli::GlobalArgs;
use crate::context;
use crate::output;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Collection to read
    pub collection: String,

    /// Snapshot key the result is stored under for offline reads
    #[arg(long)]
    pub key: String,

    /// Equality filter (column=value); may be repeated
    #[arg(long)]
    pub filter: Vec<String>,

    /// Column expression, e.g. "*,profiles(username)"
    #[arg(long)]
    pub select: Option<String>,

    /// Sort column, with an optional .asc or .desc suffix
    #[arg(long)]
    pub order: Option<String>,

    /// Maximum number of rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Read only the offline snapshot
    #[arg(long)]
    pub offline: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Build a query from command-line pieces.
pub(crate) fn build_query(
    filters: &[String],
    select: Option<&str>,
    order: Option<&str>,
    limit: Option<usize>,
) -> Result<Query> {
    let mut query = Query::new();
    for expr in filters {
        query = query.filter(Filter::parse(expr).context("Invalid filter")?);
    }
    if let Some(select) = select {
        query = query.select(select);
    }
    if let Some(order) = order {
        query.order = Some(Order::parse(order).context("Invalid order")?);
    }
    query.limit = limit;
    Ok(query)
}

pub async fn run(args: FetchArgs, global: &GlobalArgs) -> Result<()> {
    let collection = Collection::new(&args.collection).context("Invalid collection name")?;
    let query = build_query(
        &args.filter,
        args.select.as_deref(),
        args.order.as_deref(),
        args.limit,
    )?;
    let store = context::store(global)?;

    let rows = if args.offline && global.url.is_none() {
        read_snapshot(&store, &args.key)?
    } else {
        let backend = context::backend(global)?;
        let engine = SyncEngine::new(Arc::new(backend), store, Connectivity::new(!args.offline));
        engine
            .fetch_with_offline_fallback(&args.key, &collection, &query)
            .await
            .context("Failed to fetch rows")?
    };

    if rows.is_empty() {
        eprintln!("{}", "No rows found.".dimmed());
        return Ok(());
    }

    for row in &rows {
        if args.pretty {
            output::json_pretty(row)?;
        } else {
            output::json(row)?;
        }
    }

    Ok(())
}

/// Offline read without any backend configured.
fn read_snapshot(store: &OfflineStore, key: &str) -> Result<Vec<Record>> {
    let snapshot = store
        .snapshot(key)
        .context("Failed to read offline cache")?
        .ok_or_else(|| OfflineError::NoSnapshot {
            key: key.to_string(),
        })
        .context("Failed to fetch rows")?;
    Ok(snapshot.payload)
}
