//! Offline queue commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;

use agora_core::repo::{ActionKind, QueuedAction, Record};
use agora_core::types::Collection;

use crate::cli::GlobalArgs;
use crate::context;
use crate::output;

use super::read_json;

#[derive(Args, Debug)]
pub struct QueueCommand {
    #[command(subcommand)]
    pub command: QueueSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum QueueSubcommand {
    /// Queue a mutation for the next sync
    Add(AddArgs),

    /// List queued actions in replay order
    List(ListArgs),

    /// List actions that gave up after too many failed replays
    DeadLetters(DeadLettersArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Target collection
    pub collection: String,

    /// Mutation kind: create, update or delete
    #[arg(long)]
    pub kind: ActionKind,

    /// JSON file with the row payload (use - for stdin)
    #[arg(long)]
    pub json: Option<String>,

    /// Reject the action if this many are already queued
    #[arg(long)]
    pub max_queued: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct DeadLettersArgs {
    /// Discard every dead letter
    #[arg(long)]
    pub clear: bool,
}

pub async fn handle(cmd: QueueCommand, global: &GlobalArgs) -> Result<()> {
    match cmd.command {
        QueueSubcommand::Add(args) => add(args, global),
        QueueSubcommand::List(args) => list(args, global),
        QueueSubcommand::DeadLetters(args) => dead_letters(args, global),
    }
}

fn add(args: AddArgs, global: &GlobalArgs) -> Result<()> {
    let collection = Collection::new(&args.collection).context("Invalid collection name")?;

    let payload: Value = match &args.json {
        Some(path) => read_json(path)?,
        None => Value::Object(serde_json::Map::new()),
    };
    let payload = Record::new(payload).context("Invalid row payload")?;

    let action =
        QueuedAction::new(args.kind, collection, payload).context("Invalid queued action")?;
    let id = action.id;

    context::store(global)?
        .push_action(action, args.max_queued)
        .context("Failed to queue action")?;

    println!("{}", id);
    output::success(&format!("Queued {} on {}", args.kind, args.collection));

    Ok(())
}

fn list(args: ListArgs, global: &GlobalArgs) -> Result<()> {
    let mut actions = context::store(global)?
        .pending_actions()
        .context("Failed to read offline queue")?;

    if actions.is_empty() {
        eprintln!("{}", "No queued actions.".dimmed());
        return Ok(());
    }

    actions.sort_by_key(|a| a.enqueued_at);
    print_actions(&actions, args.pretty)
}

fn dead_letters(args: DeadLettersArgs, global: &GlobalArgs) -> Result<()> {
    let store = context::store(global)?;

    if args.clear {
        let removed = store
            .clear_dead_letters()
            .context("Failed to clear dead letters")?;
        output::success(&format!("Discarded {} dead letters", removed));
        return Ok(());
    }

    let actions = store.dead_letters().context("Failed to read dead letters")?;
    if actions.is_empty() {
        eprintln!("{}", "No dead letters.".dimmed());
        return Ok(());
    }

    print_actions(&actions, false)
}

fn print_actions(actions: &[QueuedAction], pretty: bool) -> Result<()> {
    for action in actions {
        if pretty {
            output::json_pretty(action)?;
        } else {
            output::json(action)?;
        }
    }
    Ok(())
}
