//! Slots command implementation.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use colored::Colorize;

use agora_core::booking::{self, AvailabilityWindow, Booking};

use crate::output;

use super::read_json;

#[derive(Args, Debug)]
pub struct SlotsArgs {
    /// JSON file with weekly availability windows (use - for stdin)
    #[arg(long)]
    pub availability: String,

    /// Date to compute slots for (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,

    /// JSON file with existing bookings
    #[arg(long)]
    pub bookings: Option<String>,

    /// Date on which no slots are offered; may be repeated
    #[arg(long)]
    pub blocked: Vec<NaiveDate>,

    /// Output slots as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: SlotsArgs) -> Result<()> {
    let windows: Vec<AvailabilityWindow> = read_json(&args.availability)?;
    let bookings: Vec<Booking> = match &args.bookings {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let slots = booking::free_slots(args.date, &windows, &args.blocked, &bookings);

    if args.json {
        return output::json(&slots);
    }

    if slots.is_empty() {
        eprintln!("{}", "No free slots.".dimmed());
        return Ok(());
    }

    for slot in &slots {
        println!("{}-{}", slot.start.format("%H:%M"), slot.end.format("%H:%M"));
    }

    Ok(())
}
