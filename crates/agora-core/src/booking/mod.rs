//! Free-slot calculation for professional bookings.
//!
//! A professional publishes weekly availability windows and may block whole
//! dates. Clients book one-hour slots inside those windows.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Booking slots are one hour long.
pub const SLOT_MINUTES: i64 = 60;

const DAY_SECONDS: i64 = 24 * 60 * 60;

fn second_of_day(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight())
}

/// Like [`second_of_day`], but an end time of 00:00 closes the day.
fn closing_second(time: NaiveTime) -> i64 {
    match second_of_day(time) {
        0 => DAY_SECONDS,
        s => s,
    }
}

/// A recurring weekly availability window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    /// Day of week, 0 = Sunday through 6 = Saturday.
    pub day_of_week: u8,
    /// Window start (inclusive).
    pub start_time: NaiveTime,
    /// Window end (exclusive); 00:00 means the end of the day.
    pub end_time: NaiveTime,
}

/// Lifecycle state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// An existing booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: BookingStatus,
}

impl Booking {
    /// Whether this booking occupies time on `date`.
    pub fn blocks(&self, date: NaiveDate) -> bool {
        self.booking_date == date && self.status != BookingStatus::Cancelled
    }
}

/// A bookable slot on the requested date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    /// Half-open interval overlap with `[start, end)`. An end of 00:00 is
    /// midnight at the close of the day.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        second_of_day(self.start) < closing_second(end)
            && second_of_day(start) < closing_second(self.end)
    }
}

/// Compute the free one-hour slots on `date`.
///
/// Only windows for the date's weekday contribute. A window whose length is
/// not a whole number of hours loses its trailing partial hour. An end time of
/// 00:00 closes the day, so 20:00-00:00 yields four slots and 00:00-00:00 is a
/// full day. Any other window that ends at or before its start contributes
/// nothing. Blocked dates have no slots. Cancelled bookings and bookings on
/// other dates never block.
pub fn free_slots(
    date: NaiveDate,
    windows: &[AvailabilityWindow],
    blocked_dates: &[NaiveDate],
    bookings: &[Booking],
) -> Vec<Slot> {
    if blocked_dates.contains(&date) {
        return Vec::new();
    }

    let weekday = date.weekday().num_days_from_sunday() as u8;
    let taken: Vec<&Booking> = bookings.iter().filter(|b| b.blocks(date)).collect();

    let slot_length = SLOT_MINUTES * 60;
    let mut slots = Vec::new();

    for window in windows.iter().filter(|w| w.day_of_week == weekday) {
        let close = closing_second(window.end_time);
        let mut offset = second_of_day(window.start_time);

        while offset + slot_length <= close {
            let next = offset + slot_length;
            let (Some(start), Some(end)) = (time_at(offset), time_at(next % DAY_SECONDS)) else {
                break;
            };

            let slot = Slot { start, end };
            if !taken
                .iter()
                .any(|b| slot.overlaps(b.start_time, b.end_time))
            {
                slots.push(slot);
            }

            offset = next;
        }
    }

    slots.sort();
    slots.dedup();
    slots
}

fn time_at(second: i64) -> Option<NaiveTime> {
    let second = u32::try_from(second).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(second, 0)
}
