//! Rows, queries, queued actions and change events.

mod action;
mod events;
mod query;
mod record;

pub use action::{ActionKind, QueuedAction};
pub use events::{ChangeEvent, ChangeKind, Subscription};
pub use query::{Filter, Order, Query};
pub use record::Record;
