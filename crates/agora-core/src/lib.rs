//! agora-core - Core types and traits for the agora offline-first client.

pub mod booking;
pub mod error;
pub mod repo;
pub mod traits;
pub mod types;

pub use error::Error;
pub use repo::{
    ActionKind, ChangeEvent, ChangeKind, Filter, Order, Query, QueuedAction, Record,
    Subscription,
};
pub use traits::{Backend, ChangeFeed};
pub use types::{Collection, RecordId, ServiceUrl};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
