//! Core identifier types.
//!
//! These types enforce their invariants at construction time,
//! so an invalid collection name or URL cannot reach a backend.

mod collection;
mod record_id;
mod service_url;

pub use collection::Collection;
pub use record_id::RecordId;
pub use service_url::ServiceUrl;
