//! agora-sync - Client-side state for the agora offline-first client.
//!
//! This crate keeps a client usable while the network comes and goes:
//!
//! - [`OfflineStore`] persists queued mutations and read snapshots on disk.
//! - [`Connectivity`] tracks whether the client believes it is online.
//! - [`SyncEngine`] queues mutations while offline and replays them in order
//!   once connectivity returns.
//! - [`ListCache`] holds the lists currently shown to the user, and
//!   [`RealtimePatcher`] keeps one of them current from a change feed.
//!
//! Every piece is constructed explicitly and shared by handle; there is no
//! global state.

pub mod cache;
pub mod connectivity;
pub mod engine;
pub mod notify;
pub mod patcher;
pub mod store;

pub use cache::{CacheKey, ListCache};
pub use connectivity::Connectivity;
pub use engine::{MutationOutcome, SyncConfig, SyncEngine, SyncReport, SyncSummary};
pub use notify::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use patcher::{PatchOutcome, RealtimePatcher};
pub use store::{OfflineSnapshot, OfflineStore};
