//! agora-file - Filesystem-backed backend.
//!
//! Stores each row as a JSON file and appends every change to a JSONL log,
//! which the change feed tails. Useful for local development and tests
//! without a hosted project.

mod backend;
mod feed;
mod store;

pub use backend::FileBackend;
pub use feed::FileFeed;
pub use store::FileStore;
