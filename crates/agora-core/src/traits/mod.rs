//! Core traits for backend access.

mod backend;
mod feed;

pub use backend::Backend;
pub use feed::ChangeFeed;
