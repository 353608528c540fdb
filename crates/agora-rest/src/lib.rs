//! agora-rest - Backend over the hosted service's REST and realtime APIs.

mod backend;
mod client;
mod config;
mod realtime;

pub use backend::RestBackend;
pub use config::RestConfig;
pub use realtime::RestFeed;
