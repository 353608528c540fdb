//! Subcommand implementations.

pub mod fetch;
pub mod queue;
pub mod slots;
pub mod sync;
pub mod watch;

use std::io::{self, Read};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Read JSON from a file, or from stdin when `path` is `-`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let content = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?
    };

    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path))
}
