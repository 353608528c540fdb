//! Resolving local state and the backend from global arguments.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use tracing::{debug, warn};

use agora_core::types::ServiceUrl;
use agora_file::FileBackend;
use agora_rest::{RestBackend, RestConfig};
use agora_sync::OfflineStore;

use crate::backend::CliBackend;
use crate::cli::GlobalArgs;

/// Get the data directory, creating it if needed.
pub fn data_dir(global: &GlobalArgs) -> Result<PathBuf> {
    let dir = match &global.data_dir {
        Some(dir) => dir.clone(),
        None => ProjectDirs::from("", "", "agora")
            .context("Could not determine data directory")?
            .data_dir()
            .to_path_buf(),
    };

    fs::create_dir_all(&dir).context("Failed to create data directory")?;
    debug!(path = %dir.display(), "Using data directory");
    Ok(dir)
}

/// Open the offline store in the data directory.
pub fn store(global: &GlobalArgs) -> Result<OfflineStore> {
    Ok(OfflineStore::new(data_dir(global)?))
}

/// Connect to the configured backend.
pub fn backend(global: &GlobalArgs) -> Result<CliBackend> {
    let Some(url) = &global.url else {
        bail!("No backend configured. Pass --url or set AGORA_URL.");
    };
    let url = ServiceUrl::new(url).context("Invalid backend URL")?;

    if url.is_local() {
        let path = url
            .to_file_path()
            .context("Failed to convert file:// URL to path")?;
        if global.api_key.is_some() || global.access_token.is_some() {
            warn!("Ignoring credentials for a file:// backend");
        }
        debug!(path = %path.display(), "Using file backend");
        return Ok(CliBackend::File(FileBackend::new(path)));
    }

    let api_key = global
        .api_key
        .clone()
        .context("A hosted backend needs an API key. Pass --api-key or set AGORA_API_KEY.")?;

    debug!(url = %url, "Using REST backend");
    let mut config = RestConfig::new(url, api_key);
    if let Some(token) = &global.access_token {
        config = config.with_access_token(token.clone());
    }

    let backend = RestBackend::new(config).context("Failed to create REST client")?;
    Ok(CliBackend::Rest(backend))
}
