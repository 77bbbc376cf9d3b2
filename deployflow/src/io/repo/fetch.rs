use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::target::is_remote_url;
use crate::error::DeployError;

/// Load an archive into memory, downloading it when `target` is a URL.
///
/// Transport failures, HTTP error statuses and unreadable local files are all
/// reported as [`DeployError::SourceUnavailable`].
#[instrument(skip_all, fields(target))]
pub fn load_bytes(target: &str) -> Result<Vec<u8>> {
    if is_remote_url(target) {
        return download(target);
    }
    let bytes = fs::read(target)
        .map_err(|err| DeployError::source_unavailable(format!("read {target}: {err}")))?;
    debug!(target, bytes = bytes.len(), "archive loaded");
    Ok(bytes)
}

fn download(url: &str) -> Result<Vec<u8>> {
    debug!(url, "downloading archive");
    let response = reqwest::blocking::get(url)
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|err| DeployError::source_unavailable(format!("download {url}: {err}")))?;
    let bytes = response
        .bytes()
        .map_err(|err| DeployError::source_unavailable(format!("download {url}: {err}")))
        .with_context(|| format!("read body of {url}"))?;
    debug!(url, bytes = bytes.len(), "archive downloaded");
    Ok(bytes.to_vec())
}
