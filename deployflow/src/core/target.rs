//! Syntactic classification of repository targets.

use std::path::Path;

use crate::error::DeployError;

/// Repository representation selected for a target string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Remote (or bare local) git repository.
    Git,
    /// Zip archive, local or `http(s)://`.
    Zip,
    /// Tar archive, optionally gzip-compressed, local or `http(s)://`.
    Tar,
    /// Existing local directory.
    Directory,
}

/// Classify `target`, checked in priority order: git, zip, tar, directory.
///
/// Only the directory case touches the filesystem.
pub fn classify(target: &str) -> Result<TargetKind, DeployError> {
    let normalized = normalize(target);
    if normalized.ends_with(".git") || normalized.starts_with("git@") || normalized.starts_with("ssh://") {
        return Ok(TargetKind::Git);
    }
    if normalized.ends_with(".zip") {
        return Ok(TargetKind::Zip);
    }
    if normalized.ends_with(".tar") || normalized.ends_with(".tar.gz") || normalized.ends_with(".tgz") {
        return Ok(TargetKind::Tar);
    }
    if !normalized.is_empty() && Path::new(target).is_dir() {
        return Ok(TargetKind::Directory);
    }
    Err(DeployError::UnsupportedTarget(target.to_string()))
}

/// True when the target must be fetched over HTTP rather than opened locally.
pub fn is_remote_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// True when a tar target is gzip-compressed.
pub fn is_gzip(target: &str) -> bool {
    let normalized = normalize(target);
    normalized.ends_with(".gz") || normalized.ends_with(".tgz")
}

/// Last path segment of the target with its archive or `.git` suffix removed.
///
/// `https://host/org/hello_world.git` -> `hello_world`,
/// `C:\Downloads\app-main.tar.gz` -> `app-main`, `git@host:org/app.git` -> `app`.
pub fn repository_name(target: &str) -> String {
    let normalized = normalize(target);
    let last = normalized
        .rsplit(|c| c == '/' || c == ':')
        .next()
        .unwrap_or(normalized.as_str());
    for suffix in [".tar.gz", ".tgz", ".tar", ".zip", ".git"] {
        if let Some(stripped) = last.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    if last == "." || last.is_empty() {
        return current_dir_name().unwrap_or_else(|| "repo".to_string());
    }
    last.to_string()
}

/// Keep only ASCII alphanumerics (`hello_world-main` -> `helloworldmain`).
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(char::is_ascii_alphanumeric).collect();
    if cleaned.is_empty() {
        "repo".to_string()
    } else {
        cleaned
    }
}

fn normalize(target: &str) -> String {
    let mut out = target.trim().replace('\\', "/");
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

fn current_dir_name() -> Option<String> {
    let cwd = std::env::current_dir().ok()?;
    cwd.file_name().map(|name| name.to_string_lossy().into_owned())
}
