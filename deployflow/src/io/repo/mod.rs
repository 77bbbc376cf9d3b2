//! Uniform read access to a repository, whatever form it arrives in.
//!
//! [`open`] classifies the target and returns one backend behind the
//! [`RepositoryReader`] trait. Every backend reduces its native listing to the
//! same depth-1 [`Entry`] set via [`immediate_children`], so callers cannot tell
//! a zip from a clone.
//!
//! [`immediate_children`]: crate::core::entries::immediate_children

mod dir;
mod fetch;
mod git;
mod tar;
mod zip;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::core::entries::Entry;
use crate::core::target::{self, TargetKind};
use crate::error::DeployError;

pub use dir::DirReader;
pub use fetch::load_bytes;
pub use git::GitReader;
pub use tar::TarReader;
pub use zip::{ZipReader, archive_dir, copy_archive};

/// Lazy listing and reading over one repository instance.
///
/// A handle is owned by a single caller. `read` takes `&mut self` because the
/// git backend re-scopes its sparse checkout on every call. `close` releases
/// backend resources, is idempotent and also runs on drop.
pub trait RepositoryReader {
    /// Backend serving this handle.
    fn kind(&self) -> TargetKind;

    /// Immediate children of `subdir` (`""` is the root).
    fn list(&self, subdir: &str) -> Result<Vec<Entry>>;

    /// Full content of the file at `path`, decoded lossily as UTF-8.
    fn read(&mut self, path: &str) -> Result<String>;

    /// Release backend resources.
    fn close(&mut self) -> Result<()>;
}

/// Open `target` with the backend its syntax selects.
#[instrument(skip_all, fields(target))]
pub fn open(target: &str) -> Result<Box<dyn RepositoryReader>> {
    let kind = target::classify(target)?;
    info!(target, ?kind, "opening repository");
    let reader: Box<dyn RepositoryReader> = match kind {
        TargetKind::Directory => Box::new(DirReader::open(target)?),
        TargetKind::Zip => Box::new(ZipReader::open(target)?),
        TargetKind::Tar => Box::new(TarReader::open(target)?),
        TargetKind::Git => Box::new(GitReader::open(target)?),
    };
    Ok(reader)
}

/// Copy, extract or clone the whole of `target` into `destination`.
///
/// `destination` may be missing or an empty directory; anything else is a
/// [`DeployError::WorkspaceConflict`].
#[instrument(skip_all, fields(target))]
pub fn materialize(target: &str, destination: &Path) -> Result<()> {
    let kind = target::classify(target)?;
    ensure_empty_destination(destination)?;
    info!(target, ?kind, dest = %destination.display(), "materializing repository");
    match kind {
        TargetKind::Directory => copy_tree(Path::new(target), destination),
        TargetKind::Zip => zip::extract(&load_bytes(target)?, destination),
        TargetKind::Tar => tar::extract(load_bytes(target)?, target::is_gzip(target), destination),
        TargetKind::Git => git::clone_into(target, destination),
    }
}

fn ensure_empty_destination(destination: &Path) -> Result<()> {
    if !destination.exists() {
        return Ok(());
    }
    if !destination.is_dir() {
        return Err(DeployError::WorkspaceConflict(format!(
            "{} exists and is not a directory",
            destination.display()
        ))
        .into());
    }
    let mut entries = fs::read_dir(destination)
        .with_context(|| format!("read {}", destination.display()))?;
    if entries.next().is_some() {
        return Err(DeployError::WorkspaceConflict(format!(
            "{} is not empty",
            destination.display()
        ))
        .into());
    }
    Ok(())
}

fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)
        .with_context(|| format!("create {}", destination.display()))?;
    let mut copied = 0usize;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.with_context(|| format!("walk {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let out = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&out).with_context(|| format!("create {}", out.display()))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &out)
                .with_context(|| format!("copy {} to {}", entry.path().display(), out.display()))?;
            copied += 1;
        }
    }
    debug!(copied, "directory copied");
    Ok(())
}

/// Normalize a requested file path to the `/`-separated relative form.
fn file_key(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string()
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn closed_error(target: &str) -> anyhow::Error {
    DeployError::SourceUnavailable(format!("repository '{target}' is closed")).into()
}
