use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{RepositoryReader, closed_error, decode, file_key};
use crate::core::entries::{Entry, dir_prefix, has_prefix, immediate_children};
use crate::core::target::{TargetKind, repository_name, sanitize_name};
use crate::error::DeployError;
use crate::io::git::Git;

/// Blobless shallow clone in a private temporary directory.
///
/// Listings come from tree metadata only. Each read narrows the sparse
/// checkout to the one requested path, which fetches just that blob.
pub struct GitReader {
    target: String,
    clone: Option<(TempDir, Git)>,
}

impl GitReader {
    pub fn open(target: &str) -> Result<Self> {
        let prefix = format!("{}_", sanitize_name(&repository_name(target)));
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir()
            .context("create clone directory")?;
        let git = match Git::clone_metadata(target, dir.path()) {
            Ok(git) => git,
            Err(err) => {
                remove_clone(dir);
                return Err(DeployError::source_unavailable(format!("clone {target}: {err:#}")).into());
            }
        };
        info!(target, dir = %dir.path().display(), "repository cloned");
        Ok(Self {
            target: target.to_string(),
            clone: Some((dir, git)),
        })
    }

    /// Location of the clone while the handle is open.
    pub fn clone_dir(&self) -> Option<&Path> {
        self.clone.as_ref().map(|(_, git)| git.workdir())
    }

    fn git(&self) -> Result<&Git> {
        self.clone
            .as_ref()
            .map(|(_, git)| git)
            .ok_or_else(|| closed_error(&self.target))
    }
}

impl RepositoryReader for GitReader {
    fn kind(&self) -> TargetKind {
        TargetKind::Git
    }

    fn list(&self, subdir: &str) -> Result<Vec<Entry>> {
        let tree = self
            .git()?
            .ls_tree()
            .map_err(DeployError::source_unavailable)?;
        let members: Vec<(String, bool)> = tree.into_iter().map(|e| (e.path, e.is_dir)).collect();
        if !has_prefix(members.iter().map(|(path, is_dir)| (path, *is_dir)), subdir) {
            return Err(DeployError::NotFound(dir_prefix(subdir)).into());
        }
        Ok(immediate_children(members, subdir))
    }

    fn read(&mut self, path: &str) -> Result<String> {
        let key = file_key(path);
        let git = self.git()?;
        match git.lookup(&key).map_err(DeployError::source_unavailable)? {
            Some(entry) if !entry.is_dir => {}
            _ => return Err(DeployError::NotFound(key).into()),
        }
        let file = git
            .sparse_checkout(&key)
            .map_err(DeployError::source_unavailable)?;
        if !file.is_file() {
            return Err(DeployError::source_unavailable(format!(
                "sparse checkout did not materialize {key}"
            ))
            .into());
        }
        let bytes = fs::read(&file).with_context(|| format!("read {}", file.display()))?;
        debug!(path = %key, bytes = bytes.len(), "file fetched");
        Ok(decode(&bytes))
    }

    fn close(&mut self) -> Result<()> {
        if let Some((dir, _)) = self.clone.take() {
            remove_clone(dir);
        }
        Ok(())
    }
}

impl Drop for GitReader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Full shallow clone, working tree included.
pub fn clone_into(target: &str, destination: &Path) -> Result<()> {
    Git::clone_full(target, destination)
        .map_err(|err| DeployError::source_unavailable(format!("clone {target}: {err:#}")))?;
    Ok(())
}

/// Delete a clone directory. Git leaves read-only pack files behind, so write
/// permission is restored first. Failures are logged, never returned.
fn remove_clone(dir: TempDir) {
    let path = dir.path().to_path_buf();
    for entry in WalkDir::new(&path).into_iter().filter_map(Result::ok) {
        if let Err(err) = make_writable(entry.path()) {
            debug!(path = %entry.path().display(), err = %err, "could not clear read-only bit");
        }
    }
    match dir.close() {
        Ok(()) => debug!(dir = %path.display(), "clone removed"),
        Err(err) => warn!(dir = %path.display(), err = %err, "failed to remove clone directory"),
    }
}

#[cfg(unix)]
fn make_writable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    let mode = perms.mode();
    if mode & 0o200 == 0 {
        perms.set_mode(mode | 0o200);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_writable(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
