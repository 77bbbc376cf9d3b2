use std::io::Read;
use std::path::Path;

use anyhow::Result;
use flate2::read::GzDecoder;
use tracing::debug;

use super::{RepositoryReader, closed_error, decode, file_key, load_bytes};
use crate::core::entries::{Entry, clean_member, dir_prefix, has_prefix, immediate_children};
use crate::core::target::{TargetKind, is_gzip};
use crate::error::DeployError;

/// Tar archive (plain or gzip) held in memory.
///
/// Tar has no trailing-separator convention, so member kinds come from the
/// headers and are indexed once on open. Reads rescan the buffer.
pub struct TarReader {
    target: String,
    gzip: bool,
    bytes: Option<Vec<u8>>,
    members: Vec<(String, bool)>,
}

impl TarReader {
    pub fn open(target: &str) -> Result<Self> {
        let bytes = load_bytes(target)?;
        Self::from_bytes(target, bytes, is_gzip(target))
    }

    pub fn from_bytes(target: &str, bytes: Vec<u8>, gzip: bool) -> Result<Self> {
        let members = index_members(&bytes, gzip)
            .map_err(|err| DeployError::source_unavailable(format!("open tar {target}: {err}")))?;
        debug!(target, members = members.len(), gzip, "tar opened");
        Ok(Self {
            target: target.to_string(),
            gzip,
            bytes: Some(bytes),
            members,
        })
    }
}

impl RepositoryReader for TarReader {
    fn kind(&self) -> TargetKind {
        TargetKind::Tar
    }

    fn list(&self, subdir: &str) -> Result<Vec<Entry>> {
        if self.bytes.is_none() {
            return Err(closed_error(&self.target));
        }
        if !has_prefix(self.members.iter().map(|(name, is_dir)| (name, *is_dir)), subdir) {
            return Err(DeployError::NotFound(dir_prefix(subdir)).into());
        }
        Ok(immediate_children(
            self.members.iter().map(|(name, is_dir)| (name, *is_dir)),
            subdir,
        ))
    }

    fn read(&mut self, path: &str) -> Result<String> {
        let bytes = self.bytes.as_ref().ok_or_else(|| closed_error(&self.target))?;
        let key = file_key(path);
        let mut archive = tar::Archive::new(decoder(bytes, self.gzip));
        let entries = archive
            .entries()
            .map_err(|err| DeployError::source_unavailable(format!("scan tar: {err}")))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|err| DeployError::source_unavailable(format!("scan tar: {err}")))?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let name = entry
                .path()
                .map(|p| p.to_string_lossy().into_owned())
                .map_err(|err| DeployError::source_unavailable(format!("scan tar: {err}")))?;
            if clean_member(&name).0 != key {
                continue;
            }
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|err| DeployError::source_unavailable(format!("tar member {key}: {err}")))?;
            return Ok(decode(&content));
        }
        Err(DeployError::NotFound(key).into())
    }

    fn close(&mut self) -> Result<()> {
        if self.bytes.take().is_some() {
            self.members.clear();
            debug!(target = %self.target, "tar released");
        }
        Ok(())
    }
}

impl Drop for TarReader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Unpack a whole tar archive into `destination`.
pub fn extract(bytes: Vec<u8>, gzip: bool, destination: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(decoder(&bytes, gzip));
    archive
        .unpack(destination)
        .map_err(|err| DeployError::source_unavailable(format!("extract tar: {err}")))?;
    Ok(())
}

fn decoder(bytes: &[u8], gzip: bool) -> Box<dyn Read + '_> {
    if gzip {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    }
}

fn index_members(bytes: &[u8], gzip: bool) -> std::io::Result<Vec<(String, bool)>> {
    let mut archive = tar::Archive::new(decoder(bytes, gzip));
    let mut members = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let is_dir = entry.header().entry_type().is_dir();
        let name = entry.path()?.to_string_lossy().into_owned();
        members.push((name, is_dir));
    }
    Ok(members)
}
