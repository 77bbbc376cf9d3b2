use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use super::{RepositoryReader, closed_error, decode, file_key};
use crate::core::entries::{Entry, dir_prefix, immediate_children};
use crate::core::target::TargetKind;
use crate::error::DeployError;

/// Local directory. Every call goes straight to the filesystem.
#[derive(Debug)]
pub struct DirReader {
    root: PathBuf,
    closed: bool,
}

impl DirReader {
    pub fn open(target: &str) -> Result<Self> {
        let root = PathBuf::from(target);
        if !root.is_dir() {
            return Err(DeployError::NotFound(target.to_string()).into());
        }
        Ok(Self {
            root,
            closed: false,
        })
    }
}

impl RepositoryReader for DirReader {
    fn kind(&self) -> TargetKind {
        TargetKind::Directory
    }

    fn list(&self, subdir: &str) -> Result<Vec<Entry>> {
        if self.closed {
            return Err(closed_error(&self.root.display().to_string()));
        }
        let prefix = dir_prefix(subdir);
        let dir = self.root.join(&prefix);
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Err(DeployError::NotFound(prefix).into());
            }
            Err(err) => return Err(err).with_context(|| format!("list {}", dir.display())),
        };

        let mut members = Vec::new();
        for item in read {
            let item = item.with_context(|| format!("list {}", dir.display()))?;
            let name = item.file_name().to_string_lossy().into_owned();
            // Follows symlinks so a linked directory lists as a directory.
            let is_dir = item.path().is_dir();
            members.push((format!("{prefix}{name}"), is_dir));
        }
        debug!(subdir = %prefix, count = members.len(), "listed directory");
        Ok(immediate_children(members, &prefix))
    }

    fn read(&mut self, path: &str) -> Result<String> {
        if self.closed {
            return Err(closed_error(&self.root.display().to_string()));
        }
        let key = file_key(path);
        let full = self.root.join(&key);
        if key.is_empty() || !full.is_file() {
            return Err(DeployError::NotFound(key).into());
        }
        let bytes = fs::read(&full).with_context(|| format!("read {}", full.display()))?;
        Ok(decode(&bytes))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
