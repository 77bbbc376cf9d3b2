use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

use super::{RepositoryReader, closed_error, decode, file_key, load_bytes};
use crate::core::entries::{Entry, clean_member, dir_prefix, has_prefix, immediate_children};
use crate::core::target::TargetKind;
use crate::error::DeployError;

/// Zip archive held entirely in memory.
pub struct ZipReader {
    target: String,
    archive: Option<zip::ZipArchive<Cursor<Vec<u8>>>>,
}

impl ZipReader {
    pub fn open(target: &str) -> Result<Self> {
        let bytes = load_bytes(target)?;
        Self::from_bytes(target, bytes)
    }

    pub fn from_bytes(target: &str, bytes: Vec<u8>) -> Result<Self> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|err| DeployError::source_unavailable(format!("open zip {target}: {err}")))?;
        debug!(target, members = archive.len(), "zip opened");
        Ok(Self {
            target: target.to_string(),
            archive: Some(archive),
        })
    }
}

impl RepositoryReader for ZipReader {
    fn kind(&self) -> TargetKind {
        TargetKind::Zip
    }

    fn list(&self, subdir: &str) -> Result<Vec<Entry>> {
        let archive = self
            .archive
            .as_ref()
            .ok_or_else(|| closed_error(&self.target))?;
        // Zip marks directory members with a trailing `/`; clean_member reads it.
        let names: Vec<&str> = archive.file_names().collect();
        if !has_prefix(names.iter().map(|n| (*n, false)), subdir) {
            return Err(DeployError::NotFound(dir_prefix(subdir)).into());
        }
        Ok(immediate_children(names.into_iter().map(|n| (n, false)), subdir))
    }

    fn read(&mut self, path: &str) -> Result<String> {
        let archive = self
            .archive
            .as_mut()
            .ok_or_else(|| closed_error(&self.target))?;
        let key = file_key(path);
        let name = archive
            .file_names()
            .find(|name| {
                let (cleaned, is_dir) = clean_member(name);
                !is_dir && cleaned == key
            })
            .map(str::to_string)
            .ok_or_else(|| DeployError::NotFound(key.clone()))?;

        let mut file = match archive.by_name(&name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(DeployError::NotFound(key).into()),
            Err(err) => {
                return Err(DeployError::source_unavailable(format!("zip member {key}: {err}")).into());
            }
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|err| DeployError::source_unavailable(format!("zip member {key}: {err}")))?;
        Ok(decode(&bytes))
    }

    fn close(&mut self) -> Result<()> {
        if self.archive.take().is_some() {
            debug!(target = %self.target, "zip released");
        }
        Ok(())
    }
}

impl Drop for ZipReader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Unpack a whole zip archive into `destination`.
pub fn extract(bytes: &[u8], destination: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| DeployError::source_unavailable(format!("open zip: {err}")))?;
    archive
        .extract(destination)
        .map_err(|err| DeployError::source_unavailable(format!("extract zip: {err}")))?;
    Ok(())
}

/// Pack every file under `src_dir` into a new zip at `dest_zip`, paths
/// relative to `src_dir`.
#[instrument(skip_all, fields(src = %src_dir.display()))]
pub fn archive_dir(src_dir: &Path, dest_zip: &Path) -> Result<()> {
    let file =
        File::create(dest_zip).with_context(|| format!("create {}", dest_zip.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let mut files = 0usize;

    for entry in WalkDir::new(src_dir).follow_links(false).min_depth(1) {
        let entry = entry.with_context(|| format!("walk {}", src_dir.display()))?;
        let path = entry.path();
        if path == dest_zip {
            continue;
        }
        let rel = path.strip_prefix(src_dir).unwrap_or(path);
        let name = rel.to_string_lossy().replace('\\', "/");
        if entry.file_type().is_dir() {
            zip.add_directory(name, options)
                .with_context(|| format!("add directory {}", rel.display()))?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        zip.start_file(name, options)
            .with_context(|| format!("add file {}", rel.display()))?;
        let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        io::copy(&mut f, &mut zip).with_context(|| format!("compress {}", path.display()))?;
        files += 1;
    }

    zip.finish().context("finish zip")?;
    debug!(files, dest = %dest_zip.display(), "directory archived");
    Ok(())
}

/// Copy a local zip (or download a remote one) to `dest`.
pub fn copy_archive(target: &str, dest: &Path) -> Result<()> {
    let bytes = load_bytes(target)?;
    fs::write(dest, bytes).with_context(|| format!("write {}", dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build(members: &[(&str, Option<&str>)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in members {
            match content {
                Some(text) => {
                    zip.start_file(*name, options).expect("start");
                    zip.write_all(text.as_bytes()).expect("write");
                }
                None => zip.add_directory(*name, options).expect("dir"),
            }
        }
        zip.finish().expect("finish").into_inner()
    }

    #[test]
    fn infers_directories_without_directory_members() {
        let bytes = build(&[("README.md", Some("hi")), ("app/src/main.py", Some("x"))]);
        let reader = ZipReader::from_bytes("mem.zip", bytes).expect("open");
        assert_eq!(
            reader.list("").expect("list"),
            vec![Entry::file("README.md"), Entry::dir("app")]
        );
        assert_eq!(reader.list("app").expect("list"), vec![Entry::dir("app/src")]);
    }

    #[test]
    fn reads_member_and_rejects_directory() {
        let bytes = build(&[("docs/", None), ("docs/a.txt", Some("alpha"))]);
        let mut reader = ZipReader::from_bytes("mem.zip", bytes).expect("open");
        assert_eq!(reader.read("docs/a.txt").expect("read"), "alpha");
        let err = reader.read("docs").unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DeployError::NotFound(_))
        ));
    }

    #[test]
    fn corrupt_bytes_are_source_unavailable() {
        let err = ZipReader::from_bytes("bad.zip", b"not a zip".to_vec())
            .err()
            .expect("error");
        assert!(matches!(
            crate::error::classify(&err),
            Some(DeployError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn close_is_idempotent_and_blocks_reads() {
        let bytes = build(&[("a.txt", Some("a"))]);
        let mut reader = ZipReader::from_bytes("mem.zip", bytes).expect("open");
        reader.close().expect("close");
        reader.close().expect("close again");
        assert!(reader.read("a.txt").is_err());
    }

    #[test]
    fn archive_dir_round_trips_through_reader() {
        let src = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(src.path().join("app")).expect("mkdir");
        fs::write(src.path().join("app/app.py"), "print(1)").expect("write");
        let out = tempfile::tempdir().expect("tempdir");
        let dest = out.path().join("src.zip");

        archive_dir(src.path(), &dest).expect("archive");
        let mut reader = ZipReader::open(dest.to_str().expect("utf8")).expect("open");
        assert_eq!(reader.list("").expect("list"), vec![Entry::dir("app")]);
        assert_eq!(reader.read("app/app.py").expect("read"), "print(1)");
    }
}
