//! Git adapter for the remote repository backend.
//!
//! Clones are shallow and blobless; file contents are fetched one path at a
//! time through a sparse checkout, so we keep a small, explicit wrapper around
//! `git` subprocess calls.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// One entry of `git ls-tree` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    /// `tree` and `commit` (submodule) entries are directories.
    pub is_dir: bool,
}

/// Wrapper for executing git commands in a clone directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Clone `url` into `dest` with tree metadata only and no working tree.
    #[instrument(skip_all, fields(url))]
    pub fn clone_metadata(url: &str, dest: &Path) -> Result<Self> {
        debug!(url, dest = %dest.display(), "cloning tree metadata");
        let mut args: Vec<&OsStr> = [
            "clone",
            "--no-checkout",
            "--depth",
            "1",
            "--filter=blob:none",
            "--quiet",
            url,
        ]
        .into_iter()
        .map(OsStr::new)
        .collect();
        args.push(dest.as_os_str());
        run_git(None, &args)?;
        Ok(Self::new(dest))
    }

    /// Full shallow clone of `url` into `dest`, working tree included.
    #[instrument(skip_all, fields(url))]
    pub fn clone_full(url: &str, dest: &Path) -> Result<Self> {
        debug!(url, dest = %dest.display(), "cloning repository");
        let mut args: Vec<&OsStr> = ["clone", "--depth", "1", "--quiet", url]
            .into_iter()
            .map(OsStr::new)
            .collect();
        args.push(dest.as_os_str());
        run_git(None, &args)?;
        Ok(Self::new(dest))
    }

    /// Every path reachable from `HEAD`, directories included.
    pub fn ls_tree(&self) -> Result<Vec<TreeEntry>> {
        let out = self.run_checked(&["ls-tree", "-r", "-t", "-z", "HEAD"])?;
        parse_ls_tree(&String::from_utf8_lossy(&out.stdout))
    }

    /// Look up a single path in `HEAD` without fetching its content.
    pub fn lookup(&self, path: &str) -> Result<Option<TreeEntry>> {
        let out = self.run_checked(&["ls-tree", "-z", "HEAD", "--", path])?;
        let entries = parse_ls_tree(&String::from_utf8_lossy(&out.stdout))?;
        Ok(entries.into_iter().find(|e| e.path == path))
    }

    /// Restrict the working tree to exactly `path` and materialize it.
    ///
    /// In a blobless clone this fetches the one blob on demand.
    #[instrument(skip_all, fields(path))]
    pub fn sparse_checkout(&self, path: &str) -> Result<PathBuf> {
        let info = self.workdir.join(".git").join("info");
        fs::create_dir_all(&info).with_context(|| format!("create {}", info.display()))?;
        let patterns = info.join("sparse-checkout");
        fs::write(&patterns, format!("{}\n", sparse_pattern(path)))
            .with_context(|| format!("write {}", patterns.display()))?;
        self.run_checked(&["config", "core.sparseCheckout", "true"])?;
        self.run_checked(&["read-tree", "-mu", "HEAD"])?;
        debug!(path, "sparse checkout updated");
        Ok(self.workdir.join(path))
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let args: Vec<&OsStr> = args.iter().copied().map(OsStr::new).collect();
        run_git(Some(&self.workdir), &args)
    }
}

fn run_git(workdir: Option<&Path>, args: &[&OsStr]) -> Result<Output> {
    let display = args
        .iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    let mut cmd = Command::new("git");
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_LITERAL_PATHSPECS", "1");
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .with_context(|| format!("spawn git {display}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("git {display} failed: {}", stderr.trim()));
    }
    Ok(output)
}

/// Anchored sparse-checkout pattern matching `path` literally.
///
/// Glob metacharacters and trailing spaces are backslash-escaped; the leading
/// `/` keeps `!` and `#` from being read as negation or comment.
fn sparse_pattern(path: &str) -> String {
    let body = path.trim_end_matches(' ');
    let mut pattern = String::with_capacity(path.len() + 1);
    pattern.push('/');
    for ch in body.chars() {
        if matches!(ch, '\\' | '[' | ']' | '*' | '?') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    for _ in body.len()..path.len() {
        pattern.push_str("\\ ");
    }
    pattern
}

/// Parse NUL-terminated `git ls-tree -z` records (`<mode> <type> <oid>\t<path>`).
fn parse_ls_tree(out: &str) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    for record in out.split('\0') {
        if record.is_empty() {
            continue;
        }
        let (meta, path) = record
            .split_once('\t')
            .ok_or_else(|| anyhow!("unexpected ls-tree record: '{record}'"))?;
        let kind = meta
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow!("unexpected ls-tree record: '{record}'"))?;
        entries.push(TreeEntry {
            path: path.to_string(),
            is_dir: kind != "blob",
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ls_tree_records() {
        let out = "040000 tree 1111\tapp\0100644 blob 2222\tapp/app.py\0160000 commit 3333\tvendor/lib\0";
        let entries = parse_ls_tree(out).expect("parse");
        assert_eq!(
            entries,
            vec![
                TreeEntry {
                    path: "app".to_string(),
                    is_dir: true
                },
                TreeEntry {
                    path: "app/app.py".to_string(),
                    is_dir: false
                },
                TreeEntry {
                    path: "vendor/lib".to_string(),
                    is_dir: true
                },
            ]
        );
    }

    #[test]
    fn paths_with_spaces_survive() {
        let entries = parse_ls_tree("100644 blob 2222\tdocs/read me.txt\0").expect("parse");
        assert_eq!(entries[0].path, "docs/read me.txt");
    }

    #[test]
    fn sparse_pattern_matches_literally() {
        assert_eq!(sparse_pattern("app/app.py"), "/app/app.py");
        assert_eq!(sparse_pattern("pages/[id].tsx"), r"/pages/\[id\].tsx");
        assert_eq!(sparse_pattern("src/*?.rs"), r"/src/\*\?.rs");
        assert_eq!(sparse_pattern(r"odd\name"), r"/odd\\name");
        assert_eq!(sparse_pattern("!important.md"), "/!important.md");
        assert_eq!(sparse_pattern("#notes"), "/#notes");
        assert_eq!(sparse_pattern("trailing  "), r"/trailing\ \ ");
    }

    #[test]
    fn rejects_malformed_record() {
        assert!(parse_ls_tree("garbage\0").is_err());
    }
}
