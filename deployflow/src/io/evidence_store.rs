//! Evidence files: the persisted result of an analysis pass.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::evidence::EvidenceRecord;
use crate::core::target::sanitize_name;

/// `evidences_<repo>_<YYYYmmddHHMMSS>.json`, with the repository name reduced
/// to ASCII alphanumerics.
pub fn evidence_file_name(repo_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "evidences_{}_{}.json",
        sanitize_name(repo_name),
        at.format("%Y%m%d%H%M%S")
    )
}

/// Write `record` as pretty JSON into `dir` and return the file path.
pub fn save_evidence(
    dir: &Path,
    repo_name: &str,
    record: &EvidenceRecord,
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let path = dir.join(evidence_file_name(repo_name, at));
    let mut buf = serde_json::to_string_pretty(record).context("serialize evidence")?;
    buf.push('\n');
    fs::write(&path, buf).with_context(|| format!("write evidence {}", path.display()))?;
    info!(path = %path.display(), "evidence saved");
    Ok(path)
}

/// Load a previously saved record verbatim.
pub fn load_evidence(path: &Path) -> Result<EvidenceRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read evidence {}", path.display()))?;
    let record: EvidenceRecord = serde_json::from_str(&contents)
        .with_context(|| format!("parse evidence {}", path.display()))?;
    debug!(path = %path.display(), "evidence loaded");
    Ok(record)
}
