//! Deployment workspace preparation.
//!
//! Before the deployment conversation starts, the workspace holds the
//! repository packed as `src.zip` and an SSH key pair that the provisioning
//! configuration can install on the new server.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::target::{self, TargetKind};
use crate::error::DeployError;
use crate::io::actions::ActionExecutor;
use crate::io::repo;

/// Canonical artifact paths within a deployment workspace.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub source_dir: PathBuf,
    pub source_zip: PathBuf,
    pub private_key: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            source_dir: root.join("src"),
            source_zip: root.join("src.zip"),
            private_key: root.join("id_rsa"),
            root,
        }
    }
}

/// Default workspace directory for a repository name.
pub fn default_workspace_name(repo_name: &str) -> String {
    format!("{}_deploy", target::sanitize_name(repo_name))
}

/// Create the workspace, pack the repository into `src.zip` and generate the
/// key pair.
///
/// Key generation runs through `executor`, so each command passes the
/// confirmation gate. It is skipped when `id_rsa` already exists; a failing
/// key command is logged and does not stop preparation.
#[instrument(skip_all, fields(target, workspace = %workspace.display()))]
pub fn prepare_workspace(
    target: &str,
    workspace: &Path,
    repo_name: &str,
    executor: &ActionExecutor<'_>,
) -> Result<WorkspacePaths> {
    let kind = target::classify(target)?;
    fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    if kind == TargetKind::Directory {
        ensure_not_nested(Path::new(target), workspace)?;
    }

    let paths = WorkspacePaths::new(workspace);
    println!("Preparing workspace {}", workspace.display());
    if kind == TargetKind::Zip {
        repo::copy_archive(target, &paths.source_zip)?;
    } else {
        repo::materialize(target, &paths.source_dir)?;
        repo::archive_dir(&paths.source_dir, &paths.source_zip)?;
        fs::remove_dir_all(&paths.source_dir)
            .with_context(|| format!("remove {}", paths.source_dir.display()))?;
    }
    info!(zip = %paths.source_zip.display(), "source archive ready");

    generate_key_pair(&paths, repo_name, executor)?;
    Ok(paths)
}

fn generate_key_pair(
    paths: &WorkspacePaths,
    repo_name: &str,
    executor: &ActionExecutor<'_>,
) -> Result<()> {
    if paths.private_key.exists() {
        debug!(key = %paths.private_key.display(), "key pair already present");
        return Ok(());
    }
    let commands = [
        format!("ssh-keygen -t rsa -b 4096 -C \"{repo_name}\" -f id_rsa -N \"\""),
        "chmod 400 id_rsa".to_string(),
    ];
    for command in &commands {
        let result = executor.execute_command(command)?;
        if !result.success() {
            warn!(command = %command, stderr = %result.stderr, "key generation step failed");
            return Ok(());
        }
    }
    info!("ssh key pair generated");
    Ok(())
}

/// Copying a directory into itself (or a parent into a child) never ends.
fn ensure_not_nested(source: &Path, workspace: &Path) -> Result<()> {
    let source = source
        .canonicalize()
        .with_context(|| format!("resolve {}", source.display()))?;
    let workspace = workspace
        .canonicalize()
        .with_context(|| format!("resolve {}", workspace.display()))?;
    if workspace.starts_with(&source) || source.starts_with(&workspace) {
        return Err(DeployError::WorkspaceConflict(format!(
            "workspace {} and repository {} contain each other",
            workspace.display(),
            source.display()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::test_support::{ScriptedPrompter, write_fixture_dir, zip_fixture};

    fn zip_names(path: &Path) -> Vec<String> {
        let file = fs::File::open(path).expect("open zip");
        let archive = zip::ZipArchive::new(file).expect("zip");
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn default_name_is_sanitized() {
        assert_eq!(default_workspace_name("hello-world.git"), "helloworldgit_deploy");
    }

    #[test]
    fn directory_target_is_archived_and_source_removed() {
        let repo_dir = tempfile::tempdir().expect("tempdir");
        write_fixture_dir(repo_dir.path());
        let scratch = tempfile::tempdir().expect("tempdir");
        let workspace = scratch.path().join("demo_deploy");
        fs::create_dir_all(&workspace).expect("mkdir");
        fs::write(workspace.join("id_rsa"), "key").expect("key");

        let prompter = ScriptedPrompter::new();
        let executor = ActionExecutor::new(&workspace, &prompter);
        let paths = prepare_workspace(
            repo_dir.path().to_str().expect("utf8"),
            &workspace,
            "demo",
            &executor,
        )
        .expect("prepare");

        assert!(!paths.source_dir.exists());
        let names = zip_names(&paths.source_zip);
        assert!(names.contains(&"README.md".to_string()));
        assert!(names.contains(&"app/app.py".to_string()));
        assert!(prompter.questions().is_empty());
    }

    #[test]
    fn zip_target_is_copied_verbatim() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let archive = scratch.path().join("repo.zip");
        zip_fixture(&archive);
        let workspace = scratch.path().join("ws");
        fs::create_dir_all(&workspace).expect("mkdir");
        fs::write(workspace.join("id_rsa"), "key").expect("key");

        let prompter = ScriptedPrompter::new();
        let executor = ActionExecutor::new(&workspace, &prompter);
        let paths = prepare_workspace(archive.to_str().expect("utf8"), &workspace, "repo", &executor)
            .expect("prepare");

        let mut copied = Vec::new();
        fs::File::open(&paths.source_zip)
            .expect("open")
            .read_to_end(&mut copied)
            .expect("read");
        assert_eq!(copied, fs::read(&archive).expect("read"));
    }

    #[test]
    fn workspace_inside_repository_is_conflict() {
        let repo_dir = tempfile::tempdir().expect("tempdir");
        write_fixture_dir(repo_dir.path());
        let workspace = repo_dir.path().join("demo_deploy");

        let prompter = ScriptedPrompter::new();
        let executor = ActionExecutor::new(&workspace, &prompter);
        let err = prepare_workspace(
            repo_dir.path().to_str().expect("utf8"),
            &workspace,
            "demo",
            &executor,
        )
        .unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DeployError::WorkspaceConflict(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn declining_key_generation_aborts() {
        let repo_dir = tempfile::tempdir().expect("tempdir");
        write_fixture_dir(repo_dir.path());
        let scratch = tempfile::tempdir().expect("tempdir");
        let workspace = scratch.path().join("ws");

        let prompter = ScriptedPrompter::new().with_confirms([false]);
        let executor = ActionExecutor::new(&workspace, &prompter);
        let err = prepare_workspace(
            repo_dir.path().to_str().expect("utf8"),
            &workspace,
            "demo",
            &executor,
        )
        .unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DeployError::UserAborted(_))
        ));
        assert!(prompter.questions()[0].contains("ssh-keygen"));
    }
}
