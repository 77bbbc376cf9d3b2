//! Orchestration for `deployflow deploy`.
//!
//! A run obtains evidence (from a saved file, or by analysing the repository),
//! then prepares a workspace and drives the deployment conversation in it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::analysis::{AnalysisConfig, resolve_target, run_analysis};
use crate::core::evidence::EvidenceRecord;
use crate::core::target::repository_name;
use crate::deploy::{DeployOutcome, DeploySettings, run_deployment};
use crate::io::actions::ActionExecutor;
use crate::io::config::DeployflowConfig;
use crate::io::evidence_store::{load_evidence, save_evidence};
use crate::io::interact::Prompter;
use crate::io::oracle::Oracle;
use crate::io::repo;
use crate::workspace::{default_workspace_name, prepare_workspace};

/// Inputs to one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRequest {
    /// Repository target (directory, archive or git URL).
    pub repo: String,
    pub task: String,
    /// Skip analysis and use this evidence file.
    pub evidence_file: Option<PathBuf>,
    /// Stop after the evidence is saved.
    pub analyze_only: bool,
    /// Workspace directory; asked for when `None`.
    pub workspace: Option<PathBuf>,
    /// Where evidence files are written; the current directory when `None`.
    pub evidence_dir: Option<PathBuf>,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub evidence: EvidenceRecord,
    /// Set when the evidence came from a fresh analysis.
    pub evidence_path: Option<PathBuf>,
    /// `None` for analysis-only runs.
    pub deployment: Option<DeployOutcome>,
}

/// Run analysis and deployment for `request`.
#[instrument(skip_all, fields(repo = %request.repo, analyze_only = request.analyze_only))]
pub fn run_pipeline<O: Oracle, P: Prompter>(
    request: &DeployRequest,
    config: &DeployflowConfig,
    oracle: &O,
    prompter: &P,
) -> Result<PipelineOutcome> {
    let repo_name = repository_name(&request.repo);
    debug!(repo_name = %repo_name, "pipeline starting");

    let (evidence, evidence_path) = match &request.evidence_file {
        Some(path) => {
            println!("Using evidence from {}", path.display());
            (load_evidence(path)?, None)
        }
        None => {
            let (evidence, path) = analyze(request, &repo_name, config, oracle, prompter)?;
            (evidence, Some(path))
        }
    };

    if request.analyze_only {
        info!("analysis-only run finished");
        return Ok(PipelineOutcome {
            evidence,
            evidence_path,
            deployment: None,
        });
    }

    let workspace = match &request.workspace {
        Some(dir) => dir.clone(),
        None => PathBuf::from(prompter.ask(
            "Enter workspace directory",
            &default_workspace_name(&repo_name),
        )?),
    };
    let executor = ActionExecutor::new(&workspace, prompter)
        .with_timeout(config.limits.command_timeout())
        .with_output_limit(config.limits.command_output_limit_bytes);
    prepare_workspace(&request.repo, &workspace, &repo_name, &executor)
        .context("prepare workspace")?;

    println!("Starting deployment");
    let deployment = run_deployment(
        oracle,
        &executor,
        &evidence,
        &request.task,
        &DeploySettings::from_config(config),
    )?;
    Ok(PipelineOutcome {
        evidence,
        evidence_path,
        deployment: Some(deployment),
    })
}

fn analyze<O: Oracle, P: Prompter>(
    request: &DeployRequest,
    repo_name: &str,
    config: &DeployflowConfig,
    oracle: &O,
    prompter: &P,
) -> Result<(EvidenceRecord, PathBuf)> {
    let mut reader = repo::open(&request.repo)?;
    let outcome = run_analysis(
        reader.as_mut(),
        oracle,
        prompter,
        &request.task,
        &AnalysisConfig::from_config(config),
    );
    reader.close().context("close repository")?;
    let mut evidence = outcome?.evidence;

    resolve_target(&mut evidence, prompter)?;
    let dir = request
        .evidence_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let path = save_evidence(&dir, repo_name, &evidence, Utc::now())?;
    println!("Evidence saved to {}", path.display());
    Ok((evidence, path))
}
