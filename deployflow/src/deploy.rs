//! The deployment conversation: two bootstrap stages that must each produce a
//! named file, then open-ended actions until the oracle signals an outcome.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::conversation::Conversation;
use crate::core::evidence::EvidenceRecord;
use crate::core::reply::{FileWrite, Reply, Terminal, parse_reply};
use crate::error::DeployError;
use crate::io::actions::ActionExecutor;
use crate::io::config::{DeployConfig, DeployflowConfig};
use crate::io::oracle::{CompletionRequest, Oracle};
use crate::io::prompt::PromptEngine;

/// Sent when a reply in the open stage contained nothing to act on.
const NUDGE: &str = "Your reply contained no file block, no shell block and no completion or error marker. \
Continue with the next step using one of the formats from the instructions.";

/// Settings for one deployment conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySettings {
    pub max_tokens: u32,
    /// Unbounded when `None`.
    pub max_turns: Option<u32>,
    pub deploy: DeployConfig,
}

impl DeploySettings {
    pub fn from_config(cfg: &DeployflowConfig) -> Self {
        Self {
            max_tokens: cfg.oracle.deployment_max_tokens,
            max_turns: cfg.limits.max_deployment_turns,
            deploy: cfg.deploy.clone(),
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self::from_config(&DeployflowConfig::default())
    }
}

/// Conversation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the provisioning configuration.
    ProvisioningConfig,
    /// Waiting for the automation script.
    AutomationScript,
    /// Free-form file writes and commands.
    OpenAction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ProvisioningConfig => "provisioning-config",
            Stage::AutomationScript => "automation-script",
            Stage::OpenAction => "open-action",
        };
        f.write_str(name)
    }
}

/// A finished deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    /// The oracle's completion reply: address, summary and access instructions.
    pub instructions: String,
    /// Oracle calls made, including the final one.
    pub turns: u32,
}

/// Drive the deployment conversation to a terminal state.
///
/// Every oracle reply is appended as an assistant message and every result
/// as a user message. A success marker in the open stage returns the reply;
/// a failure marker in any stage becomes [`DeployError::OracleHalted`].
#[instrument(skip_all, fields(max_turns = ?settings.max_turns))]
pub fn run_deployment<O: Oracle>(
    oracle: &O,
    executor: &ActionExecutor<'_>,
    evidence: &EvidenceRecord,
    task: &str,
    settings: &DeploySettings,
) -> Result<DeployOutcome> {
    let prompts = PromptEngine::new();
    let files = &settings.deploy;
    let mut conversation =
        Conversation::with_system(prompts.deploy_system(&evidence.to_pretty_json(), task, files)?);
    conversation.push_user(prompts.deploy_stage_config(files)?);

    let mut stage = Stage::ProvisioningConfig;
    let mut turns = 0u32;

    loop {
        if let Some(limit) = settings.max_turns.filter(|&limit| turns >= limit) {
            warn!(limit, %stage, "deployment turn limit reached");
            return Err(DeployError::TurnLimitExceeded {
                phase: "deployment",
                limit,
            }
            .into());
        }
        turns += 1;

        let request = CompletionRequest {
            messages: conversation.messages().to_vec(),
            max_tokens: settings.max_tokens,
            json_mode: false,
        };
        let raw = oracle
            .complete(&request)
            .with_context(|| format!("deployment turn {turns} ({stage})"))?;
        let text = raw.trim();
        if text.is_empty() {
            return Err(DeployError::protocol(format!("empty reply in {stage} stage")).into());
        }
        conversation.push_assistant(text);

        let reply = parse_reply(text);
        if reply.conflicting_markers {
            warn!(%stage, "reply carries both markers, treating as completion");
        }
        if reply.ignored_blocks > 0 {
            warn!(%stage, ignored = reply.ignored_blocks, "extra action blocks ignored");
        }
        debug!(turn = turns, %stage, has_action = reply.has_action(), "deployment reply parsed");

        match stage {
            Stage::ProvisioningConfig => {
                halt_on_failure(&reply)?;
                let write = require_file(&reply, &files.config_file)?;
                executor.write_file(&write.name, &write.content)?;
                show_summary(&reply);

                let init = executor.execute_command(&files.init_command)?;
                if !init.success() {
                    warn!(command = %files.init_command, "init command failed, reporting to oracle");
                }
                conversation.push_user(format!(
                    "{}\n\n{}",
                    init.feedback(),
                    prompts.deploy_stage_script(files)?
                ));
                stage = Stage::AutomationScript;
            }
            Stage::AutomationScript => {
                halt_on_failure(&reply)?;
                let write = require_file(&reply, &files.script_file)?;
                executor.write_file(&write.name, &write.content)?;
                show_summary(&reply);
                conversation.push_user(format!("created file `{}`", write.name));
                stage = Stage::OpenAction;
            }
            Stage::OpenAction => {
                match &reply.terminal {
                    Some(Terminal::Success(instructions)) => {
                        println!("\n{instructions}");
                        info!(turns, "deployment complete");
                        return Ok(DeployOutcome {
                            instructions: instructions.clone(),
                            turns,
                        });
                    }
                    Some(Terminal::Failure(report)) => {
                        println!("\n{report}");
                        return Err(DeployError::OracleHalted(report.clone()).into());
                    }
                    None => {}
                }
                show_summary(&reply);

                let mut results = Vec::new();
                if let Some(write) = &reply.file_write {
                    executor.write_file(&write.name, &write.content)?;
                    results.push(format!("created file `{}`", write.name));
                }
                if let Some(command) = &reply.shell_command {
                    results.push(executor.execute_command(command)?.feedback());
                }
                if results.is_empty() {
                    println!("The assistant did not give an actionable response.");
                    conversation.push_user(NUDGE);
                } else {
                    conversation.push_user(results.join("\n\n"));
                }
            }
        }
    }
}

fn halt_on_failure(reply: &Reply) -> Result<(), DeployError> {
    match &reply.terminal {
        Some(Terminal::Failure(report)) => {
            println!("\n{report}");
            Err(DeployError::OracleHalted(report.clone()))
        }
        _ => Ok(()),
    }
}

/// The bootstrap stages accept exactly one file name.
fn require_file<'r>(reply: &'r Reply, expected: &str) -> Result<&'r FileWrite, DeployError> {
    match &reply.file_write {
        Some(write) if write.name == expected => Ok(write),
        Some(write) => Err(DeployError::protocol(format!(
            "expected file '{expected}', got '{}'",
            write.name
        ))),
        None => Err(DeployError::protocol(format!(
            "reply did not provide file '{expected}'"
        ))),
    }
}

fn show_summary(reply: &Reply) {
    if !reply.summary.is_empty() {
        println!("\n{}", reply.summary);
    }
}
