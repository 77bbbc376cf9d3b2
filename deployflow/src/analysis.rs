//! The analysis conversation: walk a repository with the oracle until it has
//! enough evidence to deploy.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::conversation::Message;
use crate::core::entries::{Entry, render};
use crate::core::evidence::{EvidenceRecord, NextTask, parse_analysis_response};
use crate::error::DeployError;
use crate::io::config::DeployflowConfig;
use crate::io::interact::Prompter;
use crate::io::oracle::{CompletionRequest, Oracle};
use crate::io::prompt::{Attachment, PromptEngine, TurnSubject};
use crate::io::repo::RepositoryReader;

/// Files read eagerly whenever they appear in a listed directory.
pub const CANONICAL_FILES: [&str; 4] = ["README", "README.md", "README.txt", "Dockerfile"];

/// Deployment target assumed when neither the oracle nor the user names one.
pub const DEFAULT_TARGET: &str = "aws";

/// Limits for one analysis pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub max_tokens: u32,
    /// Unbounded when `None`.
    pub max_turns: Option<u32>,
}

impl AnalysisConfig {
    pub fn from_config(cfg: &DeployflowConfig) -> Self {
        Self {
            max_tokens: cfg.oracle.analysis_max_tokens,
            max_turns: cfg.limits.max_analysis_turns,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from_config(&DeployflowConfig::default())
    }
}

/// Result of a completed analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub evidence: EvidenceRecord,
    /// Oracle calls made, including the final one.
    pub turns: u32,
}

/// What the next turn shows the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Subject {
    Directory(String),
    File(String),
    Question(String),
}

/// Run the analysis conversation to a terminal state.
///
/// Starts by listing the repository root. Every turn sends a fresh system and
/// user message pair; the oracle's evidence replaces the previous record
/// wholesale. Returns when the oracle chooses `deploy`; a `halt` becomes
/// [`DeployError::OracleHalted`].
#[instrument(skip_all, fields(max_turns = ?config.max_turns))]
pub fn run_analysis<O: Oracle, P: Prompter>(
    reader: &mut dyn RepositoryReader,
    oracle: &O,
    prompter: &P,
    task: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisOutcome> {
    let prompts = PromptEngine::new();
    let system = prompts.analysis_system(task)?;
    let mut evidence = EvidenceRecord::default();
    let mut subject = Subject::Directory(String::new());
    let mut turns = 0u32;

    println!("Starting analysis");
    loop {
        if let Some(limit) = config.max_turns.filter(|&limit| turns >= limit) {
            warn!(limit, "analysis turn limit reached");
            return Err(DeployError::TurnLimitExceeded {
                phase: "analysis",
                limit,
            }
            .into());
        }
        turns += 1;

        let user = render_turn(&prompts, reader, prompter, &subject, &evidence)?;
        let request = CompletionRequest {
            messages: vec![Message::system(system.as_str()), Message::user(user)],
            max_tokens: config.max_tokens,
            json_mode: true,
        };
        let raw = oracle
            .complete(&request)
            .with_context(|| format!("analysis turn {turns}"))?;
        let response = parse_analysis_response(&raw)?;
        evidence = response.evidences;
        if !response.summary.trim().is_empty() {
            println!("{}", response.summary.trim());
        }
        debug!(turn = turns, next = ?response.next_task, "analysis turn complete");

        subject = match response.next_task {
            NextTask::ReadDir { target } => Subject::Directory(target),
            NextTask::ReadFile { target } => Subject::File(target),
            NextTask::Ask { question } => Subject::Question(question),
            NextTask::Deploy => {
                info!(turns, "analysis complete");
                return Ok(AnalysisOutcome { evidence, turns });
            }
            NextTask::Halt { error } => {
                warn!(error = %error, "oracle halted analysis");
                return Err(DeployError::OracleHalted(error).into());
            }
        };
    }
}

/// Fill in the deployment target after analysis: ask when it is missing, then
/// lowercase it.
pub fn resolve_target<P: Prompter>(evidence: &mut EvidenceRecord, prompter: &P) -> Result<()> {
    let target = match evidence.target() {
        Some(target) => target.to_string(),
        None => prompter.ask("Enter deployment target", DEFAULT_TARGET)?,
    };
    let target = Some(target.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());
    debug!(target = %target, "deployment target resolved");
    evidence.set_target(target);
    Ok(())
}

fn render_turn<P: Prompter>(
    prompts: &PromptEngine,
    reader: &mut dyn RepositoryReader,
    prompter: &P,
    subject: &Subject,
    evidence: &EvidenceRecord,
) -> Result<String> {
    let evidence_json = evidence.to_pretty_json();
    match subject {
        Subject::Directory(path) => {
            let entries = reader
                .list(path)
                .with_context(|| format!("list directory '{path}'"))?;
            let listing = render(&entries);
            println!(
                "  reading directory {} -> {listing:?}",
                if path.is_empty() { "/" } else { path }
            );
            let attachments = read_canonical(reader, &entries);
            prompts.analysis_turn(
                TurnSubject::Directory {
                    path,
                    listing: &listing,
                    attachments: &attachments,
                },
                &evidence_json,
            )
        }
        Subject::File(path) => {
            let content = reader
                .read(path)
                .with_context(|| format!("read file '{path}'"))?;
            println!("  reading file {path} -> {} bytes", content.len());
            prompts.analysis_turn(
                TurnSubject::File {
                    path,
                    content: &content,
                },
                &evidence_json,
            )
        }
        Subject::Question(question) => {
            debug!(question = %question, "oracle asked a question");
            let answer = prompter.ask(&format!("AI: {question}"), "")?;
            prompts.analysis_turn(
                TurnSubject::Answer {
                    question,
                    answer: &answer,
                },
                &evidence_json,
            )
        }
    }
}

fn read_canonical(reader: &mut dyn RepositoryReader, entries: &[Entry]) -> Vec<Attachment> {
    let mut attachments = Vec::new();
    for entry in entries {
        if entry.is_dir || !CANONICAL_FILES.contains(&entry.name()) {
            continue;
        }
        match reader.read(&entry.path) {
            Ok(content) => attachments.push(Attachment {
                name: entry.path.clone(),
                content,
            }),
            Err(err) => warn!(path = %entry.path, err = %format!("{err:#}"), "skipping canonical file"),
        }
    }
    attachments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedOracle, ScriptedPrompter};
    use serde_json::json;

    #[test]
    fn resolve_target_lowercases_existing() {
        let mut evidence = EvidenceRecord {
            target: Some("AWS".to_string()),
            ..EvidenceRecord::default()
        };
        let prompter = ScriptedPrompter::new();
        resolve_target(&mut evidence, &prompter).expect("resolve");
        assert_eq!(evidence.target.as_deref(), Some("aws"));
        assert!(prompter.questions().is_empty());
    }

    #[test]
    fn resolve_target_asks_when_missing() {
        let mut evidence = EvidenceRecord::default();
        let prompter = ScriptedPrompter::new().with_answers(["GCP"]);
        resolve_target(&mut evidence, &prompter).expect("resolve");
        assert_eq!(evidence.target.as_deref(), Some("gcp"));

        let mut evidence = EvidenceRecord::default();
        let prompter = ScriptedPrompter::new();
        resolve_target(&mut evidence, &prompter).expect("resolve");
        assert_eq!(evidence.target.as_deref(), Some("aws"));
    }

    #[test]
    fn resolve_target_replaces_unusable_target() {
        let mut evidence: EvidenceRecord =
            serde_json::from_value(json!({"target": ["aws", "gcp"]})).expect("parse");
        let prompter = ScriptedPrompter::new().with_answers(["Azure"]);
        resolve_target(&mut evidence, &prompter).expect("resolve");
        assert_eq!(evidence.target.as_deref(), Some("azure"));
        assert!(!evidence.extra.contains_key("target"));
    }

    #[test]
    fn turn_limit_stops_a_wandering_oracle() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "a").expect("write");
        let mut reader = crate::io::repo::open(dir.path().to_str().expect("utf8")).expect("open");
        let wander = json!({
            "evidences": {},
            "next_task": {"mode": "read_dir", "target": ""},
            "summary": "looking around"
        })
        .to_string();
        let oracle = ScriptedOracle::new([wander.clone(), wander.clone(), wander]);
        let config = AnalysisConfig {
            max_tokens: 750,
            max_turns: Some(2),
        };

        let err = run_analysis(reader.as_mut(), &oracle, &ScriptedPrompter::new(), "", &config)
            .unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DeployError::TurnLimitExceeded { limit: 2, .. })
        ));
        assert_eq!(oracle.requests().len(), 2);
    }

    #[test]
    fn ask_embeds_answer_in_next_turn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut reader = crate::io::repo::open(dir.path().to_str().expect("utf8")).expect("open");
        let oracle = ScriptedOracle::new([
            json!({
                "evidences": {},
                "next_task": {"mode": "ask", "question": "Which port?"},
                "summary": "need a port"
            })
            .to_string(),
            json!({
                "evidences": {"ports": [8080]},
                "next_task": {"mode": "deploy"},
                "summary": "done"
            })
            .to_string(),
        ]);
        let prompter = ScriptedPrompter::new().with_answers(["8080"]);

        let outcome = run_analysis(
            reader.as_mut(),
            &oracle,
            &prompter,
            "",
            &AnalysisConfig::default(),
        )
        .expect("analysis");
        assert!(outcome.evidence.has_port(8080));
        let requests = oracle.requests();
        let second_user = &requests[1].messages[1].content;
        assert!(second_user.contains("\"Which port?\""));
        assert!(second_user.contains("\"8080\""));
        assert!(requests.iter().all(|r| r.json_mode && r.messages.len() == 2));
    }

    #[test]
    fn halt_is_oracle_halted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut reader = crate::io::repo::open(dir.path().to_str().expect("utf8")).expect("open");
        let oracle = ScriptedOracle::new([json!({
            "evidences": {},
            "next_task": {"mode": "halt", "error": "nothing to deploy"},
            "summary": "empty repository"
        })
        .to_string()]);

        let err = run_analysis(
            reader.as_mut(),
            &oracle,
            &ScriptedPrompter::new(),
            "",
            &AnalysisConfig::default(),
        )
        .unwrap_err();
        match crate::error::classify(&err) {
            Some(DeployError::OracleHalted(msg)) => assert_eq!(msg, "nothing to deploy"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
