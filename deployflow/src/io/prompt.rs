//! Prompt rendering for both conversations.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::io::config::DeployConfig;

const ANALYSIS_SYSTEM_TEMPLATE: &str = include_str!("prompts/analysis_system.md");
const ANALYSIS_TURN_TEMPLATE: &str = include_str!("prompts/analysis_turn.md");
const DEPLOY_SYSTEM_TEMPLATE: &str = include_str!("prompts/deploy_system.md");
const DEPLOY_STAGE_CONFIG_TEMPLATE: &str = include_str!("prompts/deploy_stage_config.md");
const DEPLOY_STAGE_SCRIPT_TEMPLATE: &str = include_str!("prompts/deploy_stage_script.md");

/// A file attached to a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

/// What one analysis turn shows the oracle.
#[derive(Debug, Clone, Copy)]
pub enum TurnSubject<'a> {
    Directory {
        path: &'a str,
        listing: &'a [String],
        attachments: &'a [Attachment],
    },
    File {
        path: &'a str,
        content: &'a str,
    },
    Answer {
        question: &'a str,
        answer: &'a str,
    },
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("analysis_system", ANALYSIS_SYSTEM_TEMPLATE)
            .expect("analysis_system template should be valid");
        env.add_template("analysis_turn", ANALYSIS_TURN_TEMPLATE)
            .expect("analysis_turn template should be valid");
        env.add_template("deploy_system", DEPLOY_SYSTEM_TEMPLATE)
            .expect("deploy_system template should be valid");
        env.add_template("deploy_stage_config", DEPLOY_STAGE_CONFIG_TEMPLATE)
            .expect("deploy_stage_config template should be valid");
        env.add_template("deploy_stage_script", DEPLOY_STAGE_SCRIPT_TEMPLATE)
            .expect("deploy_stage_script template should be valid");
        Self { env }
    }

    /// Analysis instructions plus the user's task, when one was given.
    pub fn analysis_system(&self, task: &str) -> Result<String> {
        let template = self.env.get_template("analysis_system")?;
        let task = Some(task.trim()).filter(|t| !t.is_empty());
        Ok(template.render(context! { task => task })?)
    }

    /// The user message for one analysis turn.
    pub fn analysis_turn(&self, subject: TurnSubject<'_>, evidence_json: &str) -> Result<String> {
        let template = self.env.get_template("analysis_turn")?;
        let rendered = match subject {
            TurnSubject::Directory {
                path,
                listing,
                attachments,
            } => {
                let listing = serde_json::to_string(listing).context("serialize listing")?;
                template.render(context! {
                    directory => path,
                    listing => Some(listing),
                    attachments => attachments,
                    file_content => None::<&str>,
                    evidence => evidence_json,
                })?
            }
            TurnSubject::File { path, content } => template.render(context! {
                listing => None::<&str>,
                file_name => path,
                file_content => Some(content),
                evidence => evidence_json,
            })?,
            TurnSubject::Answer { question, answer } => template.render(context! {
                listing => None::<&str>,
                file_content => None::<&str>,
                question => question,
                answer => answer,
                evidence => evidence_json,
            })?,
        };
        Ok(rendered)
    }

    /// Deployment rules with the evidence and task embedded.
    pub fn deploy_system(
        &self,
        evidence_json: &str,
        task: &str,
        deploy: &DeployConfig,
    ) -> Result<String> {
        let template = self.env.get_template("deploy_system")?;
        Ok(template.render(context! {
            evidence => evidence_json,
            task => task.trim(),
            config_file => deploy.config_file,
            script_file => deploy.script_file,
        })?)
    }

    /// First bootstrap stage: the provisioning configuration.
    pub fn deploy_stage_config(&self, deploy: &DeployConfig) -> Result<String> {
        let template = self.env.get_template("deploy_stage_config")?;
        Ok(template.render(context! {
            config_file => deploy.config_file,
            script_file => deploy.script_file,
        })?)
    }

    /// Second bootstrap stage: the automation script.
    pub fn deploy_stage_script(&self, deploy: &DeployConfig) -> Result<String> {
        let template = self.env.get_template("deploy_stage_script")?;
        Ok(template.render(context! {
            script_file => deploy.script_file,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_system_includes_task_only_when_given() {
        let engine = PromptEngine::new();
        let with_task = engine.analysis_system("deploy to aws").expect("render");
        assert!(with_task.contains("User specified task"));
        assert!(with_task.contains("deploy to aws"));

        let without = engine.analysis_system("  ").expect("render");
        assert!(!without.contains("User specified task"));
        assert!(without.contains("\"next_task\""));
    }

    #[test]
    fn directory_turn_embeds_listing_and_attachments() {
        let engine = PromptEngine::new();
        let listing = vec!["README.md".to_string(), "app/".to_string()];
        let attachments = vec![Attachment {
            name: "README.md".to_string(),
            content: "# Flask demo".to_string(),
        }];
        let rendered = engine
            .analysis_turn(
                TurnSubject::Directory {
                    path: "",
                    listing: &listing,
                    attachments: &attachments,
                },
                "{}",
            )
            .expect("render");
        assert!(rendered.contains("=== folder: /"));
        assert!(rendered.contains(r#"["README.md","app/"]"#));
        assert!(rendered.contains("=== file: README.md\n# Flask demo"));
        assert!(rendered.contains("Current evidence:\n{}"));
    }

    #[test]
    fn file_and_answer_turns_render() {
        let engine = PromptEngine::new();
        let file = engine
            .analysis_turn(
                TurnSubject::File {
                    path: "app/app.py",
                    content: "app.run(port=5000)",
                },
                "{}",
            )
            .expect("render");
        assert!(file.contains("=== file: app/app.py\napp.run(port=5000)"));
        assert!(!file.contains("=== folder"));

        let answer = engine
            .analysis_turn(
                TurnSubject::Answer {
                    question: "Which cloud?",
                    answer: "gcp",
                },
                "{}",
            )
            .expect("render");
        assert!(answer.contains("\"Which cloud?\""));
        assert!(answer.contains("\"gcp\""));
    }

    #[test]
    fn deploy_prompts_use_configured_file_names() {
        let engine = PromptEngine::new();
        let deploy = DeployConfig {
            config_file: "infra.tf".to_string(),
            script_file: "setup.sh".to_string(),
            ..DeployConfig::default()
        };
        let system = engine
            .deploy_system(r#"{"ports": [5000]}"#, "ship it", &deploy)
            .expect("render");
        assert!(system.contains(r#"{"ports": [5000]}"#));
        assert!(system.contains("ship it"));
        assert!(system.contains("```hcl infra.tf"));
        assert!(system.contains("<<COMPLETION>>"));

        let stage = engine.deploy_stage_config(&deploy).expect("render");
        assert!(stage.contains("`infra.tf`"));
        assert!(stage.contains("`setup.sh`"));
        let script = engine.deploy_stage_script(&deploy).expect("render");
        assert!(script.contains("`setup.sh`"));
    }
}
