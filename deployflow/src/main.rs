//! Analyse a repository with a language model and deploy it to the cloud.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use deployflow::core::target;
use deployflow::error;
use deployflow::exit_codes;
use deployflow::io::config::{default_config_path, load_config, write_config};
use deployflow::io::interact::{Prompter, TerminalPrompter};
use deployflow::io::oracle::ChatCompletionsOracle;
use deployflow::logging;
use deployflow::pipeline::{DeployRequest, run_pipeline};

#[derive(Parser)]
#[command(
    name = "deployflow",
    version,
    about = "Analyse a repository and deploy it with an LLM"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a repository and deploy it.
    Deploy {
        /// What to deploy, e.g. "Deploy the flask app on AWS".
        task: Option<String>,

        /// Directory, zip, tar or git URL of the repository.
        #[arg(short, long)]
        repo: Option<String>,

        /// Skip analysis and use a saved evidence file.
        #[arg(short, long)]
        evidence_file: Option<PathBuf>,

        /// Stop after the evidence file is written.
        #[arg(long)]
        analyze_only: bool,

        /// Debug-level diagnostics on stderr.
        #[arg(short, long)]
        verbose: bool,

        /// Deployment workspace directory.
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Deploy {
        task,
        repo,
        evidence_file,
        analyze_only,
        verbose,
        workspace,
    } = cli.command;
    logging::init(verbose);

    let prompter = TerminalPrompter;
    let args = DeployArgs {
        task,
        repo,
        evidence_file,
        analyze_only,
        workspace,
    };
    match cmd_deploy(args, &prompter) {
        Ok(()) => ExitCode::from(exit_codes::OK as u8),
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = exit_codes::for_error(error::classify(&err));
            ExitCode::from(code as u8)
        }
    }
}

struct DeployArgs {
    task: Option<String>,
    repo: Option<String>,
    evidence_file: Option<PathBuf>,
    analyze_only: bool,
    workspace: Option<PathBuf>,
}

fn cmd_deploy(args: DeployArgs, prompter: &TerminalPrompter) -> Result<()> {
    let task = match args.task {
        Some(task) => task,
        None => prompter.ask("What do you want to deploy?", "")?,
    };
    if task.trim().is_empty() {
        println!("No task given, nothing to do.");
        return Ok(());
    }
    let repo = match args.repo {
        Some(repo) => repo,
        None => prompter.ask("Enter repository path or URL", ".")?,
    };
    target::classify(&repo)?;

    let config_path = default_config_path()?;
    let mut config = load_config(&config_path)?;
    let api_key = match config.api_key() {
        Some(key) => key,
        None => {
            println!("No API key configured.");
            config.oracle.endpoint = prompter.ask("Enter API endpoint", &config.oracle.endpoint)?;
            config.oracle.api_key = prompter.secret("Enter API key")?;
            write_config(&config_path, &config)
                .with_context(|| format!("save {}", config_path.display()))?;
            println!("Configuration saved to {}", config_path.display());
            config.oracle.api_key.clone()
        }
    };
    debug!(config = %config_path.display(), model = %config.oracle.model, "configuration loaded");

    let oracle = ChatCompletionsOracle::new(&config.oracle, api_key)?;
    let request = DeployRequest {
        repo,
        task,
        evidence_file: args.evidence_file,
        analyze_only: args.analyze_only,
        workspace: args.workspace,
        evidence_dir: None,
    };
    let outcome = run_pipeline(&request, &config, &oracle, prompter)?;
    if let Some(path) = &outcome.evidence_path {
        debug!(path = %path.display(), "evidence written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_deploy_with_flags() {
        let cli = Cli::parse_from([
            "deployflow",
            "deploy",
            "Deploy flask app on AWS",
            "-r",
            "https://github.com/acme/app.git",
            "--analyze-only",
            "-v",
        ]);
        let Command::Deploy {
            task,
            repo,
            analyze_only,
            verbose,
            evidence_file,
            workspace,
        } = cli.command;
        assert_eq!(task.as_deref(), Some("Deploy flask app on AWS"));
        assert_eq!(repo.as_deref(), Some("https://github.com/acme/app.git"));
        assert!(analyze_only && verbose);
        assert!(evidence_file.is_none() && workspace.is_none());
    }

    #[test]
    fn parse_deploy_without_task() {
        let cli = Cli::parse_from(["deployflow", "deploy", "-e", "ev.json", "-w", "out"]);
        let Command::Deploy {
            task,
            evidence_file,
            workspace,
            ..
        } = cli.command;
        assert!(task.is_none());
        assert_eq!(evidence_file, Some(PathBuf::from("ev.json")));
        assert_eq!(workspace, Some(PathBuf::from("out")));
    }
}
