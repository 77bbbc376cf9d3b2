//! Side effects requested by the oracle, applied inside the deployment
//! workspace.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::error::DeployError;
use crate::io::interact::Prompter;
use crate::io::process::{run_command, shell_command};

/// Input fed to every command, so interactive `[y/N]` prompts proceed.
const COMMAND_STDIN: &[u8] = b"yes\n";

/// Outcome of one shell command. A non-zero exit is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Message reporting the result back to the oracle.
    pub fn feedback(&self) -> String {
        let mut msg = format!("Result of `{}`:\n{}", self.command, self.stdout.trim_end());
        if !self.stderr.trim().is_empty() {
            msg.push_str(&format!("\nError: {}", self.stderr.trim_end()));
        }
        if !self.success() {
            match self.exit_code {
                Some(code) => msg.push_str(&format!("\nExit code: {code}")),
                None => msg.push_str("\nExit code: none (terminated)"),
            }
        }
        msg
    }
}

/// Applies file writes and confirmed shell commands in one workspace.
pub struct ActionExecutor<'a> {
    workspace: PathBuf,
    prompter: &'a dyn Prompter,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(workspace: impl Into<PathBuf>, prompter: &'a dyn Prompter) -> Self {
        Self {
            workspace: workspace.into(),
            prompter,
            timeout: None,
            output_limit_bytes: 1_000_000,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }

    /// Write `content` to `<workspace>/<name>`, creating parent directories.
    ///
    /// The name is used as given. Absolute names and `..` components escape
    /// the workspace; they are logged but not refused.
    #[instrument(skip_all, fields(name))]
    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        if escapes_workspace(name) {
            warn!(name, "file name points outside the workspace");
        }
        let path = self.workspace.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut body = content.to_string();
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        println!("  creating file {name}");
        info!(path = %path.display(), bytes = content.len(), "file written");
        Ok(path)
    }

    /// Ask for confirmation, then run `command` through the shell in the
    /// workspace with `yes` on stdin.
    #[instrument(skip_all, fields(command))]
    pub fn execute_command(&self, command: &str) -> Result<CommandResult> {
        println!("  executing command {command}");
        let approved = self
            .prompter
            .confirm(&format!("Execute command '{command}'?"), true)?;
        if !approved {
            info!(command, "command declined");
            return Err(DeployError::UserAborted(format!("declined to run '{command}'")).into());
        }

        let mut cmd = shell_command(command);
        cmd.current_dir(&self.workspace);
        let output = run_command(cmd, Some(COMMAND_STDIN), self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run '{command}'"))?;

        let result = CommandResult {
            command: command.to_string(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            exit_code: output.status.code(),
            timed_out: output.timed_out,
        };
        debug!(stdout = %result.stdout, "command output");
        if result.success() {
            println!("  command executed successfully");
        } else {
            warn!(exit_code = ?result.exit_code, stderr = %result.stderr, "command failed");
            println!("  command failed: {}", result.stderr.trim());
        }
        Ok(result)
    }
}

fn escapes_workspace(name: &str) -> bool {
    let path = Path::new(name);
    path.is_absolute()
        || name.starts_with('/')
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    struct Answers {
        confirms: RefCell<VecDeque<bool>>,
        asked: RefCell<Vec<String>>,
    }

    impl Answers {
        fn new(confirms: &[bool]) -> Self {
            Self {
                confirms: RefCell::new(confirms.iter().copied().collect()),
                asked: RefCell::new(Vec::new()),
            }
        }
    }

    impl Prompter for Answers {
        fn ask(&self, _prompt: &str, default: &str) -> Result<String> {
            Ok(default.to_string())
        }

        fn confirm(&self, prompt: &str, _default: bool) -> Result<bool> {
            self.asked.borrow_mut().push(prompt.to_string());
            Ok(self.confirms.borrow_mut().pop_front().unwrap_or(true))
        }

        fn secret(&self, _prompt: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn write_file_creates_parents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let answers = Answers::new(&[]);
        let executor = ActionExecutor::new(temp.path(), &answers);

        let path = executor
            .write_file("scripts/run.sh", "echo hi")
            .expect("write");
        assert_eq!(path, temp.path().join("scripts/run.sh"));
        assert_eq!(fs::read_to_string(path).expect("read"), "echo hi\n");
    }

    #[test]
    fn traversal_names_are_flagged_but_written() {
        assert!(escapes_workspace("../outside.txt"));
        assert!(escapes_workspace("/etc/passwd"));
        assert!(!escapes_workspace("main.tf"));

        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = temp.path().join("ws");
        fs::create_dir_all(&workspace).expect("mkdir");
        let answers = Answers::new(&[]);
        let executor = ActionExecutor::new(&workspace, &answers);
        executor
            .write_file("../outside.txt", "x")
            .expect("write outside");
        assert!(temp.path().join("outside.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn command_runs_in_workspace_with_yes_on_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("marker.txt"), "here").expect("write");
        let answers = Answers::new(&[true]);
        let executor = ActionExecutor::new(temp.path(), &answers);

        let result = executor
            .execute_command("cat marker.txt; read reply; echo \" $reply\"")
            .expect("run");
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "here yes");
        assert_eq!(
            answers.asked.borrow().as_slice(),
            ["Execute command 'cat marker.txt; read reply; echo \" $reply\"'?"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_reported_not_raised() {
        let temp = tempfile::tempdir().expect("tempdir");
        let answers = Answers::new(&[true]);
        let executor = ActionExecutor::new(temp.path(), &answers);

        let result = executor
            .execute_command("echo broken >&2; exit 2")
            .expect("run");
        assert_eq!(result.exit_code, Some(2));
        let feedback = result.feedback();
        assert!(feedback.contains("Error: broken"));
        assert!(feedback.contains("Exit code: 2"));
    }

    #[test]
    fn declining_aborts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let answers = Answers::new(&[false]);
        let executor = ActionExecutor::new(temp.path(), &answers);

        let err = executor.execute_command("terraform destroy").unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(DeployError::UserAborted(_))
        ));
    }
}
