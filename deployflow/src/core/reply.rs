//! Parsing of free-form deployment replies.
//!
//! Deployment replies are prose with embedded fenced blocks. A fence whose info
//! string carries a file name (```` ```hcl main.tf ````) asks for a file write;
//! a fence tagged only with a shell language asks for a command. Two markers end
//! the conversation: [`COMPLETION_MARKER`] and [`ERROR_MARKER`].

use std::sync::LazyLock;

use regex::Regex;

pub const COMPLETION_MARKER: &str = "<<COMPLETION>>";
pub const ERROR_MARKER: &str = "<<ERROR>>";

const SHELL_LANGS: [&str; 4] = ["shell", "sh", "bash", "console"];

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```([^\n`]*)\r?\n((?s:.*?))^[ \t]*```").unwrap()
});

/// A file the oracle wants written into the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub name: String,
    pub content: String,
}

/// Terminal marker found in a reply, carrying the full reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Success(String),
    Failure(String),
}

/// Everything recognised in one reply. All parts are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub file_write: Option<FileWrite>,
    pub shell_command: Option<String>,
    pub terminal: Option<Terminal>,
    /// Last non-empty line, which the oracle is asked to use as a one-line summary.
    pub summary: String,
    /// Actionable blocks beyond the first of each kind. They are not executed.
    pub ignored_blocks: usize,
    /// Both markers were present; success took precedence.
    pub conflicting_markers: bool,
}

impl Reply {
    pub fn has_action(&self) -> bool {
        self.file_write.is_some() || self.shell_command.is_some()
    }
}

/// Classify the fenced blocks and markers in `text`.
pub fn parse_reply(text: &str) -> Reply {
    let mut reply = Reply {
        summary: last_line(text),
        ..Reply::default()
    };

    let success = text.contains(COMPLETION_MARKER);
    let failure = text.contains(ERROR_MARKER);
    reply.conflicting_markers = success && failure;
    reply.terminal = if success {
        Some(Terminal::Success(text.trim().to_string()))
    } else if failure {
        Some(Terminal::Failure(text.trim().to_string()))
    } else {
        None
    };

    for caps in FENCE_RE.captures_iter(text) {
        let info = caps.get(1).map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str());
        match classify_fence(info) {
            Fence::File(name) => {
                if reply.file_write.is_some() {
                    reply.ignored_blocks += 1;
                    continue;
                }
                reply.file_write = Some(FileWrite {
                    name,
                    content: body.trim_end().to_string(),
                });
            }
            Fence::Shell => {
                let command = body.trim();
                if command.is_empty() {
                    continue;
                }
                if reply.shell_command.is_some() {
                    reply.ignored_blocks += 1;
                    continue;
                }
                reply.shell_command = Some(command.to_string());
            }
            Fence::Other => {}
        }
    }

    reply
}

enum Fence {
    File(String),
    Shell,
    Other,
}

fn classify_fence(info: &str) -> Fence {
    let mut tokens = info.split_whitespace();
    let Some(lang) = tokens.next() else {
        return Fence::Other;
    };
    match tokens.next() {
        Some(name) => {
            let name = name.trim_start_matches('[').trim_end_matches(']');
            if name.is_empty() {
                Fence::Other
            } else {
                Fence::File(name.to_string())
            }
        }
        None if SHELL_LANGS.contains(&lang.to_ascii_lowercase().as_str()) => Fence::Shell,
        None => Fence::Other,
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_write_with_reasoning() {
        let text = "```hcl main.tf\nprovider \"aws\" {\n  region = \"us-east-1\"\n}\n```\nCreates one small server.";
        let reply = parse_reply(text);
        let write = reply.file_write.expect("file write");
        assert_eq!(write.name, "main.tf");
        assert_eq!(write.content, "provider \"aws\" {\n  region = \"us-east-1\"\n}");
        assert_eq!(reply.summary, "Creates one small server.");
        assert!(reply.shell_command.is_none());
        assert!(reply.terminal.is_none());
    }

    #[test]
    fn bracketed_file_name_is_accepted() {
        let reply = parse_reply("```bash [auto-deploy.sh]\necho hi\n```\nscript");
        assert_eq!(reply.file_write.expect("write").name, "auto-deploy.sh");
    }

    #[test]
    fn shell_block_is_a_command() {
        let reply = parse_reply("```shell\nterraform apply -auto-approve\n```\nApplying the plan.");
        assert_eq!(
            reply.shell_command.as_deref(),
            Some("terraform apply -auto-approve")
        );
        assert!(reply.file_write.is_none());
    }

    #[test]
    fn file_and_command_in_one_reply() {
        let text = "```text notes.txt\nhello\n```\n```shell\ncat notes.txt\n```\nboth";
        let reply = parse_reply(text);
        assert_eq!(reply.file_write.expect("write").name, "notes.txt");
        assert_eq!(reply.shell_command.as_deref(), Some("cat notes.txt"));
        assert_eq!(reply.ignored_blocks, 0);
    }

    #[test]
    fn extra_blocks_are_counted_not_used() {
        let text = "```shell\nterraform plan\n```\n```shell\nterraform apply\n```\nplan first";
        let reply = parse_reply(text);
        assert_eq!(reply.shell_command.as_deref(), Some("terraform plan"));
        assert_eq!(reply.ignored_blocks, 1);
    }

    #[test]
    fn untagged_fences_are_ignored() {
        let reply = parse_reply("```\nsome output\n```\n```json\n{}\n```\nnothing to do");
        assert!(!reply.has_action());
    }

    #[test]
    fn completion_marker_wins_over_error() {
        let reply = parse_reply("<<COMPLETION>>\nhttp://1.2.3.4:5000\n<<ERROR>>");
        assert!(matches!(reply.terminal, Some(Terminal::Success(_))));
        assert!(reply.conflicting_markers);
    }

    #[test]
    fn error_marker_is_failure() {
        let reply = parse_reply("<<ERROR>>\nquota exceeded\nraise the vCPU limit");
        match reply.terminal {
            Some(Terminal::Failure(text)) => assert!(text.contains("quota exceeded")),
            other => panic!("unexpected terminal {other:?}"),
        }
    }

    #[test]
    fn empty_reply_has_nothing() {
        let reply = parse_reply("");
        assert_eq!(reply, Reply::default());
    }
}
