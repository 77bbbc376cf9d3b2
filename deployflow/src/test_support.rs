//! Test-only fakes for the oracle and the terminal, plus fixture repositories
//! in every supported form.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Result, anyhow};
use flate2::Compression;
use flate2::write::GzEncoder;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::io::interact::Prompter;
use crate::io::oracle::{CompletionRequest, Oracle};

/// Files of the fixture repository, in the order they are written.
pub const FIXTURE_FILES: [(&str, &str); 4] = [
    ("README.md", "# Demo\n\nA small flask app.\n"),
    (
        "app/app.py",
        "from flask import Flask\n\napp = Flask(__name__)\n\nif __name__ == \"__main__\":\n    app.run(host=\"0.0.0.0\", port=5000)\n",
    ),
    ("app/templates/index.html", "<h1>hello</h1>\n"),
    ("app/requirements.txt", "flask==3.0.0\n"),
];

/// Oracle returning predetermined completions in order and recording every
/// request it receives.
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted oracle exhausted"))
    }
}

/// Prompter answering from queues. Empty queues yield the defaults, so a bare
/// `ScriptedPrompter::new()` accepts every confirmation.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<String>>,
    confirms: RefCell<VecDeque<bool>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answers<I, S>(self, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.answers
            .borrow_mut()
            .extend(answers.into_iter().map(Into::into));
        self
    }

    pub fn with_confirms(self, confirms: impl IntoIterator<Item = bool>) -> Self {
        self.confirms.borrow_mut().extend(confirms);
        self
    }

    /// Every prompt shown so far, in order.
    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, prompt: &str, default: &str) -> Result<String> {
        self.questions.borrow_mut().push(prompt.to_string());
        let answer = self.answers.borrow_mut().pop_front().unwrap_or_default();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer
        })
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        self.questions.borrow_mut().push(prompt.to_string());
        Ok(self.confirms.borrow_mut().pop_front().unwrap_or(default))
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        self.questions.borrow_mut().push(prompt.to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or_default())
    }
}

/// Write the fixture repository into `root`.
pub fn write_fixture_dir(root: &Path) {
    write_files(root, &FIXTURE_FILES);
}

/// Write the fixture repository as a zip at `path`, without directory members.
pub fn zip_fixture(path: &Path) {
    zip_files(path, &FIXTURE_FILES);
}

/// Write the fixture repository as a tar at `path`, gzipped when `gzip`.
pub fn tar_fixture(path: &Path, gzip: bool) {
    tar_files(path, &FIXTURE_FILES, gzip);
}

/// Commit the fixture repository in `scratch/work` and return a bare clone at
/// `scratch/demo.git`, usable as a git target.
pub fn git_fixture(scratch: &Path) -> PathBuf {
    git_repo(scratch, &FIXTURE_FILES)
}

/// Write `(relative path, content)` pairs under `root`.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, content).expect("write fixture file");
    }
}

pub fn zip_files(path: &Path, files: &[(&str, &str)]) {
    let file = File::create(path).expect("create zip");
    let mut zip = ZipWriter::new(file);
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("start zip member");
        zip.write_all(content.as_bytes()).expect("write zip member");
    }
    zip.finish().expect("finish zip");
}

pub fn tar_files(path: &Path, files: &[(&str, &str)], gzip: bool) {
    let file = File::create(path).expect("create tar");
    if gzip {
        let encoder = append_files(
            tar::Builder::new(GzEncoder::new(file, Compression::default())),
            files,
        );
        encoder.finish().expect("finish gzip");
    } else {
        append_files(tar::Builder::new(file), files);
    }
}

fn append_files<W: Write>(mut builder: tar::Builder<W>, files: &[(&str, &str)]) -> W {
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .expect("append tar member");
    }
    builder.into_inner().expect("finish tar")
}

/// Commit `files` in `scratch/work` and return a bare clone at
/// `scratch/demo.git`.
pub fn git_repo(scratch: &Path, files: &[(&str, &str)]) -> PathBuf {
    let work = scratch.join("work");
    fs::create_dir_all(&work).expect("create work tree");
    write_files(&work, files);
    git(&work, &["init", "--quiet"]);
    git(&work, &["config", "user.email", "test@example.com"]);
    git(&work, &["config", "user.name", "test"]);
    git(&work, &["add", "."]);
    git(&work, &["commit", "--quiet", "-m", "chore: init"]);

    let bare = scratch.join("demo.git");
    let status = Command::new("git")
        .args(["clone", "--bare", "--quiet"])
        .arg(&work)
        .arg(&bare)
        .status()
        .expect("git clone --bare");
    assert!(status.success());
    bare
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("run git");
    assert!(status.success(), "git {args:?} failed");
}
