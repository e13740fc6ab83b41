//! [`Repository`] backed by the `git` binary.
//!
//! Every call spawns `git -C <path> ...` with stdin closed. Log and show run
//! with `--no-notes` so cached embeddings never leak into the text that gets
//! embedded or shown to the chat model.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::io::BufReader;
use tokio::process::Command;
use tracing::debug;

use crate::commit_log::CommitLogStream;
use crate::error::{Error, Result};

use super::{CommitStream, Repository};

/// git config section holding the repository-scoped settings.
const CONFIG_SECTION: &str = "semblame";

/// Output options for `git log` and `git show`.
///
/// Pinned so user config (`format.pretty`, `log.abbrevCommit`,
/// `log.decorate`, `color.ui`, `notes.displayRef`) cannot change the header
/// lines the parser keys on.
const PATCH_FORMAT: &[&str] = &[
    "-p",
    "--pretty=medium",
    "--no-abbrev-commit",
    "--no-decorate",
    "--no-color",
    "--no-notes",
];

/// A local git working tree or bare repository.
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.path);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(repo = %self.path.display(), ?args, "running git");
        self.git()
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Process(format!("failed to execute 'git {}': {}", args.join(" "), e)))
    }
}

fn failure(what: &str, output: &Output) -> Error {
    let stderr = String::from_utf8_lossy(&output.stderr);
    Error::Process(format!("{} failed ({}): {}", what, output.status, stderr.trim()))
}

fn config_key(key: &str) -> String {
    format!("{}.{}", CONFIG_SECTION, key)
}

#[async_trait]
impl Repository for GitRepository {
    async fn stream_log(&self) -> Result<Box<dyn CommitStream>> {
        let mut child = self
            .git()
            .arg("log")
            .args(PATCH_FORMAT)
            .arg("--reverse")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Process(format!("failed to execute 'git log': {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Process("git log stdout was not captured".to_string()))?;

        Ok(Box::new(CommitLogStream::with_child(
            BufReader::new(stdout),
            child,
        )))
    }

    async fn get_commit(&self, hash: &str) -> Result<String> {
        let mut args = vec!["show"];
        args.extend_from_slice(PATCH_FORMAT);
        args.push(hash);
        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(failure(&format!("git show {}", hash), &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn get_note(&self, hash: &str) -> Result<Vec<String>> {
        let output = self.run(&["notes", "show", hash]).await?;

        if !output.status.success() {
            // `git notes show` exits 1 with nothing on stdout when the commit
            // has no note.
            if output.status.code() == Some(1) && output.stdout.is_empty() {
                return Ok(Vec::new());
            }
            return Err(failure(&format!("git notes show {}", hash), &output));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    async fn set_note(&self, hash: &str, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(Error::Process(format!("refusing to write an empty note on {}", hash)));
        }
        let output = self.run(&["notes", "add", "-f", "-m", text, hash]).await?;
        if !output.status.success() {
            return Err(failure(&format!("git notes add {}", hash), &output));
        }
        Ok(())
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = config_key(key);
        let output = self.run(&["config", &key]).await?;

        if !output.status.success() {
            // Exit status 1 means the key is not set.
            if output.status.code() == Some(1) {
                return Ok(None);
            }
            return Err(failure(&format!("git config {}", key), &output));
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let key = config_key(key);
        let output = self.run(&["config", &key, value]).await?;
        if !output.status.success() {
            return Err(failure(&format!("git config {}", key), &output));
        }
        Ok(())
    }
}
