//! Streaming parser for `git log -p` output.
//!
//! [`LogParser`] is a two-state machine: it is [`ParserState::Idle`] until the
//! first header line (`commit <hash>`) arrives, then
//! [`ParserState::Accumulating`] for the rest of the feed. Every later header
//! flushes the entry being accumulated; [`LogParser::finish`] flushes the last
//! one at end of input.
//!
//! [`CommitLogStream`] drives the parser from any async line source, usually
//! the stdout of a `git log` child process, and yields one
//! [`CommitEntry`] per call so that only one commit's patch is held in memory
//! at a time.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::CommitEntry;
use crate::repo::CommitStream;

const HEADER_PREFIX: &str = "commit ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    /// No header seen yet.
    Idle,
    /// Collecting the lines of the commit named by `hash`.
    Accumulating { hash: String, text: String },
}

#[derive(Debug)]
pub struct LogParser {
    state: ParserState,
    next_position: u64,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            next_position: 0,
        }
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Feed one line (without its terminator).
    ///
    /// Returns the previous entry when `line` is a header that completes it.
    /// A header without a hash is rejected rather than indexed under an
    /// empty key.
    pub fn push_line(&mut self, line: &str) -> Result<Option<CommitEntry>> {
        if let Some(rest) = line.strip_prefix(HEADER_PREFIX) {
            let hash = rest
                .split_whitespace()
                .next()
                .ok_or_else(|| Error::Process(format!("malformed commit header: {:?}", line)))?;

            let mut text = String::with_capacity(line.len() + 1);
            text.push_str(line);
            text.push('\n');

            let previous = std::mem::replace(
                &mut self.state,
                ParserState::Accumulating {
                    hash: hash.to_string(),
                    text,
                },
            );
            return Ok(self.flush(previous));
        }

        match &mut self.state {
            ParserState::Idle => {
                debug!(line, "discarding log line before first commit header");
            }
            ParserState::Accumulating { text, .. } => {
                text.push_str(line);
                text.push('\n');
            }
        }
        Ok(None)
    }

    /// Flush the pending entry at end of input.
    pub fn finish(&mut self) -> Option<CommitEntry> {
        let previous = std::mem::replace(&mut self.state, ParserState::Idle);
        self.flush(previous)
    }

    fn flush(&mut self, state: ParserState) -> Option<CommitEntry> {
        match state {
            ParserState::Idle => None,
            ParserState::Accumulating { hash, text } => {
                let position = self.next_position;
                self.next_position += 1;
                Some(CommitEntry {
                    hash,
                    diff_text: text,
                    position,
                })
            }
        }
    }
}

/// Pull-based stream of commits over a line source.
///
/// When `child` is set, it is the process producing the lines: its exit
/// status is checked at end of input, and [`CommitStream::abort`] kills it.
/// The child's stderr is drained in the background so a chatty process
/// cannot fill the pipe and stall stdout.
pub struct CommitLogStream<R> {
    reader: R,
    parser: LogParser,
    child: Option<Child>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    done: bool,
    buf: Vec<u8>,
}

impl<R> CommitLogStream<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: LogParser::new(),
            child: None,
            stderr: None,
            done: false,
            buf: Vec::new(),
        }
    }

    pub fn with_child(reader: R, mut child: Child) -> Self {
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut captured = Vec::new();
                if let Err(e) = pipe.read_to_end(&mut captured).await {
                    debug!(error = %e, "stopped reading git log stderr");
                }
                captured
            })
        });
        Self {
            child: Some(child),
            stderr,
            ..Self::new(reader)
        }
    }

    /// Read one line into `self.buf`. Returns `false` at end of input.
    async fn read_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(|e| Error::Process(format!("failed to read git log output: {}", e)))?;
        if n == 0 {
            return Ok(false);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(true)
    }

    async fn wait_for_child(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .await
            .map_err(|e| Error::Process(format!("failed to wait for git log: {}", e)))?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };
        if !status.success() {
            return Err(Error::Process(format!(
                "git log exited with {}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<R> CommitStream for CommitLogStream<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_entry(&mut self) -> Result<Option<CommitEntry>> {
        if self.done {
            return Ok(None);
        }

        loop {
            if !self.read_line().await? {
                self.done = true;
                let last = self.parser.finish();
                self.wait_for_child().await?;
                return Ok(last);
            }

            let line = String::from_utf8_lossy(&self.buf).into_owned();
            if let Some(entry) = self.parser.push_line(&line)? {
                return Ok(Some(entry));
            }
        }
    }

    async fn abort(&mut self) {
        self.done = true;
        if let Some(mut child) = self.child.take() {
            debug!(pid = ?child.id(), "killing git log");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill git log process");
            }
        }
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn synthetic_log(n: usize, k: usize) -> String {
        let mut out = String::new();
        for i in 0..n {
            out.push_str(&format!("commit {:040x}\n", i + 1));
            for j in 0..k {
                out.push_str(&format!("+line {} of commit {}\n", j, i));
            }
        }
        out
    }

    async fn collect(log: &str) -> Result<Vec<CommitEntry>> {
        let reader = BufReader::new(Cursor::new(log.as_bytes().to_vec()));
        let mut stream = CommitLogStream::new(reader);
        let mut entries = Vec::new();
        while let Some(entry) = stream.next_entry().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    #[test]
    fn test_idle_until_first_header() {
        let mut parser = LogParser::new();
        assert_eq!(parser.push_line("stray").unwrap(), None);
        assert_eq!(parser.state(), &ParserState::Idle);
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn test_header_flushes_previous_entry() {
        let mut parser = LogParser::new();
        assert_eq!(parser.push_line("commit aaa").unwrap(), None);
        parser.push_line("+one").unwrap();
        parser.push_line("").unwrap();

        let flushed = parser.push_line("commit bbb").unwrap().unwrap();
        assert_eq!(flushed.hash, "aaa");
        assert_eq!(flushed.diff_text, "commit aaa\n+one\n\n");
        assert_eq!(flushed.position, 0);

        let last = parser.finish().unwrap();
        assert_eq!(last.hash, "bbb");
        assert_eq!(last.diff_text, "commit bbb\n");
        assert_eq!(last.position, 1);
    }

    #[test]
    fn test_header_decorations_ignored() {
        let mut parser = LogParser::new();
        parser.push_line("commit abc123 (HEAD -> main, tag: v1)").unwrap();
        assert_eq!(parser.finish().unwrap().hash, "abc123");
    }

    #[test]
    fn test_malformed_header_is_an_error() {
        let mut parser = LogParser::new();
        let err = parser.push_line("commit    ").unwrap_err();
        assert!(matches!(err, Error::Process(_)));
    }

    #[test]
    fn test_indented_commit_word_is_not_a_header() {
        let mut parser = LogParser::new();
        parser.push_line("commit aaa").unwrap();
        assert_eq!(parser.push_line("    commit message body").unwrap(), None);
        let entry = parser.finish().unwrap();
        assert!(entry.diff_text.contains("    commit message body\n"));
    }

    #[tokio::test]
    async fn test_stream_yields_n_entries_in_order() {
        let (n, k) = (7, 3);
        let entries = collect(&synthetic_log(n, k)).await.unwrap();

        assert_eq!(entries.len(), n);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.hash, format!("{:040x}", i + 1));
            assert_eq!(entry.position, i as u64);
            let lines: Vec<&str> = entry.diff_text.lines().collect();
            assert_eq!(lines.len(), k + 1);
            assert_eq!(lines[0], format!("commit {:040x}", i + 1));
            for (j, line) in lines[1..].iter().enumerate() {
                assert_eq!(*line, format!("+line {} of commit {}", j, i));
            }
        }
    }

    #[tokio::test]
    async fn test_stream_handles_headers_without_bodies() {
        let entries = collect(&synthetic_log(3, 0)).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.diff_text.lines().count() == 1));
    }

    #[tokio::test]
    async fn test_stream_empty_input() {
        assert!(collect("").await.unwrap().is_empty());
    }

    /// An endless `commit <hash>` feed from a real child process.
    #[cfg(target_os = "linux")]
    fn endless_child() -> (BufReader<tokio::process::ChildStdout>, Child) {
        use std::process::Stdio;
        let mut child = tokio::process::Command::new("yes")
            .arg("commit 0123456789abcdef0123456789abcdef01234567")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        (BufReader::new(stdout), child)
    }

    #[cfg(target_os = "linux")]
    fn process_exists(pid: u32) -> bool {
        std::path::Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_abort_kills_the_producer() {
        let (reader, child) = endless_child();
        let pid = child.id().unwrap();
        let mut stream = CommitLogStream::with_child(reader, child);

        assert!(stream.next_entry().await.unwrap().is_some());
        assert!(process_exists(pid));

        stream.abort().await;
        assert!(stream.child.is_none());
        assert!(!process_exists(pid));
        assert!(stream.next_entry().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_stderr_does_not_stall_the_stream() {
        use std::process::Stdio;
        // 256 KiB of stderr before any stdout: more than a pipe buffer.
        let mut child = tokio::process::Command::new("sh")
            .args([
                "-c",
                "head -c 262144 /dev/zero >&2; echo 'commit abc'; echo '+x'",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let mut stream = CommitLogStream::with_child(BufReader::new(stdout), child);

        let entry = tokio::time::timeout(std::time::Duration::from_secs(10), stream.next_entry())
            .await
            .expect("stream stalled")
            .unwrap()
            .unwrap();
        assert_eq!(entry.hash, "abc");
        assert!(stream.next_entry().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        use std::process::Stdio;
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "echo 'commit abc'; echo 'fatal: bad revision' >&2; exit 128"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let mut stream = CommitLogStream::with_child(BufReader::new(stdout), child);

        let err = stream.next_entry().await.unwrap_err();
        match err {
            Error::Process(msg) => assert!(msg.contains("fatal: bad revision")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_tolerates_invalid_utf8_and_crlf() {
        let mut bytes = b"commit abc\r\n+caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"\r\n");
        let reader = BufReader::new(Cursor::new(bytes));
        let mut stream = CommitLogStream::new(reader);

        let entry = stream.next_entry().await.unwrap().unwrap();
        assert_eq!(entry.hash, "abc");
        assert!(entry.diff_text.starts_with("commit abc\n+caf"));
        assert!(!entry.diff_text.contains('\r'));
        assert!(stream.next_entry().await.unwrap().is_none());
        // Exhausted streams stay exhausted.
        assert!(stream.next_entry().await.unwrap().is_none());
    }
}
