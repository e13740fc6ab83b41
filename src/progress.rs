//! Ingest progress reporting.
//!
//! Reports per-commit progress during `sblame ingest` so users can see how
//! far through history the run is and how much came from the note cache.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::{IsTerminal, Write};

/// Where a commit's vector came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VectorSource {
    /// Reused from a valid cached note.
    Cached,
    /// Computed by the embedding provider during this run.
    Embedded,
}

impl VectorSource {
    fn as_str(&self) -> &'static str {
        match self {
            VectorSource::Cached => "cached",
            VectorSource::Embedded => "embedded",
        }
    }
}

/// A single progress event for ingest.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// The history stream has been opened.
    Started { repo: String },
    /// The `n`th commit (1-based) has been written to the index.
    Indexed {
        n: u64,
        hash: String,
        source: VectorSource,
    },
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingest pipeline.
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  1,234 commits  a1b2c3d4 (cached)".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Started { repo } => format!("ingest {}  streaming history...\n", repo),
            IngestProgressEvent::Indexed { n, hash, source } => format!(
                "ingest  {} commits  {} ({})\n",
                format_number(*n),
                short_hash(hash),
                source.as_str()
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Started { repo } => serde_json::json!({
                "event": "progress",
                "repo": repo,
                "phase": "started"
            }),
            IngestProgressEvent::Indexed { n, hash, source } => serde_json::json!({
                "event": "progress",
                "phase": "indexed",
                "n": n,
                "commit": hash,
                "source": source.as_str()
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a terminal, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller can pass it to ingest.
    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
