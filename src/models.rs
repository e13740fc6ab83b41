//! Core data models used throughout semantic-blame.
//!
//! These types represent the commits, cached embeddings, and search matches
//! that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// One commit from the history feed: its header line, message, and patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub hash: String,
    pub diff_text: String,
    /// Zero-based position in the stream, oldest commit first.
    pub position: u64,
}

/// What an [`EmbeddingRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Commit,
    File,
}

/// A full-precision embedding as cached in a commit note.
///
/// `vector.len()` always equals `dimensions`; [`crate::codec`] rejects
/// records that break this.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub owner: OwnerKind,
    /// Commit hash for commit-level records, file path for file-level ones.
    pub target_key: String,
    pub model: String,
    pub dimensions: u32,
    pub vector: Vec<f64>,
}

impl EmbeddingRecord {
    /// Build a commit-level record for `hash`.
    pub fn for_commit(hash: &str, model: &str, dimensions: u32, vector: Vec<f64>) -> Self {
        Self {
            owner: OwnerKind::Commit,
            target_key: hash.to_string(),
            model: model.to_string(),
            dimensions,
            vector,
        }
    }

    /// Build an auxiliary file-level record for `path`.
    pub fn for_file(path: &str, model: &str, dimensions: u32, vector: Vec<f64>) -> Self {
        Self {
            owner: OwnerKind::File,
            target_key: path.to_string(),
            model: model.to_string(),
            dimensions,
            vector,
        }
    }
}

/// A nearest-neighbor hit from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub key: String,
    /// Cosine distance (1 − cosine similarity). Lower is closer.
    pub distance: f64,
}

/// Who is speaking in a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single message handed to the conversational model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// An assembled explanation request: system instruction plus ordered messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}
