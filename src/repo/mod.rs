//! Repository abstraction.
//!
//! The [`Repository`] trait is everything the pipeline needs from version
//! control: the chronological patch log, individual commits, per-commit
//! notes, and a small key/value settings store. [`git::GitRepository`] shells
//! out to the `git` binary; [`memory::InMemoryRepository`] backs tests.
//!
//! | Method | git command |
//! |--------|-------------|
//! | [`stream_log`](Repository::stream_log) | `git log -p --reverse` |
//! | [`get_commit`](Repository::get_commit) | `git show -p <hash>` |
//! | [`get_note`](Repository::get_note) | `git notes show <hash>` |
//! | [`set_note`](Repository::set_note) | `git notes add -f -m <text> <hash>` |
//! | [`config_get`](Repository::config_get) | `git config semblame.<key>` |
//! | [`config_set`](Repository::config_set) | `git config semblame.<key> <value>` |

pub mod git;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::CommitEntry;

/// A one-pass, consumer-driven sequence of commits, oldest first.
#[async_trait]
pub trait CommitStream: Send {
    /// Next commit, or `None` once the feed is exhausted.
    async fn next_entry(&mut self) -> Result<Option<CommitEntry>>;

    /// Stop producing and terminate the underlying process, if any.
    async fn abort(&mut self);
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Start streaming the full patch history, oldest commit first.
    async fn stream_log(&self) -> Result<Box<dyn CommitStream>>;

    /// Full text of one commit (header, message, patch).
    async fn get_commit(&self, hash: &str) -> Result<String>;

    /// Lines of the note attached to `hash`; empty when there is none.
    async fn get_note(&self, hash: &str) -> Result<Vec<String>>;

    /// Replace the note attached to `hash` with `text`.
    async fn set_note(&self, hash: &str, text: &str) -> Result<()>;

    /// Read a repository-scoped setting; `None` when unset.
    async fn config_get(&self, key: &str) -> Result<Option<String>>;

    /// Write a repository-scoped setting.
    async fn config_set(&self, key: &str, value: &str) -> Result<()>;
}
