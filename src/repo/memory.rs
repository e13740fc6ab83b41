//! In-memory [`Repository`] for tests and dry runs.
//!
//! Commits are rendered in the same `commit <hash>` + body layout that
//! `git log -p` produces and are streamed through the real
//! [`CommitLogStream`] parser, so pipeline tests exercise the same parsing
//! path as a git-backed run.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::io::BufReader;

use crate::commit_log::CommitLogStream;
use crate::error::{Error, Result};

use super::{CommitStream, Repository};

// A panic while a guard was held cannot leave these maps half-updated, so a
// poisoned lock is taken over instead of propagated.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

struct StoredCommit {
    hash: String,
    text: String,
}

pub struct InMemoryRepository {
    commits: RwLock<Vec<StoredCommit>>,
    notes: RwLock<HashMap<String, String>>,
    settings: RwLock<HashMap<String, String>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            commits: RwLock::new(Vec::new()),
            notes: RwLock::new(HashMap::new()),
            settings: RwLock::new(HashMap::new()),
        }
    }

    /// Append a commit to the history. `body` is everything after the header
    /// line (message and patch).
    pub fn add_commit(&self, hash: &str, body: &str) {
        let mut text = format!("commit {}\n{}", hash, body);
        if !text.ends_with('\n') {
            text.push('\n');
        }
        write(&self.commits).push(StoredCommit {
            hash: hash.to_string(),
            text,
        });
    }

    /// Raw note text currently attached to `hash`.
    pub fn note(&self, hash: &str) -> Option<String> {
        read(&self.notes).get(hash).cloned()
    }

    pub fn note_count(&self) -> usize {
        read(&self.notes).len()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn stream_log(&self) -> Result<Box<dyn CommitStream>> {
        let log: String = read(&self.commits)
            .iter()
            .map(|c| c.text.as_str())
            .collect();
        let reader = BufReader::new(Cursor::new(log.into_bytes()));
        Ok(Box::new(CommitLogStream::new(reader)))
    }

    async fn get_commit(&self, hash: &str) -> Result<String> {
        read(&self.commits)
            .iter()
            .find(|c| c.hash == hash)
            .map(|c| c.text.clone())
            .ok_or_else(|| Error::Process(format!("unknown revision {}", hash)))
    }

    async fn get_note(&self, hash: &str) -> Result<Vec<String>> {
        Ok(read(&self.notes)
            .get(hash)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn set_note(&self, hash: &str, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(Error::Process(format!("refusing to write an empty note on {}", hash)));
        }
        write(&self.notes).insert(hash.to_string(), text.to_string());
        Ok(())
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>> {
        Ok(read(&self.settings).get(key).cloned())
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        write(&self.settings).insert(key.to_string(), value.to_string());
        Ok(())
    }
}
