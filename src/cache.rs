//! Per-commit embedding cache stored in git notes.
//!
//! A commit's note holds one encoded [`EmbeddingRecord`] per line: the
//! commit-level record plus any auxiliary file-level records. Records made
//! under a different model or dimensionality are left in place and ignored;
//! they are overwritten the next time the commit is embedded.

use tracing::debug;

use crate::codec;
use crate::config::ConfigSnapshot;
use crate::error::Result;
use crate::models::{EmbeddingRecord, OwnerKind};
use crate::repo::Repository;

/// Outcome of looking up a commit's cached embedding.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// A commit-level record made with the configured model and dimensions.
    Valid(EmbeddingRecord),
    /// Commit-level records exist, but none is usable under this config.
    Stale(StaleReason),
    /// No commit-level record at all.
    Absent,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Valid(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    ModelChanged { cached: String, configured: String },
    DimensionsChanged { cached: u32, configured: u32 },
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::ModelChanged { cached, configured } => {
                write!(f, "model changed from {} to {}", cached, configured)
            }
            StaleReason::DimensionsChanged { cached, configured } => {
                write!(f, "dimensions changed from {} to {}", cached, configured)
            }
        }
    }
}

fn staleness(record: &EmbeddingRecord, snapshot: &ConfigSnapshot) -> Option<StaleReason> {
    if record.model != snapshot.model {
        return Some(StaleReason::ModelChanged {
            cached: record.model.clone(),
            configured: snapshot.model.clone(),
        });
    }
    if record.dimensions != snapshot.dimensions {
        return Some(StaleReason::DimensionsChanged {
            cached: record.dimensions,
            configured: snapshot.dimensions,
        });
    }
    None
}

pub struct EmbeddingCache<'a> {
    repo: &'a dyn Repository,
    write_enabled: bool,
}

impl<'a> EmbeddingCache<'a> {
    pub fn new(repo: &'a dyn Repository, write_enabled: bool) -> Self {
        Self {
            repo,
            write_enabled,
        }
    }

    async fn read_records(&self, hash: &str) -> Result<Vec<EmbeddingRecord>> {
        let lines = self.repo.get_note(hash).await?;
        lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| codec::decode(hash, l))
            .collect()
    }

    /// Every cached record for `hash` that is usable under `snapshot`,
    /// commit-level and file-level alike.
    pub async fn lookup_all(
        &self,
        hash: &str,
        snapshot: &ConfigSnapshot,
    ) -> Result<Vec<EmbeddingRecord>> {
        Ok(self
            .read_records(hash)
            .await?
            .into_iter()
            .filter(|r| staleness(r, snapshot).is_none())
            .collect())
    }

    /// The commit-level cache state for `hash`.
    pub async fn lookup(&self, hash: &str, snapshot: &ConfigSnapshot) -> Result<CacheLookup> {
        let mut first_stale = None;

        for record in self.read_records(hash).await? {
            if record.owner != OwnerKind::Commit {
                continue;
            }
            match staleness(&record, snapshot) {
                None => return Ok(CacheLookup::Valid(record)),
                Some(reason) => {
                    first_stale.get_or_insert(reason);
                }
            }
        }

        Ok(match first_stale {
            Some(reason) => {
                debug!(commit = hash, %reason, "cached embedding is stale");
                CacheLookup::Stale(reason)
            }
            None => CacheLookup::Absent,
        })
    }

    /// Overwrite the note on `hash` with `record`.
    ///
    /// Returns `false` without touching the repository when note writing is
    /// disabled.
    pub async fn store(&self, hash: &str, record: &EmbeddingRecord) -> Result<bool> {
        self.store_records(hash, std::slice::from_ref(record)).await
    }

    /// Overwrite the note on `hash` with all of `records`, one per line.
    pub async fn store_records(&self, hash: &str, records: &[EmbeddingRecord]) -> Result<bool> {
        if !self.write_enabled || records.is_empty() {
            return Ok(false);
        }

        let lines = records
            .iter()
            .map(codec::encode)
            .collect::<Result<Vec<_>>>()?;

        self.repo.set_note(hash, &lines.join("\n")).await?;
        Ok(true)
    }
}
