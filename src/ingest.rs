//! Ingestion pipeline orchestration.
//!
//! Streams the repository's history oldest-first and, for every commit,
//! reuses the cached note embedding when it matches the current settings or
//! computes a fresh one, then writes the vector to the index. Commits are
//! processed strictly one at a time: the next commit is not read until the
//! current index write has succeeded.
//!
//! Any failure ends the run. The history process is killed, rows already
//! written stay in place, and nothing after the failing commit is indexed.

use anyhow::Context;
use std::path::Path;
use tracing::{debug, info};

use crate::cache::{CacheLookup, EmbeddingCache};
use crate::config::{Config, ConfigSnapshot};
use crate::embedding::{self, Embedder};
use crate::error::{Error, Result};
use crate::models::{CommitEntry, EmbeddingRecord};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress, VectorSource};
use crate::repo::git::GitRepository;
use crate::repo::{CommitStream, Repository};
use crate::store::VectorIndex;

/// Counters for one ingest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    /// Commits written to the index.
    pub commits: u64,
    /// Commits whose vector came from a valid cached note.
    pub cache_hits: u64,
    /// Commits sent to the embedding provider.
    pub embedded: u64,
    /// Notes written or overwritten.
    pub notes_written: u64,
}

/// Everything one ingest run needs, borrowed for its duration.
pub struct Ingestor<'a> {
    pub repo: &'a dyn Repository,
    pub snapshot: &'a ConfigSnapshot,
    pub index: &'a VectorIndex,
    pub embedder: &'a dyn Embedder,
    pub progress: &'a dyn IngestProgressReporter,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        repo: &'a dyn Repository,
        snapshot: &'a ConfigSnapshot,
        index: &'a VectorIndex,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            repo,
            snapshot,
            index,
            embedder,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn IngestProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Index the full history. Fails fast on the first error.
    pub async fn run(&self) -> Result<IngestStats> {
        let cache = EmbeddingCache::new(self.repo, self.snapshot.write_notes);
        let mut stream = self.repo.stream_log().await?;
        let mut stats = IngestStats::default();

        match self.drain(&mut *stream, &cache, &mut stats).await {
            Ok(()) => Ok(stats),
            Err(e) => {
                stream.abort().await;
                Err(e)
            }
        }
    }

    async fn drain(
        &self,
        stream: &mut dyn CommitStream,
        cache: &EmbeddingCache<'_>,
        stats: &mut IngestStats,
    ) -> Result<()> {
        while let Some(entry) = stream.next_entry().await? {
            let source = self.ingest_one(&entry, cache, stats).await?;
            stats.commits += 1;
            self.progress.report(IngestProgressEvent::Indexed {
                n: stats.commits,
                hash: entry.hash.clone(),
                source,
            });
        }
        Ok(())
    }

    async fn ingest_one(
        &self,
        entry: &CommitEntry,
        cache: &EmbeddingCache<'_>,
        stats: &mut IngestStats,
    ) -> Result<VectorSource> {
        let (vector, source) = match cache.lookup(&entry.hash, self.snapshot).await? {
            CacheLookup::Valid(record) => {
                stats.cache_hits += 1;
                (record.vector, VectorSource::Cached)
            }
            lookup => {
                if let CacheLookup::Stale(reason) = &lookup {
                    debug!(commit = %entry.hash, %reason, "re-embedding stale commit");
                }
                if self.embedder.dims() != self.snapshot.dimensions as usize {
                    return Err(Error::Embedding(format!(
                        "{} produces {} dimensions but the repository is configured for {}",
                        self.embedder.model_name(),
                        self.embedder.dims(),
                        self.snapshot.dimensions
                    )));
                }
                debug!(commit = %entry.hash, model = self.embedder.model_name(), "embedding commit");
                let vector = self.embedder.embed(&entry.diff_text).await?;
                embedding::check_dims(&vector, self.embedder.dims())?;
                stats.embedded += 1;

                let record = EmbeddingRecord::for_commit(
                    &entry.hash,
                    &self.snapshot.model,
                    self.snapshot.dimensions,
                    vector,
                );
                if cache.store(&entry.hash, &record).await? {
                    stats.notes_written += 1;
                }
                (record.vector, VectorSource::Embedded)
            }
        };

        self.index.upsert(&entry.hash, &vector).await?;
        Ok(source)
    }
}

/// `sblame ingest`: index the repository at `repo_path`.
pub async fn run_ingest(
    config: &Config,
    repo_path: &Path,
    progress: &dyn IngestProgressReporter,
) -> anyhow::Result<()> {
    let repo = GitRepository::new(repo_path);
    let snapshot = ConfigSnapshot::load(&repo)
        .await
        .context("Failed to read repository settings")?;
    let index_dir = config.index_dir()?;
    let index = VectorIndex::open(&index_dir, &snapshot.repo_id)
        .await
        .context("Failed to open vector index")?;
    let embedder = embedding::create_embedder(&config.embedding, &snapshot)?;

    info!(
        repo = %repo_path.display(),
        model = %snapshot.model,
        dimensions = snapshot.dimensions,
        "starting ingest"
    );
    progress.report(IngestProgressEvent::Started {
        repo: repo_path.display().to_string(),
    });

    let stats = Ingestor::new(&repo, &snapshot, &index, embedder.as_ref())
        .with_progress(progress)
        .run()
        .await
        .context("Ingest failed")?;

    println!("ingest {}", repo_path.display());
    println!("  commits indexed: {}", stats.commits);
    println!("  cache hits: {}", stats.cache_hits);
    println!("  embedded: {}", stats.embedded);
    if snapshot.write_notes {
        println!("  notes written: {}", stats.notes_written);
    } else {
        println!("  notes written: disabled");
    }
    println!("  index: {}", crate::store::index_path(&index_dir, &snapshot.repo_id).display());
    println!("ok");

    index.close().await;
    Ok(())
}
