//! Semantic commit search.
//!
//! Embeds the query with the same provider and repository settings used at
//! ingest, then asks the [`VectorIndex`] for the nearest commits. The index
//! does not check that the query vector was made by the same model; if the
//! settings changed since ingest, rankings degrade silently.

use anyhow::Context;
use std::path::Path;
use tracing::info;

use crate::blame;
use crate::chat;
use crate::config::{Config, ConfigSnapshot};
use crate::embedding::{self, Embedder};
use crate::error::Result;
use crate::models::Match;
use crate::repo::git::GitRepository;
use crate::store::VectorIndex;

pub const DEFAULT_TOP_N: usize = 10;

/// The `n` indexed commits closest to `query`, nearest first.
///
/// An empty query returns no matches without calling the embedder. Any
/// other text, whitespace included, is embedded as given.
pub async fn similarity_query(
    embedder: &dyn Embedder,
    index: &VectorIndex,
    query: &str,
    n: usize,
) -> Result<Vec<Match>> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let probe = embedder.embed(query).await?;
    index.query(&probe, n).await
}

/// Options for `sblame query`.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_n: Option<usize>,
    /// Print the ranked commits instead of asking the model to explain them.
    pub no_explain: bool,
}

/// `sblame query`: find the commits behind `query` and explain them.
pub async fn run_query(
    config: &Config,
    repo_path: &Path,
    query: &str,
    opts: &QueryOptions,
) -> anyhow::Result<()> {
    let repo = GitRepository::new(repo_path);
    let snapshot = ConfigSnapshot::load(&repo)
        .await
        .context("Failed to read repository settings")?;
    let index = VectorIndex::open(&config.index_dir()?, &snapshot.repo_id)
        .await
        .context("Failed to open vector index")?;
    let embedder = embedding::create_embedder(&config.embedding, &snapshot)?;
    let top_n = opts.top_n.unwrap_or(config.retrieval.top_n);

    let matches = similarity_query(embedder.as_ref(), &index, query, top_n)
        .await
        .context("Query failed")?;
    index.close().await;

    info!(matches = matches.len(), top_n, "similarity query complete");

    if matches.is_empty() {
        println!("No results.");
        return Ok(());
    }

    if opts.no_explain {
        for (i, m) in matches.iter().enumerate() {
            println!("{}. {}  distance: {:.4}", i + 1, m.key, m.distance);
        }
        return Ok(());
    }

    let chat = chat::create_chat(&config.chat)?;
    info!(model = chat.model_name(), commits = matches.len(), "requesting explanation");
    let reply = blame::explain(&repo, chat.as_ref(), &matches, query)
        .await
        .context("Explanation failed")?;
    println!("{}", reply);

    Ok(())
}
