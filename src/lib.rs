//! # Semantic Blame
//!
//! Find the commits behind a piece of behavior by asking in plain language.
//!
//! Semantic Blame indexes a repository's commit history as embedding vectors,
//! caches each commit's embedding in a git note so clones and re-runs do not
//! pay for it twice, keeps a per-repository SQLite index for nearest-neighbor
//! search, and hands the closest commits to a chat model for explanation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  git log -p  │──▶│   Ingest    │──▶│ SQLite index │
//! │ (commit_log) │   │ cache/embed │   │   (store)    │
//! └──────────────┘   └──────┬──────┘   └──────┬───────┘
//!                           │                 │
//!                           ▼                 ▼
//!                    ┌────────────┐     ┌──────────┐     ┌──────────┐
//!                    │ git notes  │     │  Search  │────▶│  Blame   │
//!                    │  (cache)   │     │ (query)  │     │  (chat)  │
//!                    └────────────┘     └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=...
//! sblame ingest .                              # index history, write notes
//! sblame query . "why do retries back off?"    # explain the closest commits
//! sblame query . "tls config" --no-explain     # just list them
//! sblame settings .                            # show repository settings
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and repository settings |
//! | [`models`] | Core data types |
//! | [`error`] | Library error kinds |
//! | [`repo`] | Repository trait, git and in-memory backends |
//! | [`commit_log`] | Streaming `git log -p` parser |
//! | [`codec`] | Note body encoding |
//! | [`cache`] | Note-backed embedding cache |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Per-repository vector index |
//! | [`db`] | Database connection |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Similarity query |
//! | [`chat`] | Chat model abstraction |
//! | [`blame`] | Conversation assembly |
//! | [`progress`] | Ingest progress reporting |

pub mod blame;
pub mod cache;
pub mod chat;
pub mod codec;
pub mod commit_log;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod progress;
pub mod repo;
pub mod search;
pub mod store;
