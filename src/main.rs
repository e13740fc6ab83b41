//! # Semantic Blame CLI (`sblame`)
//!
//! Indexes a repository's history and answers questions about it.
//!
//! ## Usage
//!
//! ```bash
//! sblame --config ./sblame.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sblame ingest [REPO]` | Embed every commit and write the vector index |
//! | `sblame query <REPO> "<question>"` | Explain the commits closest to the question |
//! | `sblame settings [REPO]` | Print (and initialise) the repository settings |
//!
//! Logging goes to stderr and is controlled by `SBLAME_LOG`
//! (e.g. `SBLAME_LOG=semantic_blame=debug`). Defaults to `warn`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use semantic_blame::config::{self, ConfigSnapshot};
use semantic_blame::ingest;
use semantic_blame::progress::ProgressMode;
use semantic_blame::repo::git::GitRepository;
use semantic_blame::search::{self, QueryOptions};

/// Semantic Blame: ask your commit history why the code is the way it is.
#[derive(Parser)]
#[command(
    name = "sblame",
    about = "Semantic Blame: find and explain the commits behind a question",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional: when the file does not exist every setting takes its default.
    #[arg(long, global = true, default_value = "./sblame.toml")]
    config: PathBuf,

    /// Ingest progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the repository's full history.
    ///
    /// Reuses embeddings cached in git notes when the model and dimensions
    /// match, embeds everything else, and writes every commit to the index.
    /// Stops at the first failure.
    Ingest {
        /// Path to the repository.
        #[arg(default_value = ".")]
        repo: PathBuf,
    },

    /// Find the commits most related to a question and explain them.
    Query {
        /// Path to the repository.
        repo: PathBuf,

        /// Free-text question.
        query: String,

        /// Number of commits to retrieve.
        #[arg(long)]
        top_n: Option<usize>,

        /// List the matching commits instead of asking the chat model.
        #[arg(long)]
        no_explain: bool,
    },

    /// Show the repository settings, writing defaults for any that are unset.
    Settings {
        /// Path to the repository.
        #[arg(default_value = ".")]
        repo: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("SBLAME_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;

    // Ctrl-C drops the running command, which kills any in-flight git child.
    tokio::select! {
        res = run(cli.command, cli.progress, &cfg) => res,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    }
}

async fn run(
    command: Commands,
    progress: Option<ProgressMode>,
    cfg: &config::Config,
) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { repo } => {
            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            ingest::run_ingest(cfg, &repo, reporter.as_ref()).await?;
        }
        Commands::Query {
            repo,
            query,
            top_n,
            no_explain,
        } => {
            let opts = QueryOptions { top_n, no_explain };
            search::run_query(cfg, &repo, &query, &opts).await?;
        }
        Commands::Settings { repo } => {
            let git = GitRepository::new(&repo);
            let snapshot = ConfigSnapshot::load(&git)
                .await
                .context("Failed to read repository settings")?;
            println!("repository: {}", repo.display());
            println!("  semblame.model = {}", snapshot.model);
            println!("  semblame.dimensions = {}", snapshot.dimensions);
            println!("  semblame.write-notes = {}", snapshot.write_notes);
            println!("  semblame.uuid = {}", snapshot.repo_id);
            println!(
                "  index: {}",
                semantic_blame::store::index_path(&cfg.index_dir()?, &snapshot.repo_id).display()
            );
        }
    }

    Ok(())
}
