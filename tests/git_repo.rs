//! Runs against a scratch git repository. Skipped when `git` is not installed.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

use semantic_blame::cache::EmbeddingCache;
use semantic_blame::config::{ConfigSnapshot, DEFAULT_DIMENSIONS, DEFAULT_MODEL};
use semantic_blame::models::EmbeddingRecord;
use semantic_blame::repo::git::GitRepository;
use semantic_blame::repo::{CommitStream, Repository};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository with one commit per line in `lines`, oldest first.
fn scratch_repo(lines: &[&str]) -> (TempDir, Vec<String>) {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);

    let mut hashes = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let file = format!("file{}.txt", i);
        std::fs::write(dir.join(&file), format!("{}\n", line)).unwrap();
        git(dir, &["add", &file]);
        git(dir, &["commit", "-q", "-m", &format!("add {}", file)]);
        hashes.push(git(dir, &["rev-parse", "HEAD"]));
    }
    (tmp, hashes)
}

#[tokio::test]
async fn streams_history_oldest_first() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let (tmp, hashes) = scratch_repo(&["alpha", "beta", "gamma"]);
    let repo = GitRepository::new(tmp.path());

    let mut stream = repo.stream_log().await.unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = stream.next_entry().await.unwrap() {
        assert_eq!(entry.position as usize, seen.len());
        seen.push(entry);
    }

    assert_eq!(
        seen.iter().map(|e| e.hash.clone()).collect::<Vec<_>>(),
        hashes
    );
    assert!(seen[1].diff_text.starts_with(&format!("commit {}", hashes[1])));
    assert!(seen[1].diff_text.contains("+beta"));
    assert!(!seen[1].diff_text.contains("+alpha"));
}

#[tokio::test]
async fn aborting_the_stream_is_clean() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let (tmp, _) = scratch_repo(&["one", "two"]);
    let repo = GitRepository::new(tmp.path());

    let mut stream = repo.stream_log().await.unwrap();
    assert!(stream.next_entry().await.unwrap().is_some());
    stream.abort().await;
    // The remaining commit is never produced after an abort.
    assert!(stream.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn user_log_format_settings_do_not_change_the_feed() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let (tmp, hashes) = scratch_repo(&["alpha", "beta"]);
    git(tmp.path(), &["config", "log.abbrevCommit", "true"]);
    git(tmp.path(), &["config", "log.decorate", "full"]);
    git(tmp.path(), &["config", "color.ui", "always"]);
    let repo = GitRepository::new(tmp.path());

    for pretty in ["oneline", "short", "format:%h %s"] {
        git(tmp.path(), &["config", "format.pretty", pretty]);

        let mut stream = repo.stream_log().await.unwrap();
        let mut streamed = Vec::new();
        while let Some(entry) = stream.next_entry().await.unwrap() {
            streamed.push(entry.hash);
        }
        assert_eq!(streamed, hashes, "format.pretty={}", pretty);
        assert!(streamed.iter().all(|h| h.len() == 40));

        let shown = repo.get_commit(&hashes[1]).await.unwrap();
        assert!(shown.starts_with(&format!("commit {}\n", hashes[1])));
        assert!(shown.contains("+beta"));
        assert!(!shown.contains('\u{1b}'));
    }
}

#[tokio::test]
async fn notes_round_trip_through_the_cache() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let (tmp, hashes) = scratch_repo(&["alpha"]);
    let repo = GitRepository::new(tmp.path());
    let snapshot = ConfigSnapshot::load(&repo).await.unwrap();

    let cache = EmbeddingCache::new(&repo, true);
    assert!(!cache.lookup(&hashes[0], &snapshot).await.unwrap().is_hit());

    let vector: Vec<f64> = (0..snapshot.dimensions).map(|i| i as f64 / 7.0).collect();
    let record = EmbeddingRecord::for_commit(
        &hashes[0],
        &snapshot.model,
        snapshot.dimensions,
        vector.clone(),
    );
    assert!(cache.store(&hashes[0], &record).await.unwrap());
    // Force-overwrite succeeds on an existing note.
    assert!(cache.store(&hashes[0], &record).await.unwrap());

    match cache.lookup(&hashes[0], &snapshot).await.unwrap() {
        semantic_blame::cache::CacheLookup::Valid(found) => assert_eq!(found.vector, vector),
        other => panic!("expected a valid cache entry, got {:?}", other),
    }

    // Notes stay out of the commit text.
    let shown = repo.get_commit(&hashes[0]).await.unwrap();
    assert!(shown.contains("+alpha"));
    assert!(!shown.contains("\"vector\""));
}

#[tokio::test]
async fn settings_are_initialised_in_git_config() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let (tmp, _) = scratch_repo(&["alpha"]);
    let repo = GitRepository::new(tmp.path());

    let snapshot = ConfigSnapshot::load(&repo).await.unwrap();
    assert_eq!(snapshot.model, DEFAULT_MODEL);
    assert_eq!(snapshot.dimensions, DEFAULT_DIMENSIONS);
    assert!(snapshot.write_notes);
    assert_eq!(
        git(tmp.path(), &["config", "semblame.uuid"]),
        snapshot.repo_id.to_string()
    );
    assert_eq!(repo.config_get("missing").await.unwrap(), None);
}
