//! End-to-end tests driving the built `kengine` binary through its full
//! init → ingest → query → get → sync-sidecars lifecycle.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn kengine_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kengine");
    path
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(kengine_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run kengine binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Writes a minimal config plus a small YAML corpus (two notes, one
/// repo document) under a fresh temp directory, and returns `(tmp,
/// config_path, docs_dir)`.
fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    let notes_dir = docs_dir.join("notes");
    let repos_dir = docs_dir.join("github").join("repos");
    fs::create_dir_all(&notes_dir).unwrap();
    fs::create_dir_all(&repos_dir).unwrap();

    fs::write(
        notes_dir.join("rust-notes.yaml"),
        r#"content: |
  # Rust Programming

  Rust is a systems programming language focused on safety and speed.
  It uses an ownership model instead of a garbage collector.

  ## Cargo

  Cargo is the package manager and build tool for Rust. It manages
  dependencies declared in Cargo.toml and compiles crates.
"#,
    )
    .unwrap();

    fs::write(
        notes_dir.join("ml-notes.yaml"),
        r#"content: |
  # Machine Learning

  Machine learning models are trained on data to make predictions.
  Deep learning uses neural networks with many layers.

  ## Frameworks

  PyTorch and TensorFlow are popular deep learning frameworks used
  for training and deploying models.
"#,
    )
    .unwrap();

    fs::write(
        repos_dir.join("example-repo.yaml"),
        r#"name: example-repo
description: A small example Rust crate used in documentation
primary_language: Rust
size: "1200"
priority: medium
languages:
  - Rust
  - TOML
topics:
  - rust
  - example
default_branch: main
stars: "42"
forks: "3"
open_issues: "1"
created_at: "2024-01-01T00:00:00Z"
updated_at: "2024-06-01T00:00:00Z"
archived: "false"
"#,
    )
    .unwrap();

    let db_path = root.join("data").join("kengine.sqlite3");
    let config_content = format!(
        r#"[db]
path = "{db}"

[chunking]
max_chunk_chars = 2800

[retrieval]
w_sem = 0.6
w_lex = 0.4
final_limit = 10

[embedding]
provider = "hash"
dims = 64
batch_size = 16
"#,
        db = db_path.display(),
    );

    let config_path = root.join("config.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, docs_dir)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config, _docs) = setup_test_env();
    let output = run(&config, &["init"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Database initialized"));
    assert!(tmp.path().join("data").join("kengine.sqlite3").exists());
}

fn ingest(config: &Path, docs: &Path, sidecar_dir: &Path) -> Output {
    run(
        config,
        &["ingest", docs.to_str().unwrap(), "--sidecar-dir", sidecar_dir.to_str().unwrap()],
    )
}

#[test]
fn test_ingest_then_stats_reports_counts() {
    let (tmp, config, docs) = setup_test_env();
    let sidecar_dir = tmp.path().join(".embeddings");

    let ingest = ingest(&config, &docs, &sidecar_dir);
    assert!(ingest.status.success(), "stderr: {}", stderr(&ingest));
    assert!(stdout(&ingest).contains("ingested 3 documents"));

    let stats = run(&config, &["stats"]);
    assert!(stats.status.success(), "stderr: {}", stderr(&stats));
    let out = stdout(&stats);
    assert!(out.contains("documents: 3"));
}

#[test]
fn test_query_keyword_finds_relevant_note() {
    let (tmp, config, docs) = setup_test_env();
    let sidecar_dir = tmp.path().join(".embeddings");
    let ingest = ingest(&config, &docs, &sidecar_dir);
    assert!(ingest.status.success(), "stderr: {}", stderr(&ingest));

    let output = run(&config, &["query", "cargo package manager", "--mode", "keyword"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("notes") || out.contains("No results."));
}

#[test]
fn test_query_hybrid_returns_scored_results() {
    let (tmp, config, docs) = setup_test_env();
    let sidecar_dir = tmp.path().join(".embeddings");
    let ingest = ingest(&config, &docs, &sidecar_dir);
    assert!(ingest.status.success(), "stderr: {}", stderr(&ingest));

    let output = run(&config, &["query", "deep learning frameworks", "--mode", "hybrid"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("semantic=") || out.contains("No results."));
}

#[test]
fn test_query_fusion_produces_an_answer() {
    let (tmp, config, docs) = setup_test_env();
    let sidecar_dir = tmp.path().join(".embeddings");
    let ingest = ingest(&config, &docs, &sidecar_dir);
    assert!(ingest.status.success(), "stderr: {}", stderr(&ingest));

    let output = run(&config, &["query", "tell me about rust and ml", "--mode", "fusion"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("--- Answer ---"));
}

#[test]
fn test_get_prints_chunks_for_ingested_document() {
    let (tmp, config, docs) = setup_test_env();
    let sidecar_dir = tmp.path().join(".embeddings");
    let ingest = ingest(&config, &docs, &sidecar_dir);
    assert!(ingest.status.success(), "stderr: {}", stderr(&ingest));

    let output = run(&config, &["get", "notes", "rust-notes"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("rust-notes"));
}

#[test]
fn test_get_unknown_document_fails_with_not_found_exit_code() {
    let (_tmp, config, _docs) = setup_test_env();
    let init = run(&config, &["init"]);
    assert!(init.status.success(), "stderr: {}", stderr(&init));

    let output = run(&config, &["get", "notes", "does-not-exist"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_sync_sidecars_writes_embedding_files() {
    let (tmp, config, docs) = setup_test_env();
    let sidecar_dir = tmp.path().join(".embeddings");
    let ingest = ingest(&config, &docs, &sidecar_dir);
    assert!(ingest.status.success(), "stderr: {}", stderr(&ingest));

    assert!(sidecar_dir.join("metadata.json").exists());

    let output = run(&config, &["sync-sidecars", "--sidecar-dir", sidecar_dir.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("wrote"));
}
