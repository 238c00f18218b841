use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ragfuse_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // test binary
    path.pop(); // deps/
    path.push("ragfuse");
    path
}

/// Config with every provider disabled, so no network is touched.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("note.md"), "Deploys go through the staging cluster first.").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ragfuse.sqlite"

[retrieval]
top_k = 3

[embedding]
provider = "disabled"

[llm]
provider = "disabled"

[server]
bind = "127.0.0.1:7349"
"#,
        root.display()
    );

    let config_path = config_dir.join("ragfuse.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ragfuse(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ragfuse_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragfuse binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragfuse(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_ragfuse(&config_path, &["init"]);
    assert!(success, "second init failed");
}

#[test]
fn test_collections_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_ragfuse(&config_path, &["init"]);

    let (stdout, stderr, success) = run_ragfuse(&config_path, &["collections"]);
    assert!(success, "collections failed: {}", stderr);
    assert!(stdout.contains("No collections."));
}

#[test]
fn test_search_on_empty_store_finds_nothing() {
    let (_tmp, config_path) = setup_test_env();
    run_ragfuse(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_ragfuse(&config_path, &["search", "staging deploys", "--summary"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_ask_on_empty_store_reports_no_data() {
    let (_tmp, config_path) = setup_test_env();
    run_ragfuse(&config_path, &["init"]);

    let (stdout, stderr, success) = run_ragfuse(&config_path, &["ask", "how do deploys work?"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("No relevant information found"));
    assert!(stdout.contains("No Data"));
}

#[test]
fn test_index_requires_embeddings() {
    let (tmp, config_path) = setup_test_env();
    run_ragfuse(&config_path, &["init"]);

    let note = tmp.path().join("note.md");
    let (_, stderr, success) = run_ragfuse(
        &config_path,
        &["index", "notes", "NOTE-1", note.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("requires embeddings"), "stderr: {}", stderr);
}

#[test]
fn test_usage_commands() {
    let (_tmp, config_path) = setup_test_env();
    run_ragfuse(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_ragfuse(&config_path, &["usage", "stats", "--period", "all"]);
    assert!(success, "usage stats failed: {}", stderr);
    assert!(stdout.contains("Token usage (all)"));
    assert!(stdout.contains("(0 ok, 0 failed)"));

    let (stdout, _, success) = run_ragfuse(&config_path, &["usage", "costs"]);
    assert!(success);
    assert!(stdout.contains("No usage recorded (month)."));

    let (stdout, _, success) = run_ragfuse(&config_path, &["usage", "prune", "--days", "30"]);
    assert!(success);
    assert!(stdout.contains("Deleted 0 usage record(s)"));

    let (_, _, success) = run_ragfuse(&config_path, &["usage", "stats", "--period", "decade"]);
    assert!(!success);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(
        &bad,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n\n[llm]\nprovider = \"gpt\"\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_ragfuse(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown llm provider"), "stderr: {}", stderr);
}
