use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ragchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ragchat"))
}

/// Temp dir with a config file and a few documents.
fn setup_test_env(extra_config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("long.txt"), "A".repeat(1000)).unwrap();
    fs::write(
        files_dir.join("cases.csv"),
        "case,year\nDonoghue v Stevenson,1932\n",
    )
    .unwrap();
    fs::write(files_dir.join("slides.pptx"), b"not supported").unwrap();
    fs::write(files_dir.join("broken.txt"), [0xffu8, 0xfe, 0x00]).unwrap();
    fs::write(
        files_dir.join("tort.txt"),
        "A tort is a civil wrong that causes a claimant to suffer loss.",
    )
    .unwrap();

    let config_content = format!(
        r#"[chunking]
chunk_size = 500
overlap = 50

[retrieval]
top_k = 3

{}
"#,
        extra_config
    );
    let config_path = root.join("ragchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn file(tmp: &TempDir, name: &str) -> String {
    tmp.path()
        .join("files")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

async fn run_ragchat(
    config_path: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> (String, String, bool) {
    let binary = ragchat_binary();
    let mut cmd = tokio::process::Command::new(&binary);
    cmd.arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("GROQ_API_KEY")
        .env_remove("SERPAPI_API_KEY")
        .env_remove("RUST_LOG");
    for (key, value) in env {
        cmd.env(key, value);
    }
    let output = cmd
        .output()
        .await
        .unwrap_or_else(|e| panic!("Failed to run ragchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[tokio::test]
async fn test_ingest_reports_chunk_counts() {
    let (tmp, config) = setup_test_env("[embedding]\nprovider = \"disabled\"\n");
    let (stdout, stderr, ok) = run_ragchat(
        &config,
        &[
            "ingest",
            &file(&tmp, "long.txt"),
            &file(&tmp, "cases.csv"),
            &file(&tmp, "slides.pptx"),
            &file(&tmp, "broken.txt"),
        ],
        &[],
    )
    .await;

    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("long.txt: 3 chunks"), "stdout: {}", stdout);
    assert!(stdout.contains("cases.csv: 1 chunks"), "stdout: {}", stdout);
    assert!(stdout.contains("skipped: slides.pptx"), "stdout: {}", stdout);
    assert!(stdout.contains("failed: broken.txt"), "stdout: {}", stdout);
    assert!(
        stdout.contains("files: 2  chunks: 4  skipped: 1  failed: 1"),
        "stdout: {}",
        stdout
    );
}

#[tokio::test]
async fn test_invalid_chunking_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[chunking]\nchunk_size = 50\noverlap = 50\n").unwrap();
    fs::write(tmp.path().join("a.txt"), "hello").unwrap();

    let a = tmp.path().join("a.txt");
    let (_, stderr, ok) = run_ragchat(&config, &["ingest", a.to_str().unwrap()], &[]).await;
    assert!(!ok);
    assert!(stderr.contains("chunking"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_missing_config_file_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "x".repeat(600)).unwrap();
    let a = tmp.path().join("a.txt");
    let (stdout, stderr, ok) = run_ragchat(
        &tmp.path().join("absent.toml"),
        &["ingest", a.to_str().unwrap()],
        &[],
    )
    .await;
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("a.txt: 2 chunks"), "stdout: {}", stdout);
}

#[tokio::test]
async fn test_search_on_empty_store() {
    let (_tmp, config) = setup_test_env("[embedding]\nprovider = \"disabled\"\n");
    let (stdout, stderr, ok) = run_ragchat(&config, &["search", "negligence"], &[]).await;
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.contains("No results found."), "stdout: {}", stdout);
}

#[tokio::test]
async fn test_search_ranks_uploaded_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[1.0, 0.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let (tmp, config) = setup_test_env(&format!(
        "[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 3\nurl = \"{}\"\n",
        server.uri()
    ));
    let (stdout, stderr, ok) = run_ragchat(
        &config,
        &["search", "civil wrong", "--file", &file(&tmp, "tort.txt")],
        &[],
    )
    .await;

    assert!(ok, "search failed: {}", stderr);
    assert!(
        stdout.contains("1 documents added to knowledge base"),
        "stdout: {}",
        stdout
    );
    assert!(stdout.contains("1. [1.000] chunk 0"), "stdout: {}", stdout);
    assert!(stdout.contains("A tort is a civil wrong"), "stdout: {}", stdout);
}

#[tokio::test]
async fn test_ask_requires_groq_key() {
    let (_tmp, config) = setup_test_env("[embedding]\nprovider = \"disabled\"\n");
    let (_, stderr, ok) = run_ragchat(&config, &["ask", "what is a tort?"], &[]).await;
    assert!(!ok);
    assert!(stderr.contains("GROQ_API_KEY"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_ask_falls_back_to_web_search() {
    let server = MockServer::start().await;

    // First completion: the model doesn't know. Second: the final answer.
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "I don't know"}}]
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(body_string_contains("limitation periods run for six years"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Six years."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"snippet": "limitation periods run for six years"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_tmp, config) = setup_test_env(&format!(
        "[embedding]\nprovider = \"disabled\"\n\n[llm]\nbase_url = \"{uri}/openai/v1\"\n\n[web_search]\nendpoint = \"{uri}/search\"\n",
        uri = server.uri()
    ));
    let (stdout, stderr, ok) = run_ragchat(
        &config,
        &["ask", "how long is the limitation period?"],
        &[("GROQ_API_KEY", "gsk-test"), ("SERPAPI_API_KEY", "serp-test")],
    )
    .await;

    assert!(ok, "ask failed: {}", stderr);
    assert_eq!(stdout.trim(), "Six years.");
}

#[tokio::test]
async fn test_completions() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, ok) = run_ragchat(
        &tmp.path().join("absent.toml"),
        &["completions", "bash"],
        &[],
    )
    .await;
    assert!(ok);
    assert!(stdout.contains("ragchat"));
}
