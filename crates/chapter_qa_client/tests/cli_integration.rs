//! Integration tests for the chapter-qa CLI binary. Uses assert_cmd to run
//! the binary, a real temp config, and an in-process HTTP server. No mocks.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write as _;
use std::net::TcpListener as StdTcpListener;

/// Pick a free port by binding to :0 and extracting the assigned port.
fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Write a minimal YAML config to a temp file pointing at `port`.
fn write_config(dir: &tempfile::TempDir, port: u16) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "server:\n  base_url: http://127.0.0.1:{}\n  csrf_token: test-token",
        port
    )
    .unwrap();
    path
}

/// Spawn a minimal HTTP server that serves the chapter fetch and then the
/// /ask request as two sequential connections, then exits.
fn spawn_test_server(port: u16) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
                .await
                .unwrap();

            for _ in 0..2 {
                let (mut stream, _) = listener.accept().await.unwrap();

                // Read the whole request: headers plus Content-Length body.
                let mut buf = Vec::new();
                let mut tmp = [0u8; 4096];
                let request = loop {
                    let n = stream.read(&mut tmp).await.unwrap();
                    buf.extend_from_slice(&tmp[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(pos) = text.find("\r\n\r\n") {
                        let content_length = text
                            .lines()
                            .find_map(|l| {
                                let lower = l.to_ascii_lowercase();
                                lower
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap())
                            })
                            .unwrap_or(0);
                        if text.len() >= pos + 4 + content_length {
                            break text;
                        }
                    }
                    if n == 0 {
                        break text;
                    }
                };

                if request.starts_with("GET /chapter/") {
                    let body = "<p>Chapter body</p>";
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    stream.write_all(response.as_bytes()).await.unwrap();
                } else {
                    // POST /ask: stream two SSE records.
                    let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
                    stream.write_all(head.as_bytes()).await.unwrap();
                    stream
                        .write_all(b"data: {\"content\":\"Test \"}\n\n")
                        .await
                        .unwrap();
                    stream
                        .write_all(b"data: {\"content\":\"answer.\"}\n\n")
                        .await
                        .unwrap();
                }
                let _ = stream.shutdown().await;
            }
        });
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn cli_prints_streamed_answer() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = spawn_test_server(port);
    std::thread::sleep(std::time::Duration::from_millis(100));

    let mut cmd = Command::from(cargo_bin_cmd!("chapter-qa"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("0")
        .arg("What is this chapter about?");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn cli_reads_question_from_stdin_with_config_env_var() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = spawn_test_server(port);
    std::thread::sleep(std::time::Duration::from_millis(100));

    let mut cmd = Command::from(cargo_bin_cmd!("chapter-qa"));
    cmd.env("CHAPTER_QA_CONFIG", &config_path)
        .arg("0")
        .write_stdin("What is this chapter about?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn cli_without_chapter_index_shows_usage() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, free_port());

    let mut cmd = Command::from(cargo_bin_cmd!("chapter-qa"));
    cmd.arg("--config").arg(&config_path);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn cli_server_down_shows_error() {
    // Point the config at a port where nothing is listening.
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::from(cargo_bin_cmd!("chapter-qa"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("0")
        .arg("hello?");

    cmd.assert()
        .failure()
        .stderr(predicate::str::is_match("(?i)(connect|error|refused)").unwrap());
}
