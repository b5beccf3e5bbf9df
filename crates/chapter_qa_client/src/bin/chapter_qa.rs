//! chapter-qa: CLI for book-chapter Q&A.
//! Reads config, fetches a chapter from the server, sends a question (from
//! the command line or stdin), and prints the streamed answer to stdout.
//!
//! Usage: chapter-qa [--config <path>] <chapter-index> [question]

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use chapter_qa_client::{config, ChatSession, QaClient};

fn resolve_config_path(args: &[String]) -> PathBuf {
    // 1. --config <path> flag
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(path) = args.get(pos + 1) {
            return PathBuf::from(path);
        }
    }
    // 2. CHAPTER_QA_CONFIG env var
    if let Ok(val) = std::env::var("CHAPTER_QA_CONFIG") {
        return PathBuf::from(val);
    }
    // 3. Default path (~/.chapter-qa/config.yaml)
    config::default_config_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine config path (set --config or CHAPTER_QA_CONFIG)");
        process::exit(1);
    })
}

/// Positional args with the `--config <path>` pair removed.
fn positional_args(args: &[String]) -> Vec<String> {
    let mut rest = Vec::new();
    let mut skip = false;
    for arg in &args[1..] {
        if skip {
            skip = false;
            continue;
        }
        if arg == "--config" {
            skip = true;
            continue;
        }
        rest.push(arg.clone());
    }
    rest
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chapter_qa_client=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = resolve_config_path(&args);

    let cfg = match config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Error: failed to load config from {}: {}",
                config_path.display(),
                e
            );
            process::exit(1);
        }
    };

    let positional = positional_args(&args);
    let chapter_index: usize = match positional.first().map(|s| s.parse()) {
        Some(Ok(idx)) => idx,
        _ => {
            eprintln!("Usage: chapter-qa [--config <path>] <chapter-index> [question]");
            process::exit(1);
        }
    };

    // Question from the second positional argument, or the first stdin line.
    let question = match positional.get(1) {
        Some(q) => q.clone(),
        None => {
            let stdin = io::stdin();
            let mut line = String::new();
            stdin.lock().read_line(&mut line).unwrap_or(0);
            line.trim().to_string()
        }
    };

    if question.is_empty() {
        eprintln!("Error: no question provided");
        process::exit(1);
    }

    let client = match QaClient::from_config(&cfg) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    // Run the fetch-then-ask flow on a tokio runtime.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    rt.block_on(async {
        let mut session = ChatSession::new();

        let chapter_content = match client.select_chapter(&mut session, chapter_index).await {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: failed to fetch chapter {}: {}", chapter_index, e);
                process::exit(1);
            }
        };

        let mut stream = match client.ask(&mut session, &question, &chapter_content).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: question failed: {}", e);
                process::exit(1);
            }
        };

        let stdout = io::stdout();
        let mut out = stdout.lock();

        loop {
            match stream.next().await {
                Ok(Some(update)) => {
                    let _ = write!(out, "{}", update.fragment);
                    let _ = out.flush();
                }
                Ok(None) => {
                    // Newline after the answer text.
                    let _ = writeln!(out);
                    break;
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
        }
    });
}
