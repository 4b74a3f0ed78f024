//! Integration tests for streaming generations
//!
//! A throwaway TCP listener plays the part of the Ollama server, so these
//! run without a model installed.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use neurochat::chat::{ChatSession, ChatStore, Message, SessionEmoji, SessionState};
use neurochat::config::ChatProfile;
use neurochat::ollama::{GenerateRequest, OllamaClient, StopFlag, StreamChunk, StreamError};

/// Canned HTTP response served to a single client
struct Canned {
    status: &'static str,
    chunks: Vec<String>,
}

impl Canned {
    fn ok(chunks: &[&str]) -> Self {
        Self {
            status: "200 OK",
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Serve one request; the handle resolves to the request body
async fn serve_once(canned: Canned) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let body = read_request_body(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
            canned.status
        );
        let _ = socket.write_all(head.as_bytes()).await;
        for chunk in canned.chunks {
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                break;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = socket.shutdown().await;
        body
    });

    (base_url, handle)
}

async fn read_request_body(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf[header_end..]).to_string()
}

fn profile(base_url: &str) -> ChatProfile {
    ChatProfile {
        model: "qwen2.5:0.5b".to_string(),
        system: "You are a Physics book Writer".to_string(),
        num_ctx: 100_000,
        base_url: base_url.to_string(),
    }
}

fn frame(text: &str) -> String {
    format!("{}\n", serde_json::json!({ "response": text, "done": false }))
}

/// A full turn: request shape, streamed fragments and the saved transcript
#[tokio::test]
async fn test_turn_against_server() {
    let (base_url, server) = serve_once(Canned::ok(&[
        &frame("En"),
        &frame("tropy "),
        &frame("is..."),
        "{\"response\":\"\",\"done\":true,\"eval_count\":3,\"eval_duration\":1200}\n",
    ]))
    .await;

    let dir = tempfile::tempdir().unwrap();
    let store = ChatStore::open(dir.path()).unwrap();
    let client = OllamaClient::new(&base_url);
    let mut session = ChatSession::with_emoji("🌟".parse::<SessionEmoji>().unwrap());

    let mut fragments = Vec::new();
    let outcome = session
        .submit(&client, &store, &profile(&base_url), "Explain entropy", |f| {
            fragments.push(f.to_string())
        })
        .await
        .unwrap();

    assert_eq!(fragments, vec!["En", "tropy ", "is...", ""]);
    assert_eq!(outcome.response, "Entropy is...");
    assert!(outcome.diagnostics.is_empty());
    assert_eq!(outcome.stats.as_ref().map(|s| s.eval_count), Some(3));
    assert_eq!(session.state(), SessionState::Idle);

    let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(request["model"], "qwen2.5:0.5b");
    assert_eq!(request["prompt"], "Explain entropy");
    assert_eq!(request["system"], "You are a Physics book Writer");
    assert_eq!(request["num_ctx"], 100_000);
    assert_eq!(request["stream"], true);

    let saved = std::fs::read_to_string(dir.path().join("🌟_Explain_entropy.md")).unwrap();
    assert_eq!(
        saved,
        "# Chat Session 🌟\n\n**User:** Explain entropy\n\n**Assistant:** Entropy is...\n\n"
    );
}

/// A rejected request yields a diagnostic and an empty reply
#[tokio::test]
async fn test_server_error_gives_empty_reply() {
    let (base_url, server) = serve_once(Canned {
        status: "404 Not Found",
        chunks: vec!["{\"error\":\"model 'nope' not found\"}".to_string()],
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let store = ChatStore::open(dir.path()).unwrap();
    let client = OllamaClient::new(&base_url);
    let mut session = ChatSession::new();

    let outcome = session
        .submit(&client, &store, &profile(&base_url), "hello", |_| {})
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(outcome.response, "");
    assert!(!outcome.cancelled);
    assert_eq!(outcome.diagnostics.len(), 1);
    match &outcome.diagnostics[0] {
        StreamError::Transport(msg) => {
            assert!(msg.contains("404"));
            assert!(msg.contains("not found"));
        }
        other => panic!("expected transport error, got {:?}", other),
    }
    assert_eq!(
        session.messages(),
        &[Message::user("hello"), Message::assistant("")]
    );
    assert!(outcome.saved_to.is_some());
}

/// Malformed frames are reported and skipped
#[tokio::test]
async fn test_malformed_frame_mid_stream() {
    let (base_url, server) =
        serve_once(Canned::ok(&[&frame("a"), "{garbage\n", &frame("b")])).await;

    let dir = tempfile::tempdir().unwrap();
    let store = ChatStore::open(dir.path()).unwrap();
    let client = OllamaClient::new(&base_url);
    let mut session = ChatSession::new();

    let outcome = session
        .submit(&client, &store, &profile(&base_url), "hi", |_| {})
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(outcome.response, "ab");
    assert!(matches!(
        outcome.diagnostics.as_slice(),
        [StreamError::Decode { .. }]
    ));
}

/// Stopping after two fragments keeps exactly those two
#[tokio::test]
async fn test_stop_mid_generation() {
    let frames: Vec<String> = (0..6).map(|i| frame(&format!("w{} ", i))).collect();
    let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
    let (base_url, server) = serve_once(Canned::ok(&frames)).await;

    let dir = tempfile::tempdir().unwrap();
    let store = ChatStore::open(dir.path()).unwrap();
    let client = OllamaClient::new(&base_url);
    let mut session = ChatSession::new();
    let stop = session.stop_flag();

    let mut seen = 0;
    let outcome = session
        .submit(&client, &store, &profile(&base_url), "count", |_| {
            seen += 1;
            if seen == 2 {
                stop.request();
            }
        })
        .await
        .unwrap();
    let _ = server.await;

    assert!(outcome.cancelled);
    assert_eq!(outcome.response, "w0 w1 ");
    assert!(!session.stop_flag().is_requested());
    assert_eq!(session.messages()[1], Message::assistant("w0 w1 "));
    assert_eq!(session.state(), SessionState::Idle);
}

/// The raw stream API, including the final stats
#[tokio::test]
async fn test_generate_stream_items() {
    let (base_url, server) = serve_once(Canned::ok(&[
        "{\"response\":\"Hel",
        "lo\"}\n{\"response\":\"!\",\"done\":true,\"eval_count\":2}",
    ]))
    .await;

    let client = OllamaClient::new(&base_url);
    let request = GenerateRequest {
        model: "m".to_string(),
        prompt: "p".to_string(),
        system: "s".to_string(),
        num_ctx: 1024,
    };

    use futures_util::StreamExt;
    let items: Vec<_> = client
        .generate_stream(&request, &StopFlag::new())
        .await
        .collect()
        .await;
    server.await.unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items[0], Ok(StreamChunk::Token("Hello".to_string())));
    assert_eq!(items[1], Ok(StreamChunk::Token("!".to_string())));
    assert!(matches!(&items[2], Ok(StreamChunk::Done(stats)) if stats.eval_count == 2));
}

/// Non-streaming collection
#[tokio::test]
async fn test_generate_collects_text() {
    let (base_url, server) =
        serve_once(Canned::ok(&[&frame("foo"), &frame("bar")])).await;

    let client = OllamaClient::new(&base_url);
    let request = GenerateRequest {
        model: "m".to_string(),
        prompt: "p".to_string(),
        system: "s".to_string(),
        num_ctx: 1024,
    };
    let response = client.generate(&request).await.unwrap();
    server.await.unwrap();

    assert_eq!(response.response, "foobar");
    assert!(response.stats.is_none());
}

/// Installed model names come from /api/tags
#[tokio::test]
async fn test_list_models() {
    let (base_url, server) = serve_once(Canned::ok(&[
        "{\"models\":[{\"name\":\"qwen2.5:0.5b\",\"size\":1},{\"name\":\"llama3.2:latest\"}]}",
    ]))
    .await;

    let client = OllamaClient::new(&base_url);
    let models = client.list_models().await.unwrap();
    server.await.unwrap();

    assert_eq!(models, vec!["qwen2.5:0.5b", "llama3.2:latest"]);
}
