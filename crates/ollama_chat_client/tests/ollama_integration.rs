//! HTTP transport tests: the real Ollama client against a minimal in-process
//! HTTP/1.1 server that streams NDJSON. No mocks.

use futures_util::StreamExt;
use ollama_chat_client::{ChatSession, OllamaConnector, Turn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Request line and body of one received HTTP request.
struct Received {
    request_line: String,
    body: serde_json::Value,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_request(stream: &mut TcpStream) -> Received {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending body");
        buf.extend_from_slice(&chunk[..n]);
    }
    Received {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: serde_json::from_slice(&buf[body_start..body_start + content_length]).unwrap(),
    }
}

/// Serve one request: answer with `status` and NDJSON `lines`, written one at a time.
async fn serve_once(status: &'static str, lines: Vec<&'static str>) -> (String, oneshot::Receiver<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut tcp, _) = listener.accept().await.unwrap();
        let received = read_request(&mut tcp).await;
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
            status
        );
        tcp.write_all(head.as_bytes()).await.unwrap();
        for line in lines {
            tcp.write_all(line.as_bytes()).await.unwrap();
            tcp.write_all(b"\n").await.unwrap();
            tcp.flush().await.unwrap();
        }
        let _ = tcp.shutdown().await;
        let _ = tx.send(received);
    });
    (format!("http://127.0.0.1:{}", port), rx)
}

fn replies(updates: &[(String, Vec<Turn>)]) -> Vec<String> {
    updates
        .iter()
        .map(|(_, h)| h.last().unwrap().assistant_text.clone())
        .collect()
}

#[tokio::test]
async fn streams_accumulated_reply_from_server() {
    let (host, received) = serve_once(
        "200 OK",
        vec![
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hel"},"done":false}"#,
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"lo"},"done":false}"#,
            r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#,
        ],
    )
    .await;

    let mut session = ChatSession::new(OllamaConnector::default());
    let prior = vec![Turn {
        user_text: "earlier".into(),
        assistant_text: "answer".into(),
    }];
    let updates: Vec<_> = session
        .submit("hi", Some(prior), "llama3.2", &host)
        .collect()
        .await;

    assert_eq!(replies(&updates), vec!["Hel", "Hello", "Hello"]);
    assert_eq!(updates.last().unwrap().1.len(), 2);

    let received = received.await.unwrap();
    assert!(received.request_line.starts_with("POST /api/chat "));
    assert_eq!(received.body["model"], "llama3.2");
    assert_eq!(received.body["stream"], true);
    let messages = received.body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["content"], "earlier");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[3]["content"], "hi");
}

#[tokio::test]
async fn host_without_scheme_is_reached_over_http() {
    let (host, received) = serve_once(
        "200 OK",
        vec![r#"{"message":{"role":"assistant","content":"ok"},"done":true}"#],
    )
    .await;
    let bare = host.trim_start_matches("http://").to_string() + "/";

    let mut session = ChatSession::new(OllamaConnector::default());
    let updates: Vec<_> = session.submit("hi", None, "m", &bare).collect().await;
    assert_eq!(replies(&updates), vec!["ok"]);
    assert!(received.await.is_ok());
}

#[tokio::test]
async fn http_error_becomes_error_reply() {
    let (host, _received) = serve_once(
        "404 Not Found",
        vec![r#"{"error":"model \"nope\" not found, try pulling it first"}"#],
    )
    .await;

    let mut session = ChatSession::new(OllamaConnector::default());
    let updates: Vec<_> = session.submit("hi", None, "nope", &host).collect().await;

    assert_eq!(
        replies(&updates),
        vec!["Error: HTTP 404: model \"nope\" not found, try pulling it first"]
    );
}

#[tokio::test]
async fn error_line_mid_stream_ends_reply() {
    let (host, _received) = serve_once(
        "200 OK",
        vec![
            r#"{"message":{"role":"assistant","content":"Par"},"done":false}"#,
            r#"{"error":"model runner has unexpectedly stopped"}"#,
        ],
    )
    .await;

    let mut session = ChatSession::new(OllamaConnector::default());
    let updates: Vec<_> = session.submit("hi", None, "m", &host).collect().await;

    assert_eq!(
        replies(&updates),
        vec!["Par", "Error: model runner has unexpectedly stopped"]
    );
}

#[tokio::test]
async fn unreachable_host_yields_one_error() {
    // Bind then drop to get a port nobody listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let host = format!("http://127.0.0.1:{}", port);

    let mut session = ChatSession::new(OllamaConnector::default());
    let updates: Vec<_> = session.submit("hi", None, "m", &host).collect().await;

    assert_eq!(updates.len(), 1);
    let text = &updates[0].1[0].assistant_text;
    assert!(text.starts_with("Error: request failed"), "got {}", text);
    assert_eq!(session.client().connected_host(), Some(host.as_str()));
}
