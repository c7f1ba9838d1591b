//! Inference client wrapper: one lazily (re)built connection per wrapper, plus the
//! HTTP transport that streams `/api/chat` replies as NDJSON.

use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, trace};

use crate::messages::{ChatChunk, ChatRequest, ErrorBody};

/// Errors raised while talking to the inference server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The host string could not be turned into a client.
    #[error("cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    /// Sending the request or reading the response failed.
    #[error("request failed: {0}")]
    Request(String),

    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The server reported an error inside the stream.
    #[error("{0}")]
    Server(String),

    /// A stream line was not valid chat JSON.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The byte stream broke off.
    #[error("stream error: {0}")]
    Stream(String),
}

impl ClientError {
    /// Build an [`ClientError::Http`], unwrapping Ollama's `{"error": "..."}` body.
    pub fn from_error_body(status: u16, body: String) -> Self {
        let body = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error,
            Err(_) => body,
        };
        ClientError::Http { status, body }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Request(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

/// Stream of decoded chunks for one chat request.
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, ClientError>>;

/// Something that can stream a chat reply.
pub trait ChatBackend {
    /// The request goes out when the stream is first polled. Every failure,
    /// including an unreachable host, arrives as a stream item.
    fn chat(&self, request: ChatRequest) -> ChunkStream;
}

/// Builds a [`ChatBackend`] bound to a host.
pub trait Connector {
    type Handle: ChatBackend;

    fn connect(&self, host: &str) -> Result<Self::Handle, ClientError>;
}

/// Connection state of an [`InferenceClient`].
#[derive(Debug)]
pub enum ConnectionState<H> {
    Disconnected,
    ConnectedTo { host: String, handle: H },
}

impl<H> ConnectionState<H> {
    pub fn host(&self) -> Option<&str> {
        match self {
            ConnectionState::Disconnected => None,
            ConnectionState::ConnectedTo { host, .. } => Some(host),
        }
    }

    /// True unless already connected to exactly `host`.
    pub fn needs_reconnect(&self, host: &str) -> bool {
        match self {
            ConnectionState::Disconnected => true,
            ConnectionState::ConnectedTo { host: current, .. } => current != host,
        }
    }
}

/// Owns at most one connection handle and swaps it when the requested host changes.
///
/// Not safe for concurrent reconnection; callers serialize access through `&mut self`.
pub struct InferenceClient<C: Connector> {
    connector: C,
    state: ConnectionState<C::Handle>,
}

impl<C: Connector> InferenceClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> &ConnectionState<C::Handle> {
        &self.state
    }

    pub fn connected_host(&self) -> Option<&str> {
        self.state.host()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Make sure the live handle is bound to `host`, rebuilding it on mismatch.
    ///
    /// On a failed connect the wrapper is left disconnected so the next call retries.
    pub fn ensure_connected(&mut self, host: &str) -> Result<&C::Handle, ClientError> {
        if self.state.needs_reconnect(host) {
            if let Some(previous) = self.state.host() {
                debug!(from = previous, to = host, "inference host changed, reconnecting");
            }
            // Old handle is dropped before the new one exists.
            self.state = ConnectionState::Disconnected;
            let handle = self.connector.connect(host)?;
            debug!(host, "connected to inference host");
            self.state = ConnectionState::ConnectedTo {
                host: host.to_string(),
                handle,
            };
        }
        match &self.state {
            ConnectionState::ConnectedTo { handle, .. } => Ok(handle),
            ConnectionState::Disconnected => Err(ClientError::Connect {
                host: host.to_string(),
                reason: "no connection".into(),
            }),
        }
    }
}

// ── HTTP transport ──────────────────────────────────────────────────────

/// Builds [`OllamaClient`]s. Connecting only prepares the HTTP client; nothing
/// touches the network until a chat stream is polled.
#[derive(Debug, Clone, Default)]
pub struct OllamaConnector {
    /// Whole-request timeout. `None` lets long generations run.
    pub timeout: Option<Duration>,
}

impl Connector for OllamaConnector {
    type Handle = OllamaClient;

    fn connect(&self, host: &str) -> Result<OllamaClient, ClientError> {
        let base_url = normalize_host(host)?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| ClientError::Connect {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
        Ok(OllamaClient { http, base_url })
    }
}

/// Turn a user-entered host into a base URL: default scheme `http`, no trailing slash.
pub fn normalize_host(host: &str) -> Result<String, ClientError> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(ClientError::Connect {
            host: host.to_string(),
            reason: "empty host".into(),
        });
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let url = reqwest::Url::parse(&with_scheme).map_err(|e| ClientError::Connect {
        host: host.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ClientError::Connect {
            host: host.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// HTTP handle bound to one Ollama host.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

impl ChatBackend for OllamaClient {
    fn chat(&self, request: ChatRequest) -> ChunkStream {
        let http = self.http.clone();
        let url = self.chat_url();
        stream::once(async move { send_chat(&http, &url, &request).await })
            .flat_map(|sent| match sent {
                Ok(response) => parse_ndjson_stream(response.bytes_stream()).boxed(),
                Err(e) => stream::iter(std::iter::once(Err(e))).boxed(),
            })
            .boxed()
    }
}

async fn send_chat(
    http: &reqwest::Client,
    url: &str,
    request: &ChatRequest,
) -> Result<reqwest::Response, ClientError> {
    debug!(
        url,
        model = %request.model,
        messages = request.messages.len(),
        "sending chat request"
    );
    let response = http.post(url).json(request).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::from_error_body(status.as_u16(), body));
    }
    Ok(response)
}

// ── NDJSON framing ──────────────────────────────────────────────────────

struct NdjsonState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl<S> NdjsonState<S> {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        Some(line)
    }
}

/// Split a byte stream into newline-delimited JSON chunks.
///
/// Blank lines are skipped, a line carrying `error` becomes [`ClientError::Server`],
/// and a trailing line without a newline is decoded at end of stream.
pub fn parse_ndjson_stream<S, B, E>(
    bytes: S,
) -> impl Stream<Item = Result<ChatChunk, ClientError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let state = NdjsonState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.next_line() {
                match decode_line(&line) {
                    Some(item) => return Some((item, state)),
                    None => continue,
                }
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(ClientError::Stream(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    let rest = std::mem::take(&mut state.buffer);
                    return decode_line(&rest).map(|item| (item, state));
                }
            }
        }
    })
}

fn decode_line(line: &[u8]) -> Option<Result<ChatChunk, ClientError>> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => return Some(Err(ClientError::Decode(e.to_string()))),
    };
    if text.is_empty() {
        return None;
    }
    let chunk = match ChatChunk::from_line(text) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(e.into())),
    };
    if let Some(message) = &chunk.error {
        return Some(Err(ClientError::Server(message.clone())));
    }
    trace!(done = chunk.done, "chat chunk");
    Some(Ok(chunk))
}
