//! HTTP client for the upstream provider

use super::{ApiError, ChatCompletionRequest};
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Response body as a stream of text lines, terminators stripped
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

pub enum UpstreamResponse {
    /// 2xx: the event stream
    Stream(LineStream),
    /// Non-2xx status with whatever body the provider sent
    Rejected { status: u16, body: String },
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamResponse::Stream(_) => f.write_str("Stream(..)"),
            UpstreamResponse::Rejected { status, body } => f
                .debug_struct("Rejected")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

/// Opens a streamed chat completion
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn open(&self, request: &ChatCompletionRequest) -> Result<UpstreamResponse, ApiError>;
}

/// reqwest-backed upstream for OpenAI-compatible providers
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl UpstreamClient {
    /// Credentials are checked per request, not here, so a misconfigured
    /// client still produces a proper error event for each message
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Upstream for UpstreamClient {
    async fn open(&self, request: &ChatCompletionRequest) -> Result<UpstreamResponse, ApiError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ApiError::Configuration("API key is not configured".into()))?;
        if self.base_url.trim().is_empty() {
            return Err(ApiError::Configuration("base URL is not configured".into()));
        }

        let url = self.endpoint();
        debug!(%url, model = %request.model, "Opening upstream stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Upstream rejected request");
            return Ok(UpstreamResponse::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(UpstreamResponse::Stream(split_lines(response.bytes_stream())))
    }
}

/// Longest line accepted from the upstream body
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

struct LineBuffer {
    bytes: Vec<u8>,
    /// Prefix of `bytes` already searched for a newline
    scanned: usize,
    max_line: usize,
    lines: VecDeque<String>,
    overflowed: bool,
    finished: bool,
}

impl LineBuffer {
    fn new(max_line: usize) -> Self {
        Self {
            bytes: Vec::new(),
            scanned: 0,
            max_line,
            lines: VecDeque::new(),
            overflowed: false,
            finished: false,
        }
    }

    // Splitting on raw bytes keeps multi-byte characters intact across chunks.
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.bytes[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            self.lines.push_back(decode(&self.bytes[start..=end]));
            start = end + 1;
            from = start;
        }
        self.bytes.drain(..start);
        self.scanned = self.bytes.len();
        if self.bytes.len() > self.max_line {
            self.overflowed = true;
        }
    }

    fn flush(&mut self) {
        if !self.bytes.is_empty() {
            let rest = std::mem::take(&mut self.bytes);
            self.lines.push_back(decode(&rest));
        }
        self.finished = true;
    }
}

fn decode(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Turn a chunked byte stream into a stream of lines. A transport error, or an
/// unterminated line growing past [`MAX_LINE_BYTES`], is yielded once and ends
/// the stream.
pub fn split_lines<S, B, E>(bytes: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    split_lines_capped(bytes, MAX_LINE_BYTES)
}

fn split_lines_capped<S, B, E>(bytes: S, max_line: usize) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let source = Box::pin(bytes);
    let lines = stream::unfold(
        (source, LineBuffer::new(max_line)),
        |(mut source, mut buffer)| async move {
            loop {
                if let Some(line) = buffer.lines.pop_front() {
                    return Some((Ok(line), (source, buffer)));
                }
                if buffer.finished {
                    return None;
                }
                if buffer.overflowed {
                    buffer.finished = true;
                    buffer.bytes.clear();
                    warn!(max_line = buffer.max_line, "Upstream line too long, dropping stream");
                    let error = ApiError::LineTooLong(buffer.max_line);
                    return Some((Err(error), (source, buffer)));
                }
                match source.next().await {
                    Some(Ok(chunk)) => buffer.push(chunk.as_ref()),
                    Some(Err(e)) => {
                        buffer.finished = true;
                        buffer.lines.clear();
                        return Some((Err(e.into()), (source, buffer)));
                    }
                    None => buffer.flush(),
                }
            }
        },
    );
    Box::pin(lines)
}
