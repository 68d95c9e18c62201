//! Upstream chat-completions API: request types, streamed line parsing and
//! the HTTP client

mod client;
mod request;
mod sse;

pub use client::{split_lines, LineStream, Upstream, UpstreamClient, UpstreamResponse};
pub use request::{ChatCompletionRequest, ChatMessage, Role};
pub use sse::{parse_upstream_line, UpstreamLine};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream line exceeded {0} bytes")]
    LineTooLong(usize),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
