//! Line classification for OpenAI-compatible event streams
//!
//! - `: ...` comment lines are keep-alives
//! - `data: {"choices":[{"delta":{"content":"..."}}]}` carries a delta
//! - `data: [DONE]` ends the stream
//! - anything else (blank lines, `event:`, `id:`) is ignored

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamLine {
    KeepAlive,
    Ignored,
    Done,
    /// Non-empty content delta
    Delta(String),
    /// Valid data line without content (role announcement, finish reason...)
    Empty,
    /// Data line whose payload is not JSON
    Malformed(String),
}

pub fn parse_upstream_line(line: &str) -> UpstreamLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.starts_with(':') {
        return UpstreamLine::KeepAlive;
    }

    let Some(data) = line.strip_prefix("data:") else {
        return UpstreamLine::Ignored;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return UpstreamLine::Done;
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return UpstreamLine::Malformed(e.to_string()),
    };

    match json["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => UpstreamLine::Delta(content.to_string()),
        _ => UpstreamLine::Empty,
    }
}
