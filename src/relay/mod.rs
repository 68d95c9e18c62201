//! Streaming relay
//!
//! Each message gets one task that walks INIT → STREAMING → {DONE, TIMEOUT,
//! ERROR}: it forwards upstream deltas to the consumer as they arrive,
//! accumulates the full answer and persists exactly one final text for the
//! assistant message, whatever ends the stream.

mod machine;
mod service;
mod session;

pub use machine::Relay;
pub use service::{PromptPipeline, RelayHandle, RelayService, SendRequest};
pub use session::{SessionReport, StreamSession};

use crate::config::RelaySettings;
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Persisted (with an `Error: ` prefix) when the upstream produced no content
pub const NO_DATA_ERROR: &str = "no valid response data received";

/// Payload of the `init` event
pub const INIT_MESSAGE: &str = "connection established";

/// Events delivered to the downstream consumer, in order:
/// `Init`, any number of `Message`, then exactly one of `Done` or `Error`
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Init(String),
    /// One content delta; consumers concatenate them
    Message(String),
    /// Full accumulated text
    Done(String),
    Error(String),
}

impl RelayEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            RelayEvent::Init(_) => "init",
            RelayEvent::Message(_) => "message",
            RelayEvent::Done(_) => "done",
            RelayEvent::Error(_) => "error",
        }
    }

    /// Wire payload; deltas are wrapped the way upstream chunks are
    pub fn data(&self) -> String {
        match self {
            RelayEvent::Message(delta) => {
                json!({ "choices": [{ "delta": { "content": delta } }] }).to_string()
            }
            RelayEvent::Init(text) | RelayEvent::Done(text) | RelayEvent::Error(text) => {
                text.clone()
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayEvent::Done(_) | RelayEvent::Error(_))
    }

    /// Server-sent-event framing; multi-line payloads get one `data:` line each
    pub fn to_sse(&self) -> String {
        let mut frame = format!("event: {}\n", self.event_name());
        for line in self.data().split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Init,
    Streaming,
    Done,
    Timeout,
    Error,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Init => "init",
            RelayState::Streaming => "streaming",
            RelayState::Done => "done",
            RelayState::Timeout => "timeout",
            RelayState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Why a session stopped
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// `data: [DONE]` received
    Done,
    /// Upstream closed the stream without `[DONE]`
    Closed,
    /// No real data within the inactivity timeout
    Stalled,
    /// Non-2xx upstream status
    Rejected { status: u16, body: String },
    /// Configuration, transport or I/O failure
    Failed(String),
    /// The downstream consumer went away
    Disconnected,
    /// The overall stream deadline passed
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Longest gap between real data lines before the stream counts as stalled
    pub inactivity_timeout: Duration,
    /// Upper bound on one whole session
    pub stream_timeout: Duration,
    /// Capacity of the downstream event channel
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(30 * 60),
            channel_capacity: 64,
        }
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(settings.inactivity_timeout_secs),
            stream_timeout: Duration::from_secs(settings.stream_timeout_secs),
            channel_capacity: settings.channel_capacity.max(1),
        }
    }
}
