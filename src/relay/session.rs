use super::{RelayState, Termination};
use crate::store::{Message, MessageStore};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

/// Assistant message being filled by one relay task
#[derive(Debug)]
pub struct StreamSession {
    message: Message,
    text: String,
    last_data: Instant,
    state: RelayState,
    streamed_chars: usize,
}

/// What a finished session left behind
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub message_id: String,
    pub state: RelayState,
    pub termination: Termination,
    /// Text written to the message store
    pub content: String,
    /// Whether any upstream content arrived
    pub had_content: bool,
    pub streamed_chars: usize,
    pub persisted: bool,
}

impl StreamSession {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            text: String::new(),
            last_data: Instant::now(),
            state: RelayState::Init,
            streamed_chars: 0,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message.id
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn begin_streaming(&mut self) {
        self.state = RelayState::Streaming;
        self.last_data = Instant::now();
    }

    pub fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
        self.streamed_chars += delta.chars().count();
        self.touch();
    }

    /// Record that real data arrived, content or not
    pub fn touch(&mut self) {
        self.last_data = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_data.elapsed()
    }

    /// Write the final text and end the session. Taking `self` makes this the
    /// only write a session can do; store failures are logged, not returned.
    pub async fn finish(
        self,
        state: RelayState,
        content: String,
        termination: Termination,
        store: &dyn MessageStore,
    ) -> SessionReport {
        let StreamSession {
            mut message,
            text,
            streamed_chars,
            ..
        } = self;

        message.set_content(content);
        let persisted = match store.save(&message).await {
            Ok(()) => {
                debug!(message_id = %message.id, %state, "Assistant message persisted");
                true
            }
            Err(e) => {
                error!(message_id = %message.id, error = %e, "Failed to persist assistant message");
                false
            }
        };

        SessionReport {
            message_id: message.id,
            state,
            termination,
            content: message.content,
            had_content: !text.is_empty(),
            streamed_chars,
            persisted,
        }
    }
}
