//! Message persistence
//!
//! The relay only ever writes through [`MessageStore`]; conversation CRUD and
//! pagination live with whatever system owns the store.

mod file;
mod memory;

pub use file::JsonFileMessageStore;
pub use memory::InMemoryMessageStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Empty assistant message the relay fills in
    pub fn assistant(id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self::new(id, conversation_id, MessageRole::Assistant, String::new())
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = Utc::now();
    }
}

/// Persistence collaborator for messages; saving an existing id overwrites it
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save(&self, message: &Message) -> Result<(), StoreError>;
    async fn find(&self, id: &str) -> Result<Option<Message>, StoreError>;
}
