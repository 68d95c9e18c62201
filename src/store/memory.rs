use super::{Message, MessageStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local message store
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<String, Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save(&self, message: &Message) -> Result<(), StoreError> {
        self.messages
            .write()
            .await
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.read().await.get(id).cloned())
    }
}
