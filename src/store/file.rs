use super::{Message, MessageStore, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores each message as `<dir>/<id>.json`
#[derive(Debug, Clone)]
pub struct JsonFileMessageStore {
    dir: PathBuf,
}

impl JsonFileMessageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File the message `id` is written to. Bytes outside `[A-Za-z0-9_-]`
    /// are escaped as `%XX`, so distinct ids never share a file and none
    /// leaves the directory.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id)))
    }
}

fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

#[async_trait]
impl MessageStore for JsonFileMessageStore {
    async fn save(&self, message: &Message) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&message.id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(message)?;

        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(id = %message.id, path = %path.display(), "Message written");
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileMessageStore::new(dir.path().join("messages"));

        let mut message = Message::assistant("m-1", "c-1");
        message.set_content("Hello world");
        store.save(&message).await.unwrap();

        let loaded = store.find("m-1").await.unwrap().unwrap();
        assert_eq!(loaded, message);
        assert!(dir.path().join("messages/m-1.json").exists());
    }

    #[tokio::test]
    async fn test_missing_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileMessageStore::new(dir.path());
        assert!(store.find("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ids_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileMessageStore::new(dir.path());
        let message = Message::assistant("../evil", "c");
        store.save(&message).await.unwrap();

        assert!(dir.path().join("%2E%2E%2Fevil.json").exists());
        assert_eq!(store.find("../evil").await.unwrap().unwrap().id, "../evil");
    }

    #[tokio::test]
    async fn test_similar_ids_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileMessageStore::new(dir.path());
        assert_ne!(store.path_for("a/b"), store.path_for("a_b"));
        assert_ne!(store.path_for("a%2Fb"), store.path_for("a/b"));

        let mut slash = Message::assistant("a/b", "c");
        slash.set_content("slash");
        let mut underscore = Message::assistant("a_b", "c");
        underscore.set_content("underscore");
        store.save(&slash).await.unwrap();
        store.save(&underscore).await.unwrap();

        assert_eq!(store.find("a/b").await.unwrap().unwrap().content, "slash");
        assert_eq!(store.find("a_b").await.unwrap().unwrap().content, "underscore");
        assert!(store.path_for("a_b").ends_with("a_b.json"));
        assert!(store.path_for("a/b").exists());
    }
}
