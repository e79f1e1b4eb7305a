use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// One saved conversation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub timestamp: i64,
}

/// Append-only conversation history, most-recent-first, persisted as a
/// single JSON file in the platform data directory.
pub struct HistoryStore {
    path: PathBuf,
    records: Vec<Conversation>,
}

impl HistoryStore {
    pub fn open() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("mathchat");
        Ok(Self::open_at(dir.join("history.json")))
    }

    /// A read failure is non-fatal: the store starts empty and logs why.
    pub fn open_at(path: PathBuf) -> Self {
        let records = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("history file unreadable, starting empty: {}", e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, records }
    }

    pub fn records(&self) -> &[Conversation] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Save the given messages as a new record, prepended to the list.
    /// Empty conversations are not recorded. Saving twice creates two
    /// records even with identical content.
    pub fn save(&mut self, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let timestamp = now_millis();
        let record = Conversation {
            id: timestamp.to_string(),
            title: derive_title(messages),
            messages: messages.to_vec(),
            timestamp,
        };
        self.records.insert(0, record);
        self.persist()
    }

    /// Fetch a stored record's messages verbatim. The caller replaces the
    /// active message list and closes the history view.
    pub fn load(&self, id: &str) -> Option<Vec<Message>> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.messages.clone())
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&self.records)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Title = first 50 characters of the first message plus an ellipsis.
fn derive_title(messages: &[Message]) -> String {
    let first = messages.first().map(|m| m.content.as_str()).unwrap_or("");
    let mut title: String = first.chars().take(50).collect();
    title.push_str("...");
    title
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> HistoryStore {
        HistoryStore::open_at(dir.path().join("history.json"))
    }

    #[test]
    fn title_is_first_fifty_chars_plus_ellipsis() {
        let long = "x".repeat(80);
        let title = derive_title(&[Message::user(long.clone())]);
        assert_eq!(title, format!("{}...", &long[..50]));
    }

    #[test]
    fn short_title_keeps_whole_content() {
        let title = derive_title(&[Message::user("hello")]);
        assert_eq!(title, "hello...");
    }

    #[test]
    fn save_then_load_round_trips_messages() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let messages = vec![
            Message::user("what is $e^{i\\pi}$?"),
            Message::assistant("$-1$, by Euler's identity."),
        ];
        store.save(&messages).unwrap();

        let id = store.records()[0].id.clone();
        let loaded = store.load(&id).unwrap();
        assert_eq!(loaded, messages);

        // Reopen from disk and check persistence
        let reopened = store_in(&dir);
        assert_eq!(reopened.records().len(), 1);
        assert_eq!(reopened.load(&id).unwrap(), messages);
    }

    #[test]
    fn records_are_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.save(&[Message::user("first")]).unwrap();
        store.save(&[Message::user("second")]).unwrap();
        assert_eq!(store.records()[0].title, "second...");
        assert_eq!(store.records()[1].title, "first...");
    }

    #[test]
    fn saving_twice_duplicates_rather_than_dedupes() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let messages = vec![Message::user("same")];
        store.save(&messages).unwrap();
        store.save(&messages).unwrap();
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn empty_conversation_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.save(&[]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_file_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();
        let store = HistoryStore::open_at(path);
        assert!(store.is_empty());
    }
}
