use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AgnoError, Result};
use crate::message::Message;
use crate::time::current_utc_str;

/// In-memory transcript storage.
#[derive(Default, Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A free-text note about a user, handed to a memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub memory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl MemoryRecord {
    pub fn new(memory: impl Into<String>) -> Self {
        Self {
            memory: memory.into(),
            topic: None,
            input: None,
            id: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// How stored memories are selected for a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRetrieval {
    #[default]
    LastN,
    FirstN,
    Semantic,
}

impl MemoryRetrieval {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRetrieval::LastN => "last_n",
            MemoryRetrieval::FirstN => "first_n",
            MemoryRetrieval::Semantic => "semantic",
        }
    }
}

impl fmt::Display for MemoryRetrieval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryRetrieval {
    type Err = AgnoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last_n" => Ok(MemoryRetrieval::LastN),
            "first_n" => Ok(MemoryRetrieval::FirstN),
            "semantic" => Ok(MemoryRetrieval::Semantic),
            other => Err(AgnoError::unknown_variant("memory retrieval", other)),
        }
    }
}

/// A stored memory together with its owner and bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub memory: MemoryRecord,
    pub created_at: String,
    pub updated_at: String,
}

#[async_trait]
pub trait MemoryDb: Send + Sync {
    /// Inserts the record, or replaces the stored row with the same id. Returns the row id.
    async fn upsert(&self, user_id: Option<&str>, record: MemoryRecord) -> Result<String>;

    /// Reads memories for `user_id` (every user when `None`), in insertion order.
    async fn read(
        &self,
        user_id: Option<&str>,
        retrieval: MemoryRetrieval,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRow>>;

    async fn delete(&self, id: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryMemoryDb {
    rows: RwLock<Vec<MemoryRow>>,
}

#[async_trait]
impl MemoryDb for InMemoryMemoryDb {
    async fn upsert(&self, user_id: Option<&str>, mut record: MemoryRecord) -> Result<String> {
        let id = record
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let now = current_utc_str();
        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.iter_mut().find(|row| row.id == id) {
            existing.user_id = user_id.map(str::to_string);
            existing.memory = record;
            existing.updated_at = now;
        } else {
            rows.push(MemoryRow {
                id: id.clone(),
                user_id: user_id.map(str::to_string),
                memory: record,
                created_at: now.clone(),
                updated_at: now,
            });
        }
        tracing::debug!(memory_id = %id, "stored memory");
        Ok(id)
    }

    async fn read(
        &self,
        user_id: Option<&str>,
        retrieval: MemoryRetrieval,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRow>> {
        let rows = self.rows.read().await;
        let matching: Vec<MemoryRow> = rows
            .iter()
            .filter(|row| user_id.map_or(true, |user| row.user_id.as_deref() == Some(user)))
            .cloned()
            .collect();
        let limit = limit.unwrap_or(matching.len());
        match retrieval {
            MemoryRetrieval::FirstN => Ok(matching.into_iter().take(limit).collect()),
            MemoryRetrieval::LastN => {
                let skip = matching.len().saturating_sub(limit);
                Ok(matching.into_iter().skip(skip).collect())
            }
            MemoryRetrieval::Semantic => Err(AgnoError::Unsupported(
                "semantic memory retrieval needs an embedding-backed memory store".into(),
            )),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        Ok(rows.len() != before)
    }

    async fn clear(&self) -> Result<()> {
        self.rows.write().await.clear();
        Ok(())
    }
}
