use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A finished user/assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub session_id: Uuid,
    pub user_id: String,
    pub user_message: String,
    pub assistant_text: String,
    /// Tool the model reported using, if tool tracking was on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub user_at: DateTime<Utc>,
    pub assistant_at: DateTime<Utc>,
}

/// Durable record of exchanges.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn persist_exchange(&self, exchange: &Exchange) -> anyhow::Result<()>;
}

/// Keeps exchanges in process memory.
#[derive(Default)]
pub struct InMemoryHistory {
    exchanges: Mutex<Vec<Exchange>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything persisted so far.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn persist_exchange(&self, exchange: &Exchange) -> anyhow::Result<()> {
        self.exchanges
            .lock()
            .map_err(|_| anyhow!("history lock poisoned"))?
            .push(exchange.clone());
        Ok(())
    }
}

/// Appends exchanges to a file as JSON lines.
pub struct JsonlHistory {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl HistoryStore for JsonlHistory {
    async fn persist_exchange(&self, exchange: &Exchange) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(exchange)?;
        line.push('\n');
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
