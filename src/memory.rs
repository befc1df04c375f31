use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MemoryConfig;

/// App tag attached to memories written to mem0.
const MEM0_APP: &str = "murmur";

/// Source of long-term memory context for a prompt.
#[async_trait]
pub trait MemoryRetriever: Send + Sync {
    /// Context relevant to `message`, or `None` when nothing is known.
    async fn retrieve_context(&self, user_id: &str, message: &str)
    -> anyhow::Result<Option<String>>;
}

/// Sink for finished exchanges worth remembering.
#[async_trait]
pub trait MemoryWriter: Send + Sync {
    async fn add_memory(&self, user_id: &str, text: &str) -> anyhow::Result<()>;
}

/// Coordinates memory lookups before a turn and memory writes after it.
///
/// Failures are logged and swallowed; memory never changes what the user
/// hears.
#[derive(Clone, Default)]
pub struct MemoryOrchestrator {
    enabled: bool,
    retriever: Option<Arc<dyn MemoryRetriever>>,
    writers: Vec<Arc<dyn MemoryWriter>>,
}

impl MemoryOrchestrator {
    /// An orchestrator with no collaborators attached.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            retriever: None,
            writers: Vec::new(),
        }
    }

    /// An orchestrator that never retrieves nor persists.
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn MemoryRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn MemoryWriter>) -> Self {
        self.writers.push(writer);
        self
    }

    /// Wires the HTTP clients enabled in `cfg`.
    pub fn from_config(cfg: &MemoryConfig) -> anyhow::Result<Self> {
        let mut orchestrator = Self::new(cfg.enabled);
        if !cfg.enabled {
            return Ok(orchestrator);
        }
        if cfg.memos_enabled {
            match &cfg.memos_url {
                Some(url) => {
                    let client = MemosClient::new(
                        url,
                        cfg.memos_top_k,
                        Duration::from_millis(cfg.memos_timeout_ms),
                    )?;
                    orchestrator = orchestrator.with_retriever(Arc::new(client));
                }
                None => warn!("memos enabled without memos_url; retrieval off"),
            }
        }
        if cfg.mem0_enabled {
            match &cfg.mem0_url {
                Some(url) => {
                    let client = Mem0Client::new(url, Duration::from_millis(cfg.mem0_timeout_ms))?;
                    orchestrator = orchestrator.with_writer(Arc::new(client));
                }
                None => warn!("mem0 enabled without mem0_url; persistence off"),
            }
        }
        Ok(orchestrator)
    }

    pub fn is_retrieval_enabled(&self) -> bool {
        self.enabled && self.retriever.is_some()
    }

    pub fn is_persistence_enabled(&self) -> bool {
        self.enabled && !self.writers.is_empty()
    }

    /// Memory context for the prompt, if retrieval is on and found anything.
    pub async fn build_memory_context(&self, user_id: &str, message: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let retriever = self.retriever.as_ref()?;
        match retriever.retrieve_context(user_id, message).await {
            Ok(Some(ctx)) if !ctx.trim().is_empty() => {
                debug!(%user_id, len = ctx.len(), "memory context retrieved");
                Some(ctx)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(?e, %user_id, "memory retrieval failed");
                None
            }
        }
    }

    /// Sends the exchange to every writer. Blank replies are not remembered.
    pub async fn persist(&self, user_id: &str, user_text: &str, assistant_text: &str) {
        if !self.is_persistence_enabled() || assistant_text.trim().is_empty() {
            return;
        }
        let text = exchange_text(user_text, assistant_text);
        let results = join_all(self.writers.iter().map(|w| w.add_memory(user_id, &text))).await;
        for e in results.into_iter().filter_map(Result::err) {
            warn!(?e, %user_id, "memory write failed");
        }
    }
}

fn exchange_text(user_text: &str, assistant_text: &str) -> String {
    let mut parts = Vec::with_capacity(2);
    if !user_text.trim().is_empty() {
        parts.push(format!("User: {user_text}"));
    }
    if !assistant_text.trim().is_empty() {
        parts.push(format!("Assistant: {assistant_text}"));
    }
    parts.join("\n")
}

fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()?)
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    user_id: &'a str,
    query: &'a str,
    top_k: usize,
}

/// Retrieves memories from a MemOS server.
pub struct MemosClient {
    http: reqwest::Client,
    search_url: String,
    top_k: usize,
}

impl MemosClient {
    pub fn new(base_url: &str, top_k: usize, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            search_url: format!("{}/product/search", base_url.trim_end_matches('/')),
            top_k: top_k.max(1),
        })
    }
}

#[async_trait]
impl MemoryRetriever for MemosClient {
    async fn retrieve_context(
        &self,
        user_id: &str,
        message: &str,
    ) -> anyhow::Result<Option<String>> {
        let body = SearchRequest {
            user_id,
            query: message,
            top_k: self.top_k,
        };
        let resp = self.http.post(&self.search_url).json(&body).send().await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "memos search failed");
            return Ok(None);
        }
        let root: Value = resp.json().await?;
        Ok(root.get("data").and_then(render_memories))
    }
}

/// Formats the `data` section of a MemOS search reply as a prompt block.
fn render_memories(data: &Value) -> Option<String> {
    let mut items: Vec<String> = data
        .get("text_mem")
        .and_then(Value::as_array)
        .map(|mem| {
            mem.iter()
                .filter_map(|n| match n {
                    Value::String(s) => Some(s.clone()),
                    other => other
                        .get("content")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();
    if items.is_empty() {
        if let Some(list) = data.as_array() {
            items = list
                .iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect();
        }
    }
    let mut out = String::from("User Memories:\n");
    let mut found = false;
    for item in items.iter().filter(|i| !i.trim().is_empty()) {
        found = true;
        out.push_str("- ");
        out.push_str(&item.replace('\n', " "));
        out.push('\n');
    }
    found.then_some(out)
}

#[derive(Serialize)]
struct AddMemoryRequest<'a> {
    user_id: &'a str,
    text: &'a str,
    app: &'a str,
}

/// Writes memories to a mem0 server.
pub struct Mem0Client {
    http: reqwest::Client,
    add_url: String,
}

impl Mem0Client {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            add_url: format!("{}/api/v1/memories", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl MemoryWriter for Mem0Client {
    async fn add_memory(&self, user_id: &str, text: &str) -> anyhow::Result<()> {
        let body = AddMemoryRequest {
            user_id,
            text,
            app: MEM0_APP,
        };
        let resp = self.http.post(&self.add_url).json(&body).send().await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "mem0 add_memory failed");
        }
        Ok(())
    }
}
