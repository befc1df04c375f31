use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Model server settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3".into(),
            max_retries: 0,
            retry_delay_ms: 500,
        }
    }
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Long-term memory services. Everything external is off unless enabled.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub memos_enabled: bool,
    pub memos_url: Option<String>,
    pub memos_top_k: usize,
    pub memos_timeout_ms: u64,
    pub mem0_enabled: bool,
    pub mem0_url: Option<String>,
    pub mem0_timeout_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memos_enabled: false,
            memos_url: None,
            memos_top_k: 5,
            memos_timeout_ms: 1000,
            mem0_enabled: false,
            mem0_url: None,
            mem0_timeout_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    pub system_prompt: Option<String>,
    pub max_tail_len: usize,
    /// Append finished exchanges to this JSON-lines file.
    pub history_path: Option<PathBuf>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tail_len: 20,
            history_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub conversation: ConversationConfig,
}

/// Load an [`AppConfig`] from a TOML file.
///
/// # Examples
///
/// ```no_run
/// use murmur_rs::config::load;
/// # tokio_test::block_on(async {
/// let cfg = load("murmur.toml").await.unwrap();
/// println!("talking to {}", cfg.llm.base_url);
/// # });
/// ```
pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<AppConfig> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(toml::from_str(&text)?)
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing_subscriber::filter::LevelFilter::ERROR,
            LogLevel::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            LogLevel::Info => tracing_subscriber::filter::LevelFilter::INFO,
            LogLevel::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            LogLevel::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.llm.model, "llama3");
        assert!(cfg.memory.enabled);
        assert!(!cfg.memory.memos_enabled);
        assert_eq!(cfg.conversation.max_tail_len, 20);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [llm]
            model = "qwen2"
            max_retries = 2

            [memory]
            memos_enabled = true
            memos_url = "http://memos:8000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.llm.model, "qwen2");
        assert_eq!(cfg.llm.base_url, "http://localhost:11434");
        assert_eq!(cfg.llm.retry_policy().max_retries, 2);
        assert_eq!(cfg.llm.retry_policy().delay, Duration::from_millis(500));
        assert_eq!(cfg.memory.memos_top_k, 5);
        assert_eq!(cfg.memory.memos_url.as_deref(), Some("http://memos:8000"));
    }
}
