use clap::Parser;
use murmur_rs::{
    AppConfig, ChatSession, Conversation, JsonlHistory, LLMClient, LogLevel, LogTrace,
    MemoryOrchestrator, OllamaLLM, RetryLLM, Voice, config,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Talk to a local model and hear the reply sentence by sentence.
#[derive(Parser, Debug)]
#[command(name = "murmur", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// User id sent to memory services.
    #[arg(long, default_value = "local")]
    user: String,

    /// Wait for the whole reply instead of streaming sentences.
    #[arg(long)]
    sync: bool,

    /// Track tool calls reported by the model.
    #[arg(long)]
    tools: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::from(cli.log_level))
        .with_writer(std::io::stderr)
        .init();

    let cfg = match &cli.config {
        Some(path) => config::load(path).await?,
        None => AppConfig::default(),
    };
    info!(model = %cfg.llm.model, url = %cfg.llm.base_url, "starting murmur");

    let ollama = OllamaLLM::from_base_url(&cfg.llm.base_url, cfg.llm.model.clone())?;
    let llm: Arc<dyn LLMClient> = Arc::new(RetryLLM::new(ollama, cfg.llm.retry_policy()));
    let mut voice = Voice::new(llm)
        .name("murmur")
        .memory(MemoryOrchestrator::from_config(&cfg.memory)?)
        .trace(Arc::new(LogTrace));
    if let Some(path) = &cfg.conversation.history_path {
        voice = voice.history(Arc::new(JsonlHistory::new(path)));
    }

    let session = ChatSession::new(
        cli.user.clone(),
        Conversation::new(
            cfg.conversation.system_prompt.clone(),
            cfg.conversation.max_tail_len,
        ),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if cli.sync {
            println!("{}", voice.chat(&session, line).await);
            continue;
        }
        let sink = |text: &str, _first: bool, _last: bool| {
            if !text.is_empty() {
                println!("{text}");
            }
        };
        let summary = voice
            .chat_stream_by_sentence(&session, line, cli.tools, sink)
            .await;
        if summary.failed {
            error!("turn failed; see log for the cause");
        }
        if let Some(tool) = summary.tool_name {
            info!(%tool, "model used a tool");
        }
    }
    Ok(())
}
