use crate::config::ClientConfig;
use crate::conversation::RequestOptions;
use crate::error::ChatError;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "prompt-chat")]
#[command(version)]
#[command(about = "Streaming chat client for prompt/chat backends")]
pub struct Args {
    /// Message to send. Omit to start an interactive session.
    pub message: Option<String>,

    /// Provider family sent as `model` (grok, gpt, gemini)
    #[arg(long)]
    pub model: Option<String>,

    /// Concrete model version (e.g. grok-4-1-fast-reasoning)
    #[arg(long)]
    pub model_version: Option<String>,

    /// System prompt body
    #[arg(long, conflicts_with = "prompt_key")]
    pub prompt: Option<String>,

    /// Fetch the system prompt body from the backend catalogue by key
    #[arg(long)]
    pub prompt_key: Option<String>,

    /// Title attached to the request
    #[arg(long)]
    pub title: Option<String>,

    /// Backend base URL (overrides config file and PROMPT_CHAT_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Chat endpoint path
    #[arg(long)]
    pub path: Option<String>,

    /// TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Read the whole response before printing instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Check backend health and exit
    #[arg(long)]
    pub health: bool,

    /// List prompt keys from the backend catalogue and exit
    #[arg(long)]
    pub list_prompts: bool,

    /// Delete the saved conversation for the chat path and exit
    #[arg(long)]
    pub clear_history: bool,

    /// Do not load or save conversation history
    #[arg(long)]
    pub no_history: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short)]
    pub verbose: bool,
}

/// Layer the config sources: defaults, then `--config`, then the
/// environment, then command-line flags.
pub fn resolve_config(args: &Args) -> Result<ClientConfig, ChatError> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    }
    .apply_env();
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    if let Some(path) = &args.path {
        config.chat_path = path.clone();
    }
    if args.no_stream {
        config.streaming = false;
    }
    config.validate()?;
    Ok(config)
}

pub fn request_options(args: &Args) -> RequestOptions {
    RequestOptions {
        model: args.model.clone(),
        model_version: args.model_version.clone(),
        prompt: args.prompt.clone(),
        title: args.title.clone(),
    }
}
