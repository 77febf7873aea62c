use clap::Parser;
use colored::*;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use prompt_chat::cli::{request_options, resolve_config, Args};
use prompt_chat::{ChatClient, Conversation, HistoryStore, SendOutcome};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = resolve_config(&args)?;
    let client = ChatClient::new(config.clone())?;

    if args.health {
        if client.health_check().await {
            println!("{} {}", "healthy".bright_green(), config.base_url);
            return Ok(());
        }
        eprintln!("{} {}", "unreachable".bright_red(), config.base_url);
        std::process::exit(1);
    }

    if args.list_prompts {
        let list = client.list_prompts().await;
        for key in &list.prompts {
            println!("{key}");
        }
        eprintln!("{}", format!("{} prompt(s)", list.total).bright_blue());
        return Ok(());
    }

    let mut options = request_options(&args);
    if let Some(key) = &args.prompt_key {
        let prompt = client.prompt_content(key).await;
        if let Some(err) = &prompt.error {
            eprintln!("{} {}", "prompt unavailable:".bright_red(), err);
        } else {
            options.prompt = Some(prompt.content);
        }
    }

    let store = HistoryStore::new(config.history_dir.clone());
    if args.clear_history {
        store.clear(&config.chat_path)?;
        eprintln!("{}", "history cleared".bright_blue());
        return Ok(());
    }

    let mut convo = Conversation::new(client, config.chat_path.clone()).with_options(options);
    if !args.no_history {
        convo = convo.with_store(store);
        convo.load_history();
    }

    match &args.message {
        Some(message) => {
            send_and_print(&mut convo, message).await;
        }
        None => {
            eprintln!(
                "{}",
                format!("  chatting with {} (empty line or Ctrl+D to quit)", config.endpoint(convo.api_path()))
                    .bright_blue()
            );
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("{} ", ">".bright_cyan());
                io::stdout().flush()?;
                let Some(line) = lines.next_line().await? else { break };
                if line.trim().is_empty() {
                    break;
                }
                send_and_print(&mut convo, &line).await;
            }
        }
    }

    Ok(())
}

async fn send_and_print(convo: &mut Conversation<ChatClient>, message: &str) {
    let outcome = convo
        .send_with(message, |chunk| {
            print!("{chunk}");
            let _ = io::stdout().flush();
        })
        .await;
    match outcome {
        SendOutcome::Completed(_) => println!(),
        SendOutcome::Failed(e) => {
            println!();
            eprintln!("{} {}", "Error:".bright_red(), e);
        }
        SendOutcome::Empty => {}
    }
}
