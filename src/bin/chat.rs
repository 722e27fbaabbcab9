//! Terminal chat client for a running relay server.
//! Run with: cargo run --bin ollama-chat
//!
//! Commands: `/clear`, `/model <name>`, `/models`, `/quit`.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use ollama_chat_relay::chat::ChatError;
use ollama_chat_relay::chat::session::Termination;
use ollama_chat_relay::client::ChatClient;
use ollama_chat_relay::config::ClientConfig;
use ollama_chat_relay::start_relay;

#[tokio::main]
async fn main() -> Result<()> {
    start_relay::init_tracing();

    let config = ClientConfig::from_env();
    let mut client = ChatClient::connect(&config).context("invalid client configuration")?;

    match client.select_first_model().await {
        Ok(Some(model)) => println!("Using model {model}"),
        Ok(None) => println!("No models available; pick one with /model <name>"),
        Err(err) => eprintln!("Could not list models: {err}"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => match client.clear().await {
                Ok(()) => println!("History cleared"),
                Err(err) => eprintln!("Error clearing history: {err}"),
            },
            "/models" => match client.list_models().await {
                Ok(models) => {
                    for name in models {
                        let marker = if client.selected_model() == Some(name.as_str()) { "*" } else { " " };
                        println!("{marker} {name}");
                    }
                }
                Err(err) => eprintln!("Error fetching models: {err}"),
            },
            _ if line.starts_with("/model ") => {
                let name = line.trim_start_matches("/model ");
                if let Err(err) = client.select_model(name) {
                    eprintln!("{err}");
                }
            }
            text => send(&client, text).await?,
        }
        prompt()?;
    }
    Ok(())
}

async fn send(client: &ChatClient, text: &str) -> Result<()> {
    let result = client
        .send(text, |update| {
            print!("{}", update.fragment);
            let _ = std::io::stdout().flush();
        })
        .await;
    println!();

    match result {
        Ok(outcome) if outcome.termination == Termination::Abnormal => {
            eprintln!("(stream ended early, reply may be incomplete)");
        }
        Ok(_) => {}
        Err(ChatError::InvalidInput(reason)) => eprintln!("{reason}"),
        Err(err) => eprintln!("Error sending message: {err}"),
    }
    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush().context("flushing stdout")
}
