//! Relay server binary: streams Ollama chat replies over HTTP.
//! Run with: cargo run --bin ollama-chat-relay

use std::process::ExitCode;

use ollama_chat_relay::start_relay;

fn main() -> ExitCode {
    start_relay::run()
}
