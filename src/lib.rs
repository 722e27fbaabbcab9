//! Streaming chat relay between terminal clients and a local Ollama runtime.

// Strict ban on unsafe or non-idiomatic practices
#![deny(warnings)] // Every warning is an error
#![deny(unsafe_code)] // No unsafe code
#![deny(missing_docs)] // Every public item must be documented
#![deny(dead_code)] // No unused code
#![deny(non_camel_case_types)] // Types follow CamelCase
#![deny(unused_imports)] // No unused imports
#![deny(unused_variables)] // No unused variables
#![deny(unused_must_use)] // Results and Options must be handled
#![deny(non_snake_case)] // Functions and variables in snake_case
#![deny(non_upper_case_globals)] // Constants in UPPER_CASE
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]

// Clippy discipline
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)] // No unwrap()
#![deny(clippy::expect_used)] // No expect()
#![deny(clippy::panic)] // No panic!()
#![deny(clippy::print_stdout)] // No println!() in library code
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::missing_const_for_fn)] // const wherever possible
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::shadow_unrelated)]
#![deny(clippy::too_many_arguments)]
#![deny(clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Robustness
#![deny(overflowing_literals)]

/// Inference backends: Ollama, the relay itself, and a scripted stand-in.
pub mod backend;
/// Conversation history, stream accumulation and the generation state machine.
pub mod chat;
/// Client for a running relay server.
pub mod client;
/// Server and client configuration.
pub mod config;
/// HTTP server and API routes.
#[allow(
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::unused_async
)]
pub mod server;
/// Entry helpers to start the relay.
pub mod start_relay;
/// Frame codec and incremental stream decoding.
pub mod stream;
