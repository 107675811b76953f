//! galaxy-chat is a client for streaming chat backends that pair an HTTP API
//! with a realtime WebSocket channel.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns runtime state, session acquisition, message dispatch with
//!   streamed replies, and the reconnecting realtime channel.
//! - [`api`] defines the wire payloads and the catalog lookups for models,
//!   tools and data sources.
//! - [`cli`] parses arguments and runs the terminal front-end.
//! - [`utils`] holds URL helpers and logging.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`]. Library users start from
//! [`core::client::ChatClient`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
