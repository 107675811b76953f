pub mod chat_stream;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod realtime;
pub mod session;
pub mod state;
pub mod transcript;
