//! Token-stream (language-model) service client (spec.md §4.8, C8).

mod client;
mod error;

pub use client::{AgentProfile, ConnectionStatus, ConnectOutcome, TokenStreamClient};
pub use error::TokenStreamError;
