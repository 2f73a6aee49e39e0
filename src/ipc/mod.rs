//! # IPC Module
//!
//! Transport between debate clients and the debate server.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Debate commands and streamed turn events
//! - 1.0.0: Initial IPC implementation with Unix socket protocol

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{connect_with_retry, DebateClient};
pub use protocol::{ClientCommand, ServerEvent};
pub use server::DebateServer;

/// Default socket path for IPC communication
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/persona-clash.sock";

/// Get the socket path from environment or use default
pub fn get_socket_path() -> String {
    std::env::var("CLASH_SOCKET").unwrap_or_else(|_| DEFAULT_SOCKET_PATH.to_string())
}
