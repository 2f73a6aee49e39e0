//! # IPC Protocol
//!
//! Message types for client <-> debate server communication over Unix socket.
//!
//! Uses length-prefixed JSON framing:
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: JSON payload

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::DebateError;
use crate::features::debate::{DebateId, DebateRequest, DebateSnapshot, TurnOutcome};
use crate::features::relay::RelayEvent;
use crate::features::transcripts::{DebateRecord, DebateTranscript};

/// Frames larger than this are rejected
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

// ============================================================================
// Client -> Server Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// Generate personas and open a new debate
    StartDebate {
        request_id: String,
        request: DebateRequest,
    },
    /// Produce the next turn. With `stream` the reply arrives as fragments
    /// followed by `EndOfTurn`, otherwise as a single `TurnCompleted`.
    AdvanceTurn {
        request_id: String,
        debate_id: DebateId,
        #[serde(default = "default_stream")]
        stream: bool,
    },
    EndDebate {
        request_id: String,
        debate_id: DebateId,
    },
    /// Stored record and turns of a debate
    GetDebate {
        request_id: String,
        debate_id: DebateId,
    },
    ListDebates {
        request_id: String,
        limit: usize,
    },
    Ping {
        timestamp: i64,
    },
}

fn default_stream() -> bool {
    true
}

// ============================================================================
// Server -> Client Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    DebateStarted {
        request_id: String,
        debate: DebateSnapshot,
    },
    /// One streamed piece of the current speaker's reply
    Fragment {
        request_id: String,
        debate_id: DebateId,
        speaker: String,
        fragment: String,
    },
    /// Streamed turn finished and committed
    EndOfTurn {
        request_id: String,
        debate_id: DebateId,
        speaker: String,
        turn_index: u64,
    },
    /// Non-streamed turn finished and committed
    TurnCompleted {
        request_id: String,
        turn: TurnOutcome,
    },
    DebateEnded {
        request_id: String,
        debate_id: DebateId,
    },
    Debate {
        request_id: String,
        transcript: DebateTranscript,
    },
    Debates {
        request_id: String,
        debates: Vec<DebateRecord>,
    },
    Error {
        request_id: Option<String>,
        kind: String,
        message: String,
        retryable: bool,
    },
    Pong {
        timestamp: i64,
    },
}

impl ServerEvent {
    pub fn error(request_id: impl Into<String>, error: &DebateError) -> Self {
        ServerEvent::Error {
            request_id: Some(request_id.into()),
            kind: error.kind().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    /// Tag a relay event with the request and debate it belongs to
    pub fn from_relay(request_id: &str, debate_id: DebateId, event: RelayEvent) -> Self {
        let request_id = request_id.to_string();
        match event {
            RelayEvent::Fragment { speaker, fragment } => ServerEvent::Fragment {
                request_id,
                debate_id,
                speaker,
                fragment,
            },
            RelayEvent::EndOfTurn { speaker, turn_index } => ServerEvent::EndOfTurn {
                request_id,
                debate_id,
                speaker,
                turn_index,
            },
            RelayEvent::Error { kind, message, retryable } => ServerEvent::Error {
                request_id: Some(request_id),
                kind,
                message,
                retryable,
            },
        }
    }

    /// Request this event answers, if any
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ServerEvent::DebateStarted { request_id, .. }
            | ServerEvent::Fragment { request_id, .. }
            | ServerEvent::EndOfTurn { request_id, .. }
            | ServerEvent::TurnCompleted { request_id, .. }
            | ServerEvent::DebateEnded { request_id, .. }
            | ServerEvent::Debate { request_id, .. }
            | ServerEvent::Debates { request_id, .. } => Some(request_id),
            ServerEvent::Error { request_id, .. } => request_id.as_deref(),
            ServerEvent::Pong { .. } => None,
        }
    }

    /// Whether no further events will follow for this request
    pub fn is_final(&self) -> bool {
        !matches!(self, ServerEvent::Fragment { .. })
    }
}

// ============================================================================
// Framing - Length-prefixed JSON messages
// ============================================================================

/// Encode a message with length prefix
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes", json.len()));
    }
    let len = json.len() as u32;
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Read one frame body from an async stream. `Ok(None)` means the peer closed
/// the connection cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes", len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}
