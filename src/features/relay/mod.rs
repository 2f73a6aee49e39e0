//! # Feature: Streaming Relay
//!
//! Forwards each generated fragment to the observer as it is produced, tagged
//! with the speaking persona, and marks the end of every turn with a sentinel
//! event. A closed observer cancels the turn in progress.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Error event so observers can tell a failed turn from a finished one
//! - 1.0.0: Initial release

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::DebateError;

/// What an observer receives during a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayEvent {
    /// One piece of the speaker's reply
    Fragment { speaker: String, fragment: String },
    /// The turn is complete and committed
    EndOfTurn { speaker: String, turn_index: u64 },
    /// The turn failed; nothing was committed
    Error {
        kind: String,
        message: String,
        retryable: bool,
    },
}

impl RelayEvent {
    pub fn from_error(error: &DebateError) -> Self {
        RelayEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Observer handle for one turn.
///
/// Sends fail with [`DebateError::Cancelled`] once the receiving side is gone.
pub struct StreamingRelay {
    tx: Option<mpsc::Sender<RelayEvent>>,
}

impl StreamingRelay {
    pub fn new(tx: mpsc::Sender<RelayEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Relay that discards everything and never reports closure
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub async fn fragment(&self, speaker: &str, fragment: &str) -> Result<(), DebateError> {
        self.send(RelayEvent::Fragment {
            speaker: speaker.to_string(),
            fragment: fragment.to_string(),
        })
        .await
    }

    pub async fn end_of_turn(&self, speaker: &str, turn_index: u64) -> Result<(), DebateError> {
        self.send(RelayEvent::EndOfTurn {
            speaker: speaker.to_string(),
            turn_index,
        })
        .await
    }

    pub async fn error(&self, error: &DebateError) -> Result<(), DebateError> {
        self.send(RelayEvent::from_error(error)).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }

    /// Resolves once the observer has gone away. Never resolves for a silent relay.
    pub async fn closed(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }

    async fn send(&self, event: RelayEvent) -> Result<(), DebateError> {
        match &self.tx {
            Some(tx) => tx.send(event).await.map_err(|_| DebateError::Cancelled),
            None => Ok(()),
        }
    }
}
