//! Error taxonomy shared by the debate core, the stores and the transport.

use thiserror::Error;

use crate::features::debate::DebateId;

/// Everything that can go wrong while starting or advancing a debate
#[derive(Debug, Error)]
pub enum DebateError {
    /// Missing credentials or an unusable setting for the generation backend
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider call failed or produced nothing usable. The turn was not committed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Persona generation did not yield exactly two personas
    #[error("expected 2 personas, but got {found}")]
    PersonaCountMismatch { found: usize },

    /// Summarization failed; callers of the history store never see this
    #[error("compaction failed: {0}")]
    Compaction(String),

    /// The transport went away while a turn was being relayed
    #[error("turn cancelled: client disconnected")]
    Cancelled,

    #[error("debate {0} not found")]
    DebateNotFound(DebateId),

    #[error("debate {0} already has a turn in progress")]
    TurnInProgress(DebateId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DebateError {
    /// Whether the same turn can simply be requested again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DebateError::Generation(_)
                | DebateError::Cancelled
                | DebateError::TurnInProgress(_)
                | DebateError::Storage(_)
        )
    }

    /// Stable label used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            DebateError::Configuration(_) => "configuration",
            DebateError::Generation(_) => "generation_failure",
            DebateError::PersonaCountMismatch { .. } => "persona_count_mismatch",
            DebateError::Compaction(_) => "compaction_failure",
            DebateError::Cancelled => "cancelled",
            DebateError::DebateNotFound(_) => "debate_not_found",
            DebateError::TurnInProgress(_) => "turn_in_progress",
            DebateError::Storage(_) => "storage",
            DebateError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<sqlite::Error> for DebateError {
    fn from(e: sqlite::Error) -> Self {
        DebateError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for DebateError {
    fn from(e: serde_json::Error) -> Self {
        DebateError::Storage(format!("serialization: {e}"))
    }
}
