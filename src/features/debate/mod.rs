//! # Feature: Debate
//!
//! Turn-by-turn debates between two generated personas. Each debate is an
//! independent session with its own history; sessions never share state.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: One turn per request, streamed; sessions keyed by debate id
//! - 1.1.0: Debates recorded with their personas and turns
//! - 1.0.0: Initial implementation

pub mod orchestrator;
pub mod state;

pub use orchestrator::{DebateOrchestrator, DebateSession, DebateSnapshot, TurnOutcome};
pub use state::{DebateRequest, DebateState, Seat, DEFAULT_ANSWER_LENGTH};

/// Identifier assigned by the transcript store when a debate is created
pub type DebateId = i64;
