//! # Features
//!
//! Each debate concern lives in its own module. None of them can be toggled off.

pub mod debate;
pub mod generation;
pub mod history;
pub mod personas;
pub mod prompts;
pub mod relay;
pub mod transcripts;

pub use debate::{DebateId, DebateOrchestrator, DebateRequest, DebateSnapshot, TurnOutcome};
pub use generation::{FragmentStream, GenerationMode, GenerationRequest, Generator, OpenAiGenerator, ScriptedGenerator};
pub use history::{HistoryStore, TokenCounter, Turn};
pub use personas::{MemoryPersonaCache, Persona, PersonaCache, PersonaGenerator};
pub use prompts::TurnPromptBuilder;
pub use relay::{RelayEvent, StreamingRelay};
pub use transcripts::{DebateRecord, DebateTranscript, MemoryTurnStore, TurnStore};
