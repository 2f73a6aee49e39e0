// Core layer - shared types, configuration and errors
pub mod core;

// Features layer - debate building blocks
pub mod features;

// Infrastructure - SQLite persistence
pub mod database;

// IPC layer - communication between clients and the debate server
pub mod ipc;

pub use core::{Config, DebateError, Provider};

pub use features::{
    // Debate
    DebateId, DebateOrchestrator, DebateRequest, DebateSnapshot, TurnOutcome,
    // Generation
    Generator, OpenAiGenerator, ScriptedGenerator,
    // History
    HistoryStore, Turn,
    // Personas
    Persona, PersonaGenerator,
    // Prompts
    TurnPromptBuilder,
    // Relay
    RelayEvent, StreamingRelay,
    // Transcripts
    TurnStore,
};

pub use database::Database;

pub use ipc::{ClientCommand, DebateClient, DebateServer, ServerEvent};
