//! # Feature: Prompts
//!
//! Prompt text handed verbatim to the generation capability.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Persona seed prompt and parser
//! - 1.0.0: Turn prompt builder

pub mod persona_seed;
pub mod turn;

pub use persona_seed::{extract_personas, persona_seed_prompt, PERSONA_WRITER_DIRECTIVE};
pub use turn::TurnPromptBuilder;
