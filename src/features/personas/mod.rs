//! # Feature: Personas
//!
//! Generated debater identities. Each debate gets two personas, created once by
//! the persona generator (or recalled from the cache) and never changed after.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Personas generated per topic instead of a fixed roster
//! - 1.1.0: Order-independent persona/topic cache
//! - 1.0.0: Initial release

pub mod cache;
pub mod generator;

pub use cache::{MemoryPersonaCache, PersonaCache, PersonaCacheKey};
pub use generator::PersonaGenerator;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Display name; also the sender recorded on this persona's turns
    pub name: String,
    /// System directive governing this persona's style
    pub system_prompt: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }
}
