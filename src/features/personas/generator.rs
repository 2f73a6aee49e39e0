//! Creates (or recalls) the two personas for a debate.

use log::{debug, info, warn};
use std::sync::Arc;

use super::cache::{sorted_pair, PersonaCache, PersonaCacheKey};
use super::Persona;
use crate::core::DebateError;
use crate::features::generation::{GenerationRequest, Generator};
use crate::features::prompts::{extract_personas, persona_seed_prompt, PERSONA_WRITER_DIRECTIVE};

pub struct PersonaGenerator {
    generator: Arc<dyn Generator>,
    cache: Arc<dyn PersonaCache>,
}

impl PersonaGenerator {
    pub fn new(generator: Arc<dyn Generator>, cache: Arc<dyn PersonaCache>) -> Self {
        Self { generator, cache }
    }

    /// Provider label recorded alongside debates and cache entries
    pub fn provider(&self) -> &str {
        self.generator.provider()
    }

    /// Two personas for `topic`, in the order the model produced them.
    ///
    /// Cache failures are logged and bypassed; generation failures and a
    /// persona count other than two are returned.
    pub async fn generate(
        &self,
        topic: &str,
        name_a: &str,
        name_b: &str,
        answer_length: u32,
    ) -> Result<(Persona, Persona), DebateError> {
        let key = PersonaCacheKey::new(topic, name_a, name_b, answer_length, self.provider());

        match self.cache.lookup(&key).await {
            Ok(Some(personas)) => {
                info!("Persona cache hit for '{}' ({} vs {})", topic, key.name1, key.name2);
                return Ok(personas);
            }
            Ok(None) => debug!("Persona cache miss for '{topic}'"),
            Err(e) => warn!("Persona cache lookup failed, generating fresh personas: {e}"),
        }

        let (name1, name2) = sorted_pair(name_a, name_b);
        let prompt = persona_seed_prompt(topic, &name1, &name2, answer_length);
        let response = self
            .generator
            .complete(&GenerationRequest::new(PERSONA_WRITER_DIRECTIVE, prompt))
            .await?;

        let mut extracted = extract_personas(&response);
        if extracted.len() != 2 {
            return Err(DebateError::PersonaCountMismatch { found: extracted.len() });
        }

        let (name, system_prompt) = extracted.remove(1);
        let second = Persona::new(name, system_prompt);
        let (name, system_prompt) = extracted.remove(0);
        let first = Persona::new(name, system_prompt);

        if first.name.is_empty() || second.name.is_empty() || first.name == second.name {
            return Err(DebateError::Generation(format!(
                "generated personas need two distinct names, got '{}' and '{}'",
                first.name, second.name
            )));
        }

        let personas = (first, second);
        if let Err(e) = self.cache.store(&key, &personas).await {
            warn!("Failed to cache personas for '{topic}': {e}");
        }

        info!("Generated personas {} and {} for '{}'", personas.0.name, personas.1.name, topic);
        Ok(personas)
    }
}
