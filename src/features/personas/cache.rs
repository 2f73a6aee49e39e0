//! Persona/topic cache contract.
//!
//! Keys are canonicalized so `("Ben", "Ava")` and `("Ava", "Ben")` hit the same entry.

use async_trait::async_trait;
use dashmap::DashMap;

use super::Persona;
use crate::core::DebateError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersonaCacheKey {
    pub topic: String,
    /// Lexicographically smaller requested name
    pub name1: String,
    pub name2: String,
    pub answer_length: u32,
    pub provider: String,
}

impl PersonaCacheKey {
    pub fn new(topic: &str, name_a: &str, name_b: &str, answer_length: u32, provider: &str) -> Self {
        let (name1, name2) = sorted_pair(name_a, name_b);
        Self {
            topic: topic.to_string(),
            name1,
            name2,
            answer_length,
            provider: provider.to_string(),
        }
    }
}

/// The two names in ascending order
pub fn sorted_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[async_trait]
pub trait PersonaCache: Send + Sync {
    async fn lookup(&self, key: &PersonaCacheKey) -> Result<Option<(Persona, Persona)>, DebateError>;

    async fn store(&self, key: &PersonaCacheKey, personas: &(Persona, Persona)) -> Result<(), DebateError>;
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryPersonaCache {
    entries: DashMap<PersonaCacheKey, (Persona, Persona)>,
}

impl MemoryPersonaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PersonaCache for MemoryPersonaCache {
    async fn lookup(&self, key: &PersonaCacheKey) -> Result<Option<(Persona, Persona)>, DebateError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn store(&self, key: &PersonaCacheKey, personas: &(Persona, Persona)) -> Result<(), DebateError> {
        self.entries.insert(key.clone(), personas.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent() {
        let a = PersonaCacheKey::new("Pizza", "Ben", "Ava", 100, "openai");
        let b = PersonaCacheKey::new("Pizza", "Ava", "Ben", 100, "openai");
        assert_eq!(a, b);
        assert_eq!(a.name1, "Ava");
    }

    #[test]
    fn test_key_separates_provider_and_length() {
        let base = PersonaCacheKey::new("Pizza", "Ava", "Ben", 100, "openai");
        assert_ne!(base, PersonaCacheKey::new("Pizza", "Ava", "Ben", 150, "openai"));
        assert_ne!(base, PersonaCacheKey::new("Pizza", "Ava", "Ben", 100, "scripted"));
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryPersonaCache::new();
        let key = PersonaCacheKey::new("Pizza", "Ava", "Ben", 100, "openai");
        assert!(cache.lookup(&key).await.unwrap().is_none());

        let pair = (Persona::new("Ava", "You are Ava."), Persona::new("Ben", "You are Ben."));
        cache.store(&key, &pair).await.unwrap();

        let swapped = PersonaCacheKey::new("Pizza", "Ben", "Ava", 100, "openai");
        assert_eq!(cache.lookup(&swapped).await.unwrap(), Some(pair));
        assert_eq!(cache.len(), 1);
    }
}
