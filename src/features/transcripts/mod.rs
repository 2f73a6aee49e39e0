//! # Feature: Transcripts
//!
//! Durable record of debates and their committed turns. The orchestrator only
//! sees the [`TurnStore`] contract; SQLite and in-memory backends implement it.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Debate listing, newest first
//! - 1.0.0: Initial release

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::core::DebateError;
use crate::features::debate::DebateId;
use crate::features::personas::Persona;

/// Everything recorded when a debate starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDebate {
    pub topic: String,
    pub name1: String,
    pub name2: String,
    pub provider: String,
    pub questions: Vec<String>,
    pub answer_length: u32,
    pub persona1: Persona,
    pub persona2: Persona,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRecord {
    pub id: DebateId,
    pub topic: String,
    pub name1: String,
    pub name2: String,
    pub provider: String,
    pub questions: Vec<String>,
    pub answer_length: u32,
    pub persona1: Persona,
    pub persona2: Persona,
    pub created_at: DateTime<Utc>,
}

impl DebateRecord {
    pub fn from_new(id: DebateId, debate: NewDebate, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            topic: debate.topic,
            name1: debate.name1,
            name2: debate.name2,
            provider: debate.provider,
            questions: debate.questions,
            answer_length: debate.answer_length,
            persona1: debate.persona1,
            persona2: debate.persona2,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub debate_id: DebateId,
    pub turn_number: u64,
    pub speaker: String,
    pub content: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// A debate with its turns ordered by turn number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTranscript {
    pub debate: DebateRecord,
    pub turns: Vec<TurnRecord>,
}

#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Persist a new debate and return its id
    async fn create_debate(&self, debate: &NewDebate) -> Result<DebateId, DebateError>;

    async fn append_turn(
        &self,
        debate_id: DebateId,
        speaker: &str,
        content: &str,
        prompt: &str,
        turn_number: u64,
    ) -> Result<(), DebateError>;

    /// Turns of one debate, ordered by turn number
    async fn list_turns(&self, debate_id: DebateId) -> Result<Vec<TurnRecord>, DebateError>;

    async fn get_debate(&self, debate_id: DebateId) -> Result<Option<DebateRecord>, DebateError>;

    /// Most recent debates first
    async fn list_debates(&self, limit: usize) -> Result<Vec<DebateRecord>, DebateError>;
}

#[derive(Default)]
struct MemoryTables {
    debates: Vec<DebateRecord>,
    turns: Vec<TurnRecord>,
}

/// Process-local store, used by tests and the scripted provider
#[derive(Default)]
pub struct MemoryTurnStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>, DebateError> {
        self.tables
            .lock()
            .map_err(|_| DebateError::Storage("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl TurnStore for MemoryTurnStore {
    async fn create_debate(&self, debate: &NewDebate) -> Result<DebateId, DebateError> {
        let mut tables = self.lock()?;
        let id = tables.debates.len() as DebateId + 1;
        tables.debates.push(DebateRecord::from_new(id, debate.clone(), Utc::now()));
        Ok(id)
    }

    async fn append_turn(
        &self,
        debate_id: DebateId,
        speaker: &str,
        content: &str,
        prompt: &str,
        turn_number: u64,
    ) -> Result<(), DebateError> {
        let mut tables = self.lock()?;
        if !tables.debates.iter().any(|d| d.id == debate_id) {
            return Err(DebateError::DebateNotFound(debate_id));
        }
        tables.turns.push(TurnRecord {
            debate_id,
            turn_number,
            speaker: speaker.to_string(),
            content: content.to_string(),
            prompt: prompt.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_turns(&self, debate_id: DebateId) -> Result<Vec<TurnRecord>, DebateError> {
        let tables = self.lock()?;
        let mut turns: Vec<TurnRecord> =
            tables.turns.iter().filter(|t| t.debate_id == debate_id).cloned().collect();
        turns.sort_by_key(|t| t.turn_number);
        Ok(turns)
    }

    async fn get_debate(&self, debate_id: DebateId) -> Result<Option<DebateRecord>, DebateError> {
        Ok(self.lock()?.debates.iter().find(|d| d.id == debate_id).cloned())
    }

    async fn list_debates(&self, limit: usize) -> Result<Vec<DebateRecord>, DebateError> {
        Ok(self.lock()?.debates.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_debate(topic: &str) -> NewDebate {
        NewDebate {
            topic: topic.to_string(),
            name1: "Ava".to_string(),
            name2: "Ben".to_string(),
            provider: "scripted".to_string(),
            questions: vec!["Q1".to_string()],
            answer_length: 50,
            persona1: Persona::new("Ava", "You are Ava."),
            persona2: Persona::new("Ben", "You are Ben."),
        }
    }

    #[tokio::test]
    async fn test_turns_come_back_ordered() {
        let store = MemoryTurnStore::new();
        let id = store.create_debate(&sample_debate("Pizza")).await.unwrap();

        store.append_turn(id, "Ben", "second", "p2", 1).await.unwrap();
        store.append_turn(id, "Ava", "first", "p1", 0).await.unwrap();

        let turns = store.list_turns(id).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "first");
        assert_eq!(turns[1].prompt, "p2");
    }

    #[tokio::test]
    async fn test_append_to_unknown_debate_fails() {
        let store = MemoryTurnStore::new();
        let err = store.append_turn(42, "Ava", "x", "p", 0).await.unwrap_err();
        assert!(matches!(err, DebateError::DebateNotFound(42)));
    }

    #[tokio::test]
    async fn test_list_debates_newest_first() {
        let store = MemoryTurnStore::new();
        store.create_debate(&sample_debate("first")).await.unwrap();
        store.create_debate(&sample_debate("second")).await.unwrap();
        store.create_debate(&sample_debate("third")).await.unwrap();

        let debates = store.list_debates(2).await.unwrap();
        let topics: Vec<&str> = debates.iter().map(|d| d.topic.as_str()).collect();
        assert_eq!(topics, vec!["third", "second"]);
        assert!(store.get_debate(1).await.unwrap().is_some());
        assert!(store.get_debate(9).await.unwrap().is_none());
    }
}
