//! Debate configuration and turn-taking state.

use serde::{Deserialize, Serialize};

use crate::core::DebateError;
use crate::features::personas::Persona;

/// Reply length used when a request does not name one, in words
pub const DEFAULT_ANSWER_LENGTH: u32 = 100;

/// Token allowance per word of requested answer length
const TOKENS_PER_WORD: u32 = 3;

/// Which of the two personas holds the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seat {
    A,
    B,
}

impl Seat {
    pub fn other(self) -> Self {
        match self {
            Seat::A => Seat::B,
            Seat::B => Seat::A,
        }
    }
}

/// What a client asks for when starting a debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRequest {
    pub topic: String,
    pub name1: String,
    pub name2: String,
    /// Only the first question is used, to seed turn 0
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default = "default_answer_length")]
    pub answer_length: u32,
}

fn default_answer_length() -> u32 {
    DEFAULT_ANSWER_LENGTH
}

impl DebateRequest {
    pub fn new(topic: impl Into<String>, name1: impl Into<String>, name2: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            name1: name1.into(),
            name2: name2.into(),
            questions: Vec::new(),
            answer_length: DEFAULT_ANSWER_LENGTH,
        }
    }

    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.questions = questions;
        self
    }

    pub fn with_answer_length(mut self, answer_length: u32) -> Self {
        self.answer_length = answer_length;
        self
    }

    pub fn validate(&self) -> Result<(), DebateError> {
        if self.topic.trim().is_empty() {
            return Err(DebateError::InvalidRequest("topic must not be empty".to_string()));
        }
        if self.name1.trim().is_empty() || self.name2.trim().is_empty() {
            return Err(DebateError::InvalidRequest("both persona names are required".to_string()));
        }
        if self.name1.trim() == self.name2.trim() {
            return Err(DebateError::InvalidRequest(format!(
                "persona names must differ, got '{}' twice",
                self.name1.trim()
            )));
        }
        if self.answer_length == 0 {
            return Err(DebateError::InvalidRequest("answer_length must be positive".to_string()));
        }
        Ok(())
    }
}

/// Turn-taking state of one debate. Personas and topic never change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateState {
    pub topic: String,
    pub persona_a: Persona,
    pub persona_b: Persona,
    pub current: Seat,
    /// Committed turns so far; also the index of the next turn
    pub turn_count: u64,
    pub seed_questions: Vec<String>,
    pub answer_length: u32,
}

impl DebateState {
    pub fn new(
        topic: impl Into<String>,
        persona_a: Persona,
        persona_b: Persona,
        seed_questions: Vec<String>,
        answer_length: u32,
    ) -> Self {
        Self {
            topic: topic.into(),
            persona_a,
            persona_b,
            current: Seat::A,
            turn_count: 0,
            seed_questions,
            answer_length,
        }
    }

    pub fn persona(&self, seat: Seat) -> &Persona {
        match seat {
            Seat::A => &self.persona_a,
            Seat::B => &self.persona_b,
        }
    }

    pub fn current_speaker(&self) -> &Persona {
        self.persona(self.current)
    }

    pub fn opponent(&self) -> &Persona {
        self.persona(self.current.other())
    }

    /// The question that frames the opening turn, if any
    pub fn seed_question(&self) -> Option<&str> {
        if self.turn_count == 0 {
            self.seed_questions.first().map(String::as_str)
        } else {
            None
        }
    }

    /// Generation budget for one reply
    pub fn max_tokens(&self) -> u32 {
        self.answer_length.saturating_mul(TOKENS_PER_WORD)
    }

    /// Hand the floor to the other persona after a committed turn
    pub fn advance(&mut self) {
        self.current = self.current.other();
        self.turn_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DebateState {
        DebateState::new(
            "Pizza",
            Persona::new("Ava", "You are Ava."),
            Persona::new("Ben", "You are Ben."),
            vec!["Q1".to_string(), "Q2".to_string()],
            50,
        )
    }

    #[test]
    fn test_advance_alternates() {
        let mut state = state();
        assert_eq!(state.current_speaker().name, "Ava");
        assert_eq!(state.opponent().name, "Ben");

        state.advance();
        assert_eq!(state.current_speaker().name, "Ben");
        state.advance();
        assert_eq!(state.current_speaker().name, "Ava");
        assert_eq!(state.turn_count, 2);
    }

    #[test]
    fn test_seed_question_only_on_first_turn() {
        let mut state = state();
        assert_eq!(state.seed_question(), Some("Q1"));
        state.advance();
        assert_eq!(state.seed_question(), None);
    }

    #[test]
    fn test_max_tokens_scales_with_length() {
        assert_eq!(state().max_tokens(), 150);
    }

    #[test]
    fn test_request_validation() {
        assert!(DebateRequest::new("Pizza", "Ava", "Ben").validate().is_ok());
        assert!(DebateRequest::new(" ", "Ava", "Ben").validate().is_err());
        assert!(DebateRequest::new("Pizza", "Ava", "Ava").validate().is_err());
        assert!(DebateRequest::new("Pizza", "Ava", "").validate().is_err());
        assert!(DebateRequest::new("Pizza", "Ava", "Ben").with_answer_length(0).validate().is_err());
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: DebateRequest =
            serde_json::from_str(r#"{"topic":"Pizza","name1":"Ava","name2":"Ben"}"#).unwrap();
        assert_eq!(request.answer_length, DEFAULT_ANSWER_LENGTH);
        assert!(request.questions.is_empty());
    }
}
