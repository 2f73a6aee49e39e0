//! # Feature: Generation
//!
//! Persona text generation: a prompt goes in, an ordered, finite sequence of
//! text fragments comes out. Concatenating the fragments gives the full reply.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Incremental mode for the OpenAI backend
//! - 1.1.0: Scripted generator for offline runs
//! - 1.0.0: Initial release

pub mod openai_chat;
pub mod scripted;

pub use openai_chat::OpenAiGenerator;
pub use scripted::ScriptedGenerator;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::DebateError;

/// Buffer between a producer task and the consumer of its fragments
pub const FRAGMENT_CHANNEL_CAPACITY: usize = 64;

/// Immediate returns the reply as one fragment; incremental yields pieces as they arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Immediate,
    Incremental,
}

/// One call to the generation capability
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_directive: String,
    pub user_prompt: String,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(system_directive: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_directive: system_directive.into(),
            user_prompt: user_prompt.into(),
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Ordered, non-restartable sequence of fragments.
///
/// An `Err` item means the generation failed; nothing after it is delivered.
pub struct FragmentStream {
    rx: mpsc::Receiver<Result<String, DebateError>>,
    failed: bool,
}

/// Producer half of a [`FragmentStream`]
pub type FragmentSender = mpsc::Sender<Result<String, DebateError>>;

impl FragmentStream {
    /// Create a connected producer/stream pair
    pub fn channel() -> (FragmentSender, Self) {
        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        (tx, Self { rx, failed: false })
    }

    /// A stream that yields `text` once and ends
    pub fn immediate(text: impl Into<String>) -> Self {
        let (tx, stream) = Self::channel();
        // Capacity is non-zero and the receiver is alive, so this cannot fail
        let _ = tx.try_send(Ok(text.into()));
        stream
    }

    /// Next fragment, `None` once the producer is finished
    pub async fn next(&mut self) -> Option<Result<String, DebateError>> {
        if self.failed {
            return None;
        }
        let item = self.rx.recv().await;
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }

    /// Drain the whole stream into one string
    pub async fn collect_text(mut self) -> Result<String, DebateError> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

/// The persona text-generation capability
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider label, used as part of the persona cache key
    fn provider(&self) -> &str;

    /// Start generating. Errors raised before the first fragment come back here,
    /// errors after that arrive as an `Err` item in the stream.
    async fn generate(&self, request: &GenerationRequest) -> Result<FragmentStream, DebateError>;

    /// Run a request to completion and return the full text
    async fn complete(&self, request: &GenerationRequest) -> Result<String, DebateError> {
        self.generate(request).await?.collect_text().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_immediate_stream_yields_once() {
        let mut stream = FragmentStream::immediate("hello");
        assert_eq!(stream.next().await.unwrap().unwrap(), "hello");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_collect_stops_at_error() {
        let (tx, stream) = FragmentStream::channel();
        tx.send(Ok("a".into())).await.unwrap();
        tx.send(Err(DebateError::Generation("boom".into()))).await.unwrap();
        tx.send(Ok("b".into())).await.unwrap();
        drop(tx);

        let err = stream.collect_text().await.unwrap_err();
        assert!(matches!(err, DebateError::Generation(_)));
    }

    #[tokio::test]
    async fn test_nothing_after_error() {
        let (tx, mut stream) = FragmentStream::channel();
        tx.send(Err(DebateError::Generation("boom".into()))).await.unwrap();
        tx.send(Ok("late".into())).await.unwrap();
        drop(tx);

        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
