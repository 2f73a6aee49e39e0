//! Canned-reply generator for offline runs and tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{FragmentStream, GenerationRequest, Generator};
use crate::core::DebateError;

/// What the next call should do
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Yield these fragments, in order
    Reply(Vec<String>),
    /// Fail before producing anything
    FailFast(String),
    /// Yield the fragments, then fail mid-stream
    FailAfter(Vec<String>, String),
}

/// Generator that plays back a script.
///
/// Steps are consumed in order. Once the script runs out, every call gets a
/// short reply naming the call number, or a prompt-aware reply in smart mode.
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<GenerationRequest>>,
    fallback: Option<String>,
    smart: bool,
    fragment_delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            fallback: None,
            smart: false,
            fragment_delay: None,
        }
    }

    /// Generator whose every call yields the fallback reply
    pub fn unscripted() -> Self {
        Self::new(Vec::new())
    }

    /// Once the script runs out, every call replies with this single fragment
    pub fn constant(reply: &str) -> Self {
        let mut generator = Self::new(Vec::new());
        generator.fallback = Some(reply.to_string());
        generator
    }

    /// Answers persona-writing and summary prompts in kind, so a whole debate
    /// can run offline
    pub fn smart() -> Self {
        let mut generator = Self::new(Vec::new());
        generator.smart = true;
        generator
    }

    /// Sleep between fragments to mimic a streaming provider
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request seen so far, oldest first
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_step(&self, call: usize, request: &GenerationRequest) -> ScriptStep {
        self.steps
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| match &self.fallback {
                Some(reply) => ScriptStep::Reply(vec![reply.clone()]),
                None if self.smart => smart_reply(call, request),
                None => default_reply(call),
            })
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<FragmentStream, DebateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.clone());
        }

        let (fragments, failure) = match self.next_step(call, request) {
            ScriptStep::Reply(fragments) => (fragments, None),
            ScriptStep::FailFast(message) => return Err(DebateError::Generation(message)),
            ScriptStep::FailAfter(fragments, message) => (fragments, Some(message)),
        };

        let (tx, stream) = FragmentStream::channel();
        let delay = self.fragment_delay;
        tokio::spawn(async move {
            for fragment in fragments {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(fragment)).await.is_err() {
                    return;
                }
            }
            if let Some(message) = failure {
                let _ = tx.send(Err(DebateError::Generation(message))).await;
            }
        });

        Ok(stream)
    }
}

fn default_reply(call: usize) -> ScriptStep {
    ScriptStep::Reply(vec![
        format!("Scripted reply #{call}. "),
        "I stand by every word.".to_string(),
    ])
}

fn smart_reply(call: usize, request: &GenerationRequest) -> ScriptStep {
    let prompt = &request.user_prompt;

    let first = line_value(prompt, "First persona name:");
    let second = line_value(prompt, "Second persona name:");
    if let (Some(first), Some(second)) = (first, second) {
        let persona = |name: &str| {
            format!(
                "<persona><name>{name}</name><systemprompt>You are {name}. You argue with \
                 stubborn conviction and never concede a point.</systemprompt></persona>"
            )
        };
        return ScriptStep::Reply(vec![format!("<personas>{}{}</personas>", persona(first), persona(second))]);
    }

    if prompt.starts_with("Summarize") {
        return ScriptStep::Reply(vec!["Both sides restated their positions.".to_string()]);
    }

    default_reply(call)
}

fn line_value<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|line| line.trim().strip_prefix(prefix))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plays_steps_in_order() {
        let generator = ScriptedGenerator::new(vec![
            ScriptStep::Reply(vec!["Hello, ".into(), "world".into()]),
            ScriptStep::FailFast("quota".into()),
        ]);
        let request = GenerationRequest::new("sys", "user");

        assert_eq!(generator.complete(&request).await.unwrap(), "Hello, world");
        assert!(matches!(
            generator.generate(&request).await,
            Err(DebateError::Generation(_))
        ));
        assert_eq!(generator.call_count(), 2);
        assert_eq!(generator.requests()[0].user_prompt, "user");
    }

    #[tokio::test]
    async fn test_fail_after_fragments() {
        let generator = ScriptedGenerator::new(vec![ScriptStep::FailAfter(
            vec!["partial".into()],
            "connection reset".into(),
        )]);
        let mut stream = generator.generate(&GenerationRequest::new("s", "u")).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_fallback_when_script_exhausted() {
        let generator = ScriptedGenerator::unscripted();
        let text = generator.complete(&GenerationRequest::new("s", "u")).await.unwrap();
        assert!(text.contains("#1"));
    }

    #[tokio::test]
    async fn test_smart_mode_writes_personas() {
        let generator = ScriptedGenerator::smart();
        let prompt = crate::features::prompts::persona_seed_prompt("Pizza", "Ava", "Ben", 50);
        let text = generator
            .complete(&GenerationRequest::new("writer", prompt))
            .await
            .unwrap();

        let personas = crate::features::prompts::extract_personas(&text);
        assert_eq!(personas.len(), 2);
        assert_eq!(personas[0].0, "Ava");
        assert_eq!(personas[1].0, "Ben");

        let summary = generator
            .complete(&GenerationRequest::new("s", "Summarize the following conversation concisely:"))
            .await
            .unwrap();
        assert_eq!(summary, "Both sides restated their positions.");
    }
}
