//! OpenAI chat-completions backend.
//!
//! The `openai` crate reads its key from `OPENAI_KEY`/`OPENAI_API_KEY`; the
//! server binary exports both before constructing this generator.

use async_trait::async_trait;
use log::{debug, warn};
use openai::chat::{
    ChatCompletion, ChatCompletionDelta, ChatCompletionMessage, ChatCompletionMessageRole,
};

use super::{FragmentStream, GenerationMode, GenerationRequest, Generator};
use crate::core::DebateError;

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    model: String,
    temperature: f32,
    mode: GenerationMode,
}

impl OpenAiGenerator {
    pub fn new(model: impl Into<String>, temperature: f32, mode: GenerationMode) -> Self {
        Self {
            model: model.into(),
            temperature,
            mode,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    fn build_messages(request: &GenerationRequest) -> Vec<ChatCompletionMessage> {
        vec![
            ChatCompletionMessage {
                role: ChatCompletionMessageRole::System,
                content: Some(request.system_directive.clone()),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            },
            ChatCompletionMessage {
                role: ChatCompletionMessageRole::User,
                content: Some(request.user_prompt.clone()),
                name: None,
                function_call: None,
                tool_call_id: None,
                tool_calls: None,
            },
        ]
    }

    async fn generate_immediate(&self, request: &GenerationRequest) -> Result<FragmentStream, DebateError> {
        let mut builder = ChatCompletion::builder(&self.model, Self::build_messages(request))
            .temperature(self.temperature);
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens as u64);
        }

        let completion = builder
            .create()
            .await
            .map_err(|e| DebateError::Generation(format!("OpenAI API error: {e}")))?;

        if let Some(usage) = &completion.usage {
            debug!(
                "OpenAI usage ({}): {} prompt + {} completion tokens",
                self.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        let text = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DebateError::Generation("No response from OpenAI".to_string()))?;

        Ok(FragmentStream::immediate(text))
    }

    async fn generate_incremental(&self, request: &GenerationRequest) -> Result<FragmentStream, DebateError> {
        let mut builder = ChatCompletionDelta::builder(&self.model, Self::build_messages(request))
            .temperature(self.temperature);
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens as u64);
        }

        let mut deltas = builder
            .create_stream()
            .await
            .map_err(|e| DebateError::Generation(format!("OpenAI stream error: {e}")))?;

        let (tx, stream) = FragmentStream::channel();
        let model = self.model.clone();

        tokio::spawn(async move {
            let mut finished = false;
            while let Some(delta) = deltas.recv().await {
                let Some(choice) = delta.choices.first() else {
                    continue;
                };
                if let Some(content) = choice.delta.content.as_ref().filter(|c| !c.is_empty()) {
                    if tx.send(Ok(content.clone())).await.is_err() {
                        // Consumer went away; stop pulling from the provider
                        return;
                    }
                }
                if choice.finish_reason.is_some() {
                    finished = true;
                }
            }

            // The crate closes the channel on transport or decode errors without
            // telling us why, so a missing finish_reason is the only signal.
            if !finished {
                warn!("OpenAI stream for {model} ended before a finish_reason");
                let _ = tx
                    .send(Err(DebateError::Generation(
                        "OpenAI stream ended before completion".to_string(),
                    )))
                    .await;
            }
        });

        Ok(stream)
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<FragmentStream, DebateError> {
        match self.mode {
            GenerationMode::Immediate => self.generate_immediate(request).await,
            GenerationMode::Incremental => self.generate_incremental(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_directive_and_prompt() {
        let request = GenerationRequest::new("You are Ava.", "Debate!");
        let messages = OpenAiGenerator::build_messages(&request);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatCompletionMessageRole::System);
        assert_eq!(messages[0].content.as_deref(), Some("You are Ava."));
        assert_eq!(messages[1].role, ChatCompletionMessageRole::User);
        assert_eq!(messages[1].content.as_deref(), Some("Debate!"));
    }

    #[test]
    fn test_mode_is_kept() {
        let generator = OpenAiGenerator::new("gpt-4o-mini", 0.7, GenerationMode::Incremental);
        assert_eq!(generator.mode(), GenerationMode::Incremental);
        assert_eq!(generator.provider(), "openai");
    }
}
