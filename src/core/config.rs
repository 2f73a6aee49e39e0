//! Environment-driven configuration.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;

use crate::core::DebateError;
use crate::features::history::CounterKind;

/// Which generation backend the server talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    /// Canned replies, no network
    Scripted,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Scripted => "scripted",
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "scripted" | "mock" => Ok(Provider::Scripted),
            other => Err(anyhow!("Unknown provider '{other}' (expected 'openai' or 'scripted')")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub temperature: f32,
    pub stream_responses: bool,
    pub history_token_ceiling: usize,
    pub token_counter: CounterKind,
    pub database_path: String,
    pub socket_path: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let provider: Provider = env::var("CLASH_PROVIDER")
            .unwrap_or_else(|_| "openai".to_string())
            .parse()?;

        let openai_api_key = require_api_key(provider, env::var("OPENAI_API_KEY").ok())?;

        let token_counter = match env::var("HISTORY_TOKEN_COUNTER") {
            Ok(raw) => raw.parse()?,
            Err(_) => default_counter(provider),
        };

        Ok(Config {
            provider,
            openai_api_key,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: parse_var("GENERATION_TEMPERATURE", 0.7)?,
            stream_responses: parse_var("STREAM_RESPONSES", true)?,
            history_token_ceiling: parse_var("HISTORY_TOKEN_CEILING", 2000)?,
            token_counter,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "clash.db".to_string()),
            socket_path: crate::ipc::get_socket_path(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// The OpenAI provider cannot run without a key; other providers ignore it
fn require_api_key(provider: Provider, key: Option<String>) -> Result<Option<String>, DebateError> {
    let key = key.filter(|k| !k.trim().is_empty());
    if provider == Provider::OpenAi && key.is_none() {
        return Err(DebateError::Configuration(
            "OPENAI_API_KEY not found in environment variables".to_string(),
        ));
    }
    Ok(key)
}

/// Budgets match the provider's tokenizer unless overridden
fn default_counter(provider: Provider) -> CounterKind {
    match provider {
        Provider::OpenAi => CounterKind::Tiktoken,
        Provider::Scripted => CounterKind::Chars,
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}
