//! Token-equivalent size measures for history budgeting.

use std::str::FromStr;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

use crate::core::DebateError;

/// Pluggable size measure, so a tokenizer-backed count can replace the estimate
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Roughly one token per four characters, rounded up.
///
/// Close enough to the OpenAI tokenizers for budgeting English prose. Badly
/// undercounts CJK and other non-Latin text.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimate;

impl TokenCounter for CharEstimate {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// One unit per whitespace-separated word
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

impl TokenCounter for WordCount {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Exact counts from the `cl100k_base` encoding used by the GPT-3.5/GPT-4 chat models
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn cl100k() -> Result<Self, DebateError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| DebateError::Configuration(format!("failed to load cl100k_base tokenizer: {e}")))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Which measure history budgets are counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Tiktoken,
    Chars,
    Words,
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Tiktoken => "tiktoken",
            CounterKind::Chars => "chars",
            CounterKind::Words => "words",
        }
    }

    /// Build the counter. Loading the tokenizer is slow, so build once and share.
    pub fn build(&self) -> Result<Arc<dyn TokenCounter>, DebateError> {
        Ok(match self {
            CounterKind::Tiktoken => Arc::new(TiktokenCounter::cl100k()?),
            CounterKind::Chars => Arc::new(CharEstimate),
            CounterKind::Words => Arc::new(WordCount),
        })
    }
}

impl FromStr for CounterKind {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiktoken" | "cl100k" => Ok(CounterKind::Tiktoken),
            "chars" => Ok(CounterKind::Chars),
            "words" => Ok(CounterKind::Words),
            other => Err(DebateError::Configuration(format!(
                "unknown token counter '{other}' (expected 'tiktoken', 'chars' or 'words')"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_estimate_rounds_up() {
        assert_eq!(CharEstimate.count(""), 0);
        assert_eq!(CharEstimate.count("abc"), 1);
        assert_eq!(CharEstimate.count("abcd"), 1);
        assert_eq!(CharEstimate.count("abcde"), 2);
        assert_eq!(CharEstimate.count(&"x".repeat(240)), 60);
    }

    #[test]
    fn test_char_estimate_counts_chars_not_bytes() {
        assert_eq!(CharEstimate.count("éééé"), 1);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(WordCount.count("  the quick\nbrown   fox "), 4);
    }

    #[test]
    fn test_tiktoken_counts_english() {
        let counter = TiktokenCounter::cl100k().unwrap();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("hello world"), 2);
    }

    #[test]
    fn test_tiktoken_counts_cjk_above_char_estimate() {
        let counter = TiktokenCounter::cl100k().unwrap();
        let text = "我们认为菠萝应该放在披萨上".repeat(10);
        assert_eq!(CharEstimate.count(&text), 33);
        assert!(counter.count(&text) > 2 * CharEstimate.count(&text));
    }

    #[test]
    fn test_counter_kind_parsing() {
        assert_eq!("tiktoken".parse::<CounterKind>().unwrap(), CounterKind::Tiktoken);
        assert_eq!(" Words ".parse::<CounterKind>().unwrap(), CounterKind::Words);
        let err = "bytes".parse::<CounterKind>().unwrap_err();
        assert!(matches!(err, DebateError::Configuration(_)));
    }

    #[test]
    fn test_built_counter_matches_kind() {
        let words = CounterKind::Words.build().unwrap();
        assert_eq!(words.count("one two three"), 3);
        let chars = CounterKind::Chars.build().unwrap();
        assert_eq!(chars.count("abcdefgh"), 2);
    }
}
