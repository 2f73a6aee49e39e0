//! # Feature: Conversation History
//!
//! Bounded, ordered record of debate turns. When the retained turns grow past a
//! token ceiling, older lines get folded into one generated summary turn. Each
//! of the two latest speakers keeps their newest line live.
//!
//! - **Version**: 1.4.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.4.0: Tokenizer-backed counting; a summary must shrink the rendered context
//! - 1.3.0: Failed or empty summaries keep the uncompacted history
//! - 1.2.0: Latest line per speaker survives compaction
//! - 1.1.0: Pluggable token counter
//! - 1.0.0: Initial release with summarize-on-overflow compaction

pub mod tokens;

pub use tokens::{CharEstimate, CounterKind, TiktokenCounter, TokenCounter, WordCount};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::DebateError;
use crate::features::generation::{GenerationRequest, Generator};

/// Default compaction ceiling in token-equivalent units
pub const DEFAULT_TOKEN_CEILING: usize = 2000;

/// Sender recorded on generated summary turns
pub const SUMMARY_SENDER: &str = "Summary";

const SUMMARIZER_DIRECTIVE: &str = "You are a helpful assistant that creates concise summaries. \
     Keep summaries brief and focused on the key points.";

/// One committed utterance, or a summary standing in for several
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub content: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub turn_index: u64,
    pub is_summary: bool,
}

impl Turn {
    fn render(&self) -> String {
        format!("{}: {}", self.sender, self.content)
    }
}

pub struct HistoryStore {
    turns: Vec<Turn>,
    next_index: u64,
    token_ceiling: usize,
    counter: Arc<dyn TokenCounter>,
    summarizer: Arc<dyn Generator>,
    compactions: usize,
}

impl HistoryStore {
    pub fn new(summarizer: Arc<dyn Generator>) -> Self {
        Self {
            turns: Vec::new(),
            next_index: 0,
            token_ceiling: DEFAULT_TOKEN_CEILING,
            counter: Arc::new(CharEstimate),
            summarizer,
            compactions: 0,
        }
    }

    pub fn with_token_ceiling(mut self, ceiling: usize) -> Self {
        self.token_ceiling = ceiling;
        self
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Record a turn, compacting if the budget is now exceeded.
    ///
    /// Compaction runs before this returns. If it fails the full history is
    /// kept and the failure is only logged.
    pub async fn append(&mut self, content: impl Into<String>, sender: impl Into<String>) {
        self.turns.push(Turn {
            content: content.into(),
            sender: sender.into(),
            timestamp: Utc::now(),
            turn_index: self.next_index,
            is_summary: false,
        });
        self.next_index += 1;

        let size = self.token_count();
        if size > self.token_ceiling {
            debug!("History at {size} tokens exceeds ceiling {}, compacting", self.token_ceiling);
            if let Err(e) = self.compact().await {
                warn!("Skipping compaction, keeping full history: {e}");
            }
        }
    }

    /// Most recent turn spoken by `name`
    pub fn last_message_by_sender(&self, name: &str) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| !t.is_summary && t.sender == name)
    }

    /// Transcript used as generation context.
    ///
    /// Leaves out the newest line of each of the two most recent speakers: the
    /// prompt carries those separately as "your last message" and "opponent's
    /// last message". Summary turns are always included.
    pub fn render_history(&self) -> String {
        render_context(&self.turns)
    }

    /// Every retained turn, summaries included
    pub fn render_full(&self) -> String {
        render_turns(self.turns.iter())
    }

    /// Size of all retained turns in token-equivalent units
    pub fn token_count(&self) -> usize {
        self.turns.iter().map(|t| self.counter.count(&t.content)).sum()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn token_ceiling(&self) -> usize {
        self.token_ceiling
    }

    /// Number of compactions that actually replaced history
    pub fn compaction_count(&self) -> usize {
        self.compactions
    }

    async fn compact(&mut self) -> Result<(), DebateError> {
        let pinned = latest_per_speaker(&self.turns);
        let folded: Vec<&Turn> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(i, t)| !t.is_summary && !pinned.contains(i))
            .map(|(_, t)| t)
            .collect();

        let Some(last_folded) = folded.last() else {
            return Err(DebateError::Compaction("nothing left to summarize".to_string()));
        };
        let summary_index = last_folded.turn_index;
        let folded_tokens: usize = folded.iter().map(|t| self.counter.count(&t.content)).sum();

        let context = render_turns(folded.iter().copied());
        let prompt = format!("Summarize the following conversation concisely:\n\n{context}\n\nSummary:");
        let request = GenerationRequest::new(SUMMARIZER_DIRECTIVE, prompt);

        let summary = self
            .summarizer
            .complete(&request)
            .await
            .map_err(|e| DebateError::Compaction(e.to_string()))?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(DebateError::Compaction("summarizer returned empty text".to_string()));
        }

        let summary_tokens = self.counter.count(summary);
        if summary_tokens >= folded_tokens {
            return Err(DebateError::Compaction(format!(
                "summary ({summary_tokens} tokens) is not smaller than the turns it replaces ({folded_tokens})"
            )));
        }

        // Prior summaries, the new summary, then the pinned lines in order
        let mut compacted: Vec<Turn> = self.turns.iter().filter(|t| t.is_summary).cloned().collect();
        compacted.push(Turn {
            content: summary.to_string(),
            sender: SUMMARY_SENDER.to_string(),
            timestamp: Utc::now(),
            turn_index: summary_index,
            is_summary: true,
        });
        compacted.extend(
            self.turns
                .iter()
                .enumerate()
                .filter(|(i, _)| pinned.contains(i))
                .map(|(_, t)| t.clone()),
        );

        let rendered_before = self.counter.count(&self.render_history());
        let rendered_after = self.counter.count(&render_context(&compacted));
        if rendered_after >= rendered_before {
            return Err(DebateError::Compaction(format!(
                "summary would not shrink the rendered history ({rendered_before} -> {rendered_after} tokens)"
            )));
        }

        let before = self.token_count();
        let replaced = folded.len();
        self.turns = compacted;
        self.compactions += 1;
        info!(
            "Compacted {replaced} turns into a summary: {before} -> {} tokens",
            self.token_count()
        );

        Ok(())
    }
}

/// Positions of the newest non-summary line of each of the two most recent speakers
fn latest_per_speaker(turns: &[Turn]) -> Vec<usize> {
    let mut pinned: Vec<usize> = Vec::with_capacity(2);
    let mut seen: Vec<&str> = Vec::with_capacity(2);
    for (i, turn) in turns.iter().enumerate().rev() {
        if seen.len() == 2 {
            break;
        }
        if turn.is_summary || seen.contains(&turn.sender.as_str()) {
            continue;
        }
        seen.push(&turn.sender);
        pinned.push(i);
    }
    pinned
}

fn render_context(turns: &[Turn]) -> String {
    let pinned = latest_per_speaker(turns);
    render_turns(
        turns
            .iter()
            .enumerate()
            .filter(|(i, _)| !pinned.contains(i))
            .map(|(_, t)| t),
    )
}

fn render_turns<'a>(turns: impl Iterator<Item = &'a Turn>) -> String {
    turns.map(Turn::render).collect::<Vec<_>>().join("\n")
}
