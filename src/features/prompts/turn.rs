//! Per-turn debate prompt construction
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Topic in the framing line instead of the seed question
//! - 1.0.0: Fluent builder over the debate prompt template

/// Builds the user prompt handed to the speaking persona.
///
/// Pure: the same inputs always give the same text.
///
/// # Example
///
/// ```
/// use persona_clash::features::prompts::TurnPromptBuilder;
///
/// let prompt = TurnPromptBuilder::new("Ava", "Ben", "Pizza toppings")
///     .with_turn(0, Some("Does pineapple belong on pizza?"))
///     .with_max_words(50)
///     .build();
/// assert!(prompt.contains("Does pineapple belong on pizza?"));
/// ```
#[derive(Debug, Clone)]
pub struct TurnPromptBuilder<'a> {
    speaker: &'a str,
    opponent: &'a str,
    topic: &'a str,
    history: &'a str,
    own_last: &'a str,
    opponent_last: &'a str,
    turn_index: u64,
    seed_question: Option<&'a str>,
    max_words: u32,
}

impl<'a> TurnPromptBuilder<'a> {
    pub fn new(speaker: &'a str, opponent: &'a str, topic: &'a str) -> Self {
        Self {
            speaker,
            opponent,
            topic,
            history: "",
            own_last: "",
            opponent_last: "",
            turn_index: 0,
            seed_question: None,
            max_words: 100,
        }
    }

    /// Rendered transcript, already stripped of the two latest lines
    pub fn with_history(mut self, history: &'a str) -> Self {
        self.history = history;
        self
    }

    pub fn with_last_messages(mut self, own: &'a str, opponent: &'a str) -> Self {
        self.own_last = own;
        self.opponent_last = opponent;
        self
    }

    /// The seed question only matters on turn 0
    pub fn with_turn(mut self, turn_index: u64, seed_question: Option<&'a str>) -> Self {
        self.turn_index = turn_index;
        self.seed_question = seed_question;
        self
    }

    pub fn with_max_words(mut self, max_words: u32) -> Self {
        self.max_words = max_words;
        self
    }

    pub fn build(self) -> String {
        let Self {
            speaker,
            opponent,
            topic,
            history,
            own_last,
            opponent_last,
            turn_index,
            seed_question,
            max_words,
        } = self;

        let (framing, directive) = if turn_index == 0 {
            let question = seed_question.filter(|q| !q.trim().is_empty()).unwrap_or(topic);
            (
                format!("Question: {question}"),
                "Answer the question above directly, and make your stance unmistakable",
            )
        } else {
            (
                "Continue the debate based on the previous messages.".to_string(),
                "Continue the debate from the most recent exchange",
            )
        };

        let history = if history.trim().is_empty() { "(none yet)" } else { history };
        let opponent_last = if opponent_last.is_empty() { "(none yet)" } else { opponent_last };
        let own_last = if own_last.is_empty() { "(none yet)" } else { own_last };

        format!(
            r#"You are {speaker}, locked in a heated, hilarious debate with {opponent} about {topic}.

{framing}

Conversation history:
{history}

Opponent's last message: {opponent_last}
Your last message: {own_last}

Write your next turn. Rules:

1. Be sharp, funny and entertaining
2. Oppose {opponent}'s position at every step with clever arguments
3. Take apart their latest points with wit rather than insults
4. Sound like {speaker} and nobody else: keep your own voice, quirks and style
5. Stay under {max_words} words
6. {directive}
7. Lean on the latest exchange while calling back to earlier moments
8. Bring something new; never recycle an earlier argument

Open in a fresh, surprising way. Do NOT start with "Oh, {opponent}" or any opening you have used before.

HARD LIMIT: your reply must be at most {max_words} words."#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_turn_asks_seed_question() {
        let prompt = TurnPromptBuilder::new("Ava", "Ben", "Pizza toppings")
            .with_turn(0, Some("Q1"))
            .with_max_words(50)
            .build();

        assert!(prompt.starts_with("You are Ava"));
        assert!(prompt.contains("Question: Q1"));
        assert!(prompt.contains("Answer the question above"));
        assert!(prompt.contains("at most 50 words"));
        assert!(prompt.contains("under 50 words"));
    }

    #[test]
    fn test_later_turn_continues_without_question() {
        let prompt = TurnPromptBuilder::new("Ben", "Ava", "Pizza toppings")
            .with_history("")
            .with_last_messages("", "Pineapple is sweet justice.")
            .with_turn(1, Some("Q1"))
            .with_max_words(50)
            .build();

        assert!(prompt.to_lowercase().contains("continue the debate"));
        assert!(!prompt.contains("Q1"));
        assert!(prompt.contains("Opponent's last message: Pineapple is sweet justice."));
        assert!(prompt.contains("Your last message: (none yet)"));
    }

    #[test]
    fn test_opening_falls_back_to_topic() {
        let prompt = TurnPromptBuilder::new("Ava", "Ben", "Tabs versus spaces")
            .with_turn(0, None)
            .build();
        assert!(prompt.contains("Question: Tabs versus spaces"));
    }

    #[test]
    fn test_style_and_opening_constraints() {
        let prompt = TurnPromptBuilder::new("Ava", "Ben", "t").with_turn(3, None).build();
        assert!(prompt.contains("Oppose Ben's position"));
        assert!(prompt.contains("Do NOT start with \"Oh, Ben\""));
        assert!(prompt.contains("Sound like Ava"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let make = || {
            TurnPromptBuilder::new("Ava", "Ben", "t")
                .with_history("Ava: a1\nBen: b1")
                .with_last_messages("a2", "b2")
                .with_turn(4, None)
                .with_max_words(80)
                .build()
        };
        assert_eq!(make(), make());
        assert!(make().contains("Ava: a1\nBen: b1"));
    }
}
