//! Prompt asking the model for two opposing debater personas, and the parser
//! for its XML-ish answer.

use regex::Regex;
use std::sync::OnceLock;

/// Directive used while generating personas
pub const PERSONA_WRITER_DIRECTIVE: &str =
    "You are a helpful AI assistant who writes vivid character briefs for debate shows.";

/// Build the persona generation prompt for two (already sorted) names
pub fn persona_seed_prompt(topic: &str, name1: &str, name2: &str, answer_length: u32) -> String {
    format!(
        r#"Create two opposing debater personas, each with its own system prompt.
Debate topic: {topic}
First persona name: {name1}
Second persona name: {name2}

Each system prompt must:
- Describe the persona's traits, background and recognizable way of speaking
- Lay out how the persona approaches the topic, with likely arguments and rebuttals
- Tell the persona to argue with humor and wit
- Push the persona to oppose the other debater's views hard
- Give concrete guidance for replies that are entertaining and gripping to read
- Keep the persona funny, contrarian and captivating
- Include CRITICAL instructions for using the conversation history that later prompts will supply
- Insist that no single reply exceeds {answer_length} words
- Explain how to stay in character when the opponent says something unexpected

Answer in XML only, with nothing outside the XML:
<personas>
<persona>
<name></name>
<systemprompt>
[system prompt]
</systemprompt>
</persona>

<persona>
<name></name>
<systemprompt>
[system prompt]
</systemprompt>
</persona>
</personas>"#
    )
}

fn persona_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<persona>\s*<name>(.*?)</name>\s*<systemprompt>(.*?)</systemprompt>\s*</persona>")
            .expect("persona pattern is valid")
    })
}

/// Pull every `(name, system_prompt)` pair out of the model's answer.
///
/// Lines of the system prompt are trimmed and blank lines dropped.
pub fn extract_personas(text: &str) -> Vec<(String, String)> {
    persona_pattern()
        .captures_iter(text)
        .map(|caps| {
            let name = caps[1].trim().to_string();
            let system_prompt = caps[2]
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            (name, system_prompt)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_prompt_mentions_inputs() {
        let prompt = persona_seed_prompt("Pizza", "Ava", "Ben", 120);
        assert!(prompt.contains("Debate topic: Pizza"));
        assert!(prompt.contains("First persona name: Ava"));
        assert!(prompt.contains("Second persona name: Ben"));
        assert!(prompt.contains("exceeds 120 words"));
    }

    #[test]
    fn test_extract_two_personas() {
        let answer = r#"<personas>
<persona>
<name> Ava </name>
<systemprompt>
   You are Ava.

   You love pineapple.
</systemprompt>
</persona>
<persona><name>Ben</name><systemprompt>You are Ben.</systemprompt></persona>
</personas>"#;

        let personas = extract_personas(answer);
        assert_eq!(personas.len(), 2);
        assert_eq!(personas[0].0, "Ava");
        assert_eq!(personas[0].1, "You are Ava.\nYou love pineapple.");
        assert_eq!(personas[1], ("Ben".to_string(), "You are Ben.".to_string()));
    }

    #[test]
    fn test_extract_ignores_free_text() {
        assert!(extract_personas("Sure! Here are two personas: Ava and Ben.").is_empty());
    }
}
