//! Confirmation vocabulary — a dedicated parser for yes/no turns.
//!
//! Deliberately separate from the intent pattern table: while a
//! confirmation is pending, the *only* question is "did they say yes or
//! no", and a bare "yes" must not be classified as an unrelated command.

use regex_lite::Regex;

/// The outcome of parsing a confirmation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReply {
    Affirmative,
    Negative,
    /// Matched neither vocabulary (or both) — re-prompt.
    Ambiguous,
}

/// Filler tokens that must not be guessed at during an explicit choice.
const AMBIGUOUS_FILLERS: &[&str] = &[
    "yes", "no", "maybe", "first", "second", "ok", "okay", "sure", "that one", "the first one",
    "the second one",
];

/// Compiled affirmative/negative vocabularies.
pub struct ConfirmationVocab {
    affirmative: Regex,
    negative: Regex,
}

impl Default for ConfirmationVocab {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationVocab {
    pub fn new() -> Self {
        let affirmative = Regex::new(
            r"\b(?:yes|yeah|yep|yup|sure|ok|okay|confirm|confirmed|affirmative|absolutely|definitely|go\s+ahead|do\s+it|proceed)\b",
        )
        .expect("affirmative vocabulary must compile");
        let negative = Regex::new(
            r"\b(?:no|nope|nah|cancel|cancelled|abort|stop|negative|forget\s+it|never\s*mind|don'?t)\b",
        )
        .expect("negative vocabulary must compile");
        Self {
            affirmative,
            negative,
        }
    }

    /// Parse one turn while a confirmation is pending.
    pub fn parse(&self, text: &str) -> ConfirmationReply {
        let normalized = text.trim().to_lowercase();
        let yes = self.affirmative.is_match(&normalized);
        let no = self.negative.is_match(&normalized);
        match (yes, no) {
            (true, false) => ConfirmationReply::Affirmative,
            (false, true) => ConfirmationReply::Negative,
            // "yes no wait" and plain chatter both re-prompt.
            _ => ConfirmationReply::Ambiguous,
        }
    }

    /// Whether free text during an explicit choice is a filler token that
    /// must be rejected with a re-prompt rather than guessed.
    pub fn is_ambiguous_filler(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        AMBIGUOUS_FILLERS.contains(&normalized.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_variants() {
        let vocab = ConfirmationVocab::new();
        for input in ["yes", "Yes", "yeah", "sure", "ok", "go ahead", "do it", "yes please"] {
            assert_eq!(
                vocab.parse(input),
                ConfirmationReply::Affirmative,
                "input: {input}"
            );
        }
    }

    #[test]
    fn negative_variants() {
        let vocab = ConfirmationVocab::new();
        for input in ["no", "No", "nope", "cancel", "abort", "never mind", "don't"] {
            assert_eq!(
                vocab.parse(input),
                ConfirmationReply::Negative,
                "input: {input}"
            );
        }
    }

    #[test]
    fn ambiguous_when_neither() {
        let vocab = ConfirmationVocab::new();
        for input in ["hmm", "what?", "show my tasks", ""] {
            assert_eq!(
                vocab.parse(input),
                ConfirmationReply::Ambiguous,
                "input: {input}"
            );
        }
    }

    #[test]
    fn ambiguous_when_both() {
        let vocab = ConfirmationVocab::new();
        assert_eq!(vocab.parse("yes no wait"), ConfirmationReply::Ambiguous);
    }

    #[test]
    fn filler_tokens_rejected_during_choice() {
        let vocab = ConfirmationVocab::new();
        for input in ["yes", "no", "maybe", "first", "Second", "the first one"] {
            assert!(vocab.is_ambiguous_filler(input), "input: {input}");
        }
        assert!(!vocab.is_ambiguous_filler("workspace-2"));
        assert!(!vocab.is_ambiguous_filler("opt_a1b2"));
    }
}
