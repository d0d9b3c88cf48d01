//! Model response parsing with graceful degradation.
//!
//! The model is instructed to answer with a single JSON object, but real
//! completions arrive wrapped in prose, code fences, or both. Three
//! strategies run in order:
//!
//! 1. Parse the whole trimmed text as JSON.
//! 2. Extract the body of a fenced ```json block.
//! 3. Scan for the first balanced `{...}` span and parse that.
//!
//! Only when all three fail is the text declared unparseable, and the raw
//! prose is preserved so the caller can still show the user *something*.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use taskweave_core::dispatch::ActionDescriptor;

/// The structured payload the model is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredReply {
    /// User-facing reply text.
    pub reply: String,
    /// Side-effect the model wants executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionDescriptor>,
    /// Free-form result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Whether the model wants a yes/no confirmation before the action runs.
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// How a completion was (or was not) turned into a [`StructuredReply`].
#[derive(Debug)]
pub enum ParseOutcome {
    /// The whole text parsed directly.
    Direct(StructuredReply),
    /// A fence or brace scan recovered the object from surrounding prose.
    Recovered(StructuredReply),
    /// No strategy produced valid JSON; the raw text is carried along.
    Unparseable(String),
}

impl ParseOutcome {
    pub fn into_reply(self) -> Option<StructuredReply> {
        match self {
            ParseOutcome::Direct(r) | ParseOutcome::Recovered(r) => Some(r),
            ParseOutcome::Unparseable(_) => None,
        }
    }
}

/// Run the three parse strategies in order.
pub fn parse_model_reply(raw: &str) -> ParseOutcome {
    let trimmed = raw.trim();

    if let Ok(reply) = serde_json::from_str::<StructuredReply>(trimmed) {
        return ParseOutcome::Direct(reply);
    }

    if let Some(body) = fenced_json_block(trimmed) {
        if let Ok(reply) = serde_json::from_str::<StructuredReply>(body) {
            debug!("Recovered structured reply from fenced block");
            return ParseOutcome::Recovered(reply);
        }
    }

    if let Some(span) = first_balanced_object(trimmed) {
        if let Ok(reply) = serde_json::from_str::<StructuredReply>(span) {
            debug!("Recovered structured reply from embedded object");
            return ParseOutcome::Recovered(reply);
        }
    }

    warn!(len = raw.len(), "Model response unparseable as structured reply");
    ParseOutcome::Unparseable(raw.to_string())
}

/// Body of the first ```json (or bare ```) fence, if any.
fn fenced_json_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip a language tag up to the first newline.
    let body_start = after_open.find('\n')?;
    let body = &after_open[body_start + 1..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// The first balanced `{...}` span, brace-counting with string awareness.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_json_parses() {
        let raw = r#"{"reply": "You have 3 tasks.", "data": {"count": 3}}"#;
        match parse_model_reply(raw) {
            ParseOutcome::Direct(r) => {
                assert_eq!(r.reply, "You have 3 tasks.");
                assert_eq!(r.data.unwrap()["count"], 3);
                assert!(!r.requires_confirmation);
            }
            other => panic!("Expected Direct, got {other:?}"),
        }
    }

    #[test]
    fn fenced_block_recovers() {
        let raw = "Here is the result:\n```json\n{\"reply\": \"Done.\"}\n```\nHope that helps!";
        match parse_model_reply(raw) {
            ParseOutcome::Recovered(r) => assert_eq!(r.reply, "Done."),
            other => panic!("Expected Recovered, got {other:?}"),
        }
    }

    #[test]
    fn embedded_object_recovers() {
        let raw = r#"Sure! {"reply": "Created it.", "action": {"name": "create_task", "params": {"title": "buy milk"}}} Let me know."#;
        match parse_model_reply(raw) {
            ParseOutcome::Recovered(r) => {
                assert_eq!(r.reply, "Created it.");
                assert_eq!(r.action.unwrap().name, "create_task");
            }
            other => panic!("Expected Recovered, got {other:?}"),
        }
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let raw = r#"note: {"reply": "use {curly} braces", "data": null}"#;
        match parse_model_reply(raw) {
            ParseOutcome::Recovered(r) => assert_eq!(r.reply, "use {curly} braces"),
            other => panic!("Expected Recovered, got {other:?}"),
        }
    }

    #[test]
    fn prose_only_is_unparseable() {
        let raw = "I'm sorry, I can't help with that.";
        match parse_model_reply(raw) {
            ParseOutcome::Unparseable(text) => assert_eq!(text, raw),
            other => panic!("Expected Unparseable, got {other:?}"),
        }
    }

    #[test]
    fn truncated_json_is_unparseable() {
        let raw = r#"{"reply": "never closed"#;
        assert!(matches!(parse_model_reply(raw), ParseOutcome::Unparseable(_)));
    }

    #[test]
    fn confirmation_flag_round_trips() {
        let raw = r#"{"reply": "Delete everything?", "requires_confirmation": true}"#;
        let reply = parse_model_reply(raw).into_reply().unwrap();
        assert!(reply.requires_confirmation);
    }
}
