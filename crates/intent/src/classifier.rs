//! The ordered pattern table and classification entry point.
//!
//! Ordering invariant: within the table, bulk-scope patterns for an entity
//! precede the singular patterns for the same entity, and specific list
//! variants ("tasks due today") precede the generic list pattern. regex-lite
//! has no lookaround, so the invariant is carried entirely by table order
//! and pinned by the `table_order` tests below.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::kind::{IntentGroup, IntentKind};

/// Immutable result of classifying one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub kind: IntentKind,
    /// 0.0–1.0. Pattern matches score 0.95; Unknown scores 0.0.
    pub confidence: f64,
    /// Whether the dispatcher should route this turn to the model.
    pub requires_model: bool,
    /// Extracted parameters, in extraction order. Values are raw strings;
    /// validation (date parsing etc.) is the consuming handler's job.
    pub extracted: Vec<(String, String)>,
}

impl IntentClassification {
    fn new(kind: IntentKind, confidence: f64, extracted: Vec<(String, String)>) -> Self {
        Self {
            kind,
            confidence,
            requires_model: kind.requires_model(),
            extracted,
        }
    }

    fn unknown() -> Self {
        Self::new(IntentKind::Unknown, 0.0, Vec::new())
    }

    /// Look up an extracted value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.extracted
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Confidence assigned to any pattern-table match.
const MATCH_CONFIDENCE: f64 = 0.95;

/// Markers that suggest a message carries more than one request.
const MULTI_INTENT_MARKERS: &[&str] = &[" and ", " then ", " also ", "; ", ", "];

struct PatternEntry {
    kind: IntentKind,
    regex: Regex,
}

/// The deterministic classifier. Compile once, reuse everywhere —
/// `classify` is pure and cheap.
pub struct IntentClassifier {
    table: Vec<PatternEntry>,
    workspace_mention: Regex,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Compile the ordered pattern table.
    pub fn new() -> Self {
        let entries: &[(IntentKind, &str)] = &[
            // ── Batch scope first: "all" must never be swallowed as an item name ──
            (
                IntentKind::DeleteCompletedTasks,
                r"\b(?:delete|remove|clear)\s+(?:all\s+)?(?:my\s+)?(?:completed|finished|done)\s+tasks?\b",
            ),
            (
                IntentKind::DeleteAllTasks,
                r"\b(?:delete|remove|clear)\s+(?:all|every)\s+(?:of\s+)?(?:my\s+)?tasks?\b",
            ),
            (
                IntentKind::DeleteAllHabits,
                r"\b(?:delete|remove|clear)\s+(?:all|every)\s+(?:of\s+)?(?:my\s+)?habits?\b",
            ),
            (
                IntentKind::DeleteAllNotes,
                r"\b(?:delete|remove|clear)\s+(?:all|every)\s+(?:of\s+)?(?:my\s+)?notes?\b",
            ),
            (
                IntentKind::CompleteAllTasks,
                r"\b(?:complete|finish|check\s+off)\s+(?:all|every)\s+(?:of\s+)?(?:my\s+)?tasks?\b",
            ),
            // ── Singular deletes ──
            (
                IntentKind::DeleteTask,
                r"^(?:delete|remove)\s+(?:the\s+)?task\s+(?:called\s+|named\s+)?(?P<title>.+)$",
            ),
            (
                IntentKind::DeleteHabit,
                r"^(?:delete|remove)\s+(?:the\s+)?habit\s+(?:called\s+|named\s+)?(?P<name>.+)$",
            ),
            (
                IntentKind::DeleteNote,
                r"^(?:delete|remove)\s+(?:the\s+)?note\s+(?:called\s+|named\s+|about\s+)?(?P<title>.+)$",
            ),
            (
                IntentKind::DeleteWorkspace,
                r"^(?:delete|remove)\s+(?:the\s+)?workspace\s+(?P<workspace>.+)$",
            ),
            (
                IntentKind::DeleteReminder,
                r"^(?:delete|remove|cancel)\s+(?:the\s+)?reminder\s+(?:for\s+|about\s+)?(?P<label>.+)$",
            ),
            // ── Specific list variants before the generic list patterns ──
            (
                IntentKind::ListTasksToday,
                r"(?:\btasks?\s+(?:due\s+)?today\b|\btoday'?s?\s+tasks?\b|\bwhat(?:'s|\s+is)\s+due\s+today\b|\bdue\s+today\b)",
            ),
            (
                IntentKind::ListTasksOverdue,
                r"\boverdue\b",
            ),
            (
                IntentKind::ListTasksCompleted,
                r"\b(?:show|list|view|see)\b.*\b(?:completed|finished|done)\s+tasks?\b",
            ),
            (
                IntentKind::ListTasksUpcoming,
                r"(?:\bupcoming\s+tasks?\b|\btasks?\s+(?:for\s+|due\s+)?this\s+week\b)",
            ),
            (
                IntentKind::SearchTasks,
                r"^(?:search|find)\s+tasks?\s+(?:about\s+|for\s+|containing\s+)?(?P<query>.+)$",
            ),
            (
                IntentKind::SearchNotes,
                r"^(?:search|find)\s+(?:my\s+)?notes?\s+(?:about\s+|for\s+|on\s+|containing\s+)?(?P<query>.+)$",
            ),
            // ── Analytics (before generic lists: "summarize my notes" etc.) ──
            (
                IntentKind::SummarizeNotes,
                r"\bsummar(?:y|ize|ise)\b.*\bnotes?\b",
            ),
            (
                IntentKind::WeeklyReview,
                r"(?:\bweekly\s+review\b|\breview\s+(?:of\s+)?my\s+week\b)",
            ),
            (
                IntentKind::TaskStats,
                r"(?:\btask\s+stat(?:s|istics)\b|\bstat(?:s|istics)\s+(?:about|for|on)\s+(?:my\s+)?tasks?\b)",
            ),
            (
                IntentKind::HabitStats,
                r"(?:\bhabit\s+stat(?:s|istics)\b|\bstat(?:s|istics)\s+(?:about|for|on)\s+(?:my\s+)?habits?\b)",
            ),
            (
                IntentKind::ProductivitySummary,
                r"(?:\bhow\s+productive\b|\bproductivity\b|\bsummar(?:y|ize|ise)\s+(?:of\s+)?my\s+(?:day|week|progress)\b|\bhow\s+am\s+i\s+doing\b)",
            ),
            (
                IntentKind::PrioritizeTasks,
                r"\bprioriti[sz]e\b",
            ),
            (
                IntentKind::SuggestNextTask,
                r"(?:\bwhat\s+should\s+i\s+(?:do|work\s+on)\b|\bsuggest\b|\brecommend\b)",
            ),
            // ── Generic lists ──
            (
                IntentKind::ListWorkspaces,
                r"(?:\b(?:show|list|view|see|display)\b.*\bworkspaces\b|^(?:my\s+)?workspaces$)",
            ),
            (
                IntentKind::ShowCurrentWorkspace,
                r"(?:\b(?:which|what)\s+workspace\b|\bcurrent\s+workspace\b)",
            ),
            (
                IntentKind::HabitStreak,
                r"\bstreaks?\b",
            ),
            (
                IntentKind::ListHabits,
                r"(?:\b(?:show|list|view|see|display)\b.*\bhabits?\b|^(?:my\s+)?habits$)",
            ),
            (
                IntentKind::ListReminders,
                r"(?:\b(?:show|list|view|see|display)\b.*\breminders?\b|^(?:my\s+)?reminders$)",
            ),
            (
                IntentKind::ShowNote,
                r"^(?:show|open|read)\s+(?:the\s+)?note\s+(?:called\s+|named\s+|about\s+)?(?P<title>.+)$",
            ),
            (
                IntentKind::ListNotes,
                r"(?:\b(?:show|list|view|see|display)\b.*\bnotes?\b|^(?:my\s+)?notes$)",
            ),
            (
                IntentKind::ListTasks,
                r"(?:\b(?:show|list|view|see|display|what\s+are)\b.*\btasks?\b|^(?:my\s+)?tasks$)",
            ),
            // ── Updates (before creation: "mark X done" contains no create verb) ──
            (
                IntentKind::CompleteTask,
                r"^(?:complete|finish)\s+(?:the\s+)?(?:task\s+)?(?:called\s+|named\s+)?(?P<title>.+)$",
            ),
            (
                IntentKind::CompleteTask,
                r"^mark\s+(?:the\s+)?(?:task\s+)?(?P<title>.+?)\s+(?:as\s+)?(?:done|complete|completed|finished)$",
            ),
            (
                IntentKind::ReopenTask,
                r"^(?:reopen|uncomplete|restore)\s+(?:the\s+)?(?:task\s+)?(?P<title>.+)$",
            ),
            (
                IntentKind::SetTaskDueDate,
                r"^(?:set|change|move)\s+(?:the\s+)?due\s*date\s+(?:of\s+|for\s+)?(?P<title>.+?)\s+to\s+(?P<date>.+)$",
            ),
            (
                IntentKind::SetTaskPriority,
                r"^(?:set|change)\s+(?:the\s+)?priority\s+(?:of\s+|for\s+)?(?P<title>.+?)\s+to\s+(?P<value>.+)$",
            ),
            (
                IntentKind::RenameWorkspace,
                r"^rename\s+(?:the\s+)?workspace\s+(?P<old_name>.+?)\s+to\s+(?P<new_name>.+)$",
            ),
            (
                IntentKind::RenameHabit,
                r"^rename\s+(?:the\s+)?habit\s+(?P<old_name>.+?)\s+to\s+(?P<new_name>.+)$",
            ),
            (
                IntentKind::RenameTask,
                r"^rename\s+(?:the\s+)?(?:task\s+)?(?P<old_name>.+?)\s+to\s+(?P<new_name>.+)$",
            ),
            (
                IntentKind::MoveTaskToWorkspace,
                r"^move\s+(?:the\s+)?(?:task\s+)?(?P<title>.+?)\s+(?:in)?to\s+(?:the\s+)?(?P<workspace>.+?)(?:\s+workspace)?$",
            ),
            (
                IntentKind::CheckInHabit,
                r"^(?:check\s*(?:in|off)|log)\s+(?:my\s+)?(?:habit\s+)?(?P<name>.+)$",
            ),
            (
                IntentKind::CheckInHabit,
                r"^i\s+did\s+(?:my\s+)?(?P<name>.+?)(?:\s+today)?$",
            ),
            (
                IntentKind::UpdateNote,
                r"^(?:update|edit|append\s+to)\s+(?:the\s+)?note\s+(?P<title>.+)$",
            ),
            // ── Creation ──
            (
                IntentKind::CreateTask,
                r"^(?:create|add|make|new)\s+(?:a\s+)?(?:new\s+)?task(?:\s+(?:called\s+|named\s+|to\s+|for\s+|:\s*)?(?P<title>.+))?$",
            ),
            (
                IntentKind::CreateHabit,
                r"^(?:create|add|make|new|start)\s+(?:a\s+)?(?:new\s+)?habit(?:\s+(?:called\s+|named\s+|of\s+|:\s*)?(?P<name>.+))?$",
            ),
            (
                IntentKind::CreateNote,
                r"^(?:create|add|make|new|write)\s+(?:a\s+)?(?:new\s+)?note(?:\s+(?:called\s+|named\s+|about\s+|:\s*)?(?P<title>.+))?$",
            ),
            (
                IntentKind::CreateWorkspace,
                r"^(?:create|add|make|new)\s+(?:a\s+)?(?:new\s+)?workspace(?:\s+(?:called\s+|named\s+)?(?P<workspace>.+))?$",
            ),
            (
                IntentKind::CreateReminder,
                r"^(?:remind\s+me\s+(?:to\s+|about\s+)?|(?:create|add|set)\s+(?:a\s+)?reminder\s+(?:to\s+|for\s+|about\s+)?)(?P<label>.+)$",
            ),
            // ── Small talk / meta ──
            (
                IntentKind::Greeting,
                r"^(?:hi|hello|hey|yo|good\s+(?:morning|afternoon|evening))\b",
            ),
            (
                IntentKind::Help,
                r"(?:^help\b|\bwhat\s+can\s+you\s+do\b|\bhow\s+do\s+i\s+use\b)",
            ),
            (
                IntentKind::Thanks,
                r"^(?:thanks|thank\s+you|thx|ty)\b",
            ),
            (
                IntentKind::Goodbye,
                r"^(?:bye|goodbye|good\s+night|see\s+you)\b",
            ),
        ];

        let table = entries
            .iter()
            .map(|(kind, pattern)| PatternEntry {
                kind: *kind,
                regex: Regex::new(pattern).expect("intent pattern must compile"),
            })
            .collect();

        // "in/to [the] <name> workspace" or "in/to workspace <name>".
        let workspace_mention = Regex::new(
            r"\b(?:in|to)\s+(?:the\s+)?(?:workspace\s+(?P<name_a>[a-z0-9 _\-]+?)|(?P<name_b>[a-z0-9_\-]+)\s+workspace)\b",
        )
        .expect("workspace mention pattern must compile");

        Self {
            table,
            workspace_mention,
        }
    }

    /// Classify one raw message. Total: any input yields a classification,
    /// degrading to `Unknown` rather than failing.
    pub fn classify(&self, text: &str) -> IntentClassification {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return IntentClassification::unknown();
        }

        // Multi-intent messages are deferred to the model wholesale; the
        // split segments ride along as extracted data.
        if let Some(segments) = split_multi_intent(&normalized) {
            let extracted = segments
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("segment_{}", i + 1), s.clone()))
                .collect();
            trace!(segments = segments.len(), "multi-intent message");
            return IntentClassification::new(IntentKind::MultiIntent, MATCH_CONFIDENCE, extracted);
        }

        for entry in &self.table {
            if let Some(caps) = entry.regex.captures(&normalized) {
                let mut extracted = Vec::new();
                for name in entry.regex.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        let value = clean_value(m.as_str());
                        if !value.is_empty() {
                            extracted.push((name.to_string(), value));
                        }
                    }
                }
                // Every batch-scope kind carries the flag, destructive or
                // not; the dispatcher decides whether to actually gate.
                if entry.kind.group() == IntentGroup::Batch {
                    extracted.push(("requires_confirmation".into(), "true".into()));
                }
                if entry.kind.is_creation() {
                    if let Some(m) = self.workspace_mention.find(&normalized) {
                        // The mention clause is routing data, not part of the
                        // entity name.
                        let clause = m.as_str();
                        for (_, value) in extracted.iter_mut() {
                            if let Some(idx) = value.find(clause) {
                                let rest = format!(
                                    "{}{}",
                                    &value[..idx],
                                    &value[idx + clause.len()..]
                                );
                                *value = rest.trim().to_string();
                            }
                        }
                        extracted.retain(|(_, v)| !v.is_empty());
                        if let Some(ws) = self.workspace_mention_in(&normalized) {
                            if !extracted.iter().any(|(k, _)| k == "workspace") {
                                extracted.push(("workspace".into(), ws));
                            }
                        }
                    }
                }
                trace!(kind = entry.kind.label(), "pattern match");
                return IntentClassification::new(entry.kind, MATCH_CONFIDENCE, extracted);
            }
        }

        IntentClassification::unknown()
    }

    /// Extract an explicit workspace mention from (already lowercased) text.
    /// Used by the dispatcher's ambiguity check as well as extraction.
    pub fn workspace_mention_in(&self, normalized: &str) -> Option<String> {
        self.workspace_mention.captures(normalized).and_then(|caps| {
            caps.name("name_a")
                .or_else(|| caps.name("name_b"))
                .map(|m| clean_value(m.as_str()))
        })
    }

    /// Table positions for a kind (test support for the ordering invariant).
    #[cfg(test)]
    fn positions_of(&self, kind: IntentKind) -> Vec<usize> {
        self.table
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Strip wrapping quotes and trailing punctuation from a captured value.
fn clean_value(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_end_matches(|c| c == '.' || c == '!' || c == '?')
        .trim()
        .to_string()
}

/// If the text contains a multi-intent marker and splitting on every marker
/// yields at least two non-empty segments, return the segments.
fn split_multi_intent(normalized: &str) -> Option<Vec<String>> {
    if !MULTI_INTENT_MARKERS.iter().any(|m| normalized.contains(m)) {
        return None;
    }
    let mut segments = vec![normalized.to_string()];
    for marker in MULTI_INTENT_MARKERS {
        segments = segments
            .iter()
            .flat_map(|s| s.split(marker).map(str::to_string))
            .collect();
    }
    let segments: Vec<String> = segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() >= 2 { Some(segments) } else { None }
}
