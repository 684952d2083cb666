//! Shared data model for the gateway core.
//!
//! Sessions, conversations, messages, and run records are plain serde
//! types; every store backend persists these shapes as-is. Ids are
//! opaque strings so backends can use UUIDs, ULIDs, or native row ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = String;
pub type ConversationId = String;
pub type MessageId = String;

/// One continuous identity on one channel (e.g. one Telegram chat).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent_id: String,
    pub channel_id: String,
    pub external_user_id: String,
    pub last_message_at: DateTime<Utc>,
    pub message_count: u64,
    /// Free-form per-session settings (e.g. thinking-level override).
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Closed,
}

/// A recorded decision inside a closed conversation's summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub what: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
}

/// A durable fact extracted by the summarizer, keyed by domain/attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdate {
    pub domain: String,
    pub attribute: String,
    pub value: String,
}

/// A topical segment within a session.
///
/// At most one conversation per session is `Active` at any time. Closed
/// conversations are immutable except for the summarizer back-filling
/// `summary`, `decisions`, and `state_updates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub session_id: SessionId,
    pub gateway_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub status: ConversationStatus,
    /// 1-based position within the chain.
    pub depth: u32,
    /// Weak back-reference to the conversation this one resumes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_convo_id: Option<ConversationId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_convo_ids: Vec<ConversationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<Decision>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_updates: Vec<StateUpdate>,
    pub message_count: u64,
    pub first_message_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Text fields considered by the segmentation keyword heuristics.
    pub fn topical_text(&self) -> String {
        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(title);
            out.push(' ');
        }
        if let Some(summary) = &self.summary {
            out.push_str(summary);
            out.push(' ');
        }
        for tag in self.tags.iter().chain(self.topics.iter()) {
            out.push_str(tag);
            out.push(' ');
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

/// Input/output token counts for one model call or one whole turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input += other.input;
        self.output += other.output;
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// A persisted chat message. `seq` is assigned by the store at create
/// time and is strictly monotonic per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub role: Role,
    pub content: String,
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Everything the caller supplies when persisting a message; the store
/// fills in `id`, `seq`, and `created_at`.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub session_id: SessionId,
    pub conversation_id: Option<ConversationId>,
    pub role: Role,
    pub content: String,
    pub tokens: Option<TokenUsage>,
    pub cost: Option<f64>,
    pub model: Option<String>,
    pub latency_ms: Option<u64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Thinking,
    Streaming,
    Complete,
    Error,
}

/// Ephemeral record of one in-flight assistant turn. Deleted a few
/// seconds after completion by the run janitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRun {
    pub id: String,
    pub session_id: SessionId,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
}

/// One tool invocation requested by the model within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Outcome of executing one tool call, fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

/// A recorded usage row, one per completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub session_id: SessionId,
    pub conversation_id: Option<ConversationId>,
    pub model: String,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_status_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConversationStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(
            serde_json::to_string(&ConversationStatus::Closed).unwrap(),
            "\"closed\""
        );
    }

    #[test]
    fn role_serde_roundtrip() {
        for role in [Role::User, Role::Assistant, Role::System] {
            let json = serde_json::to_string(&role).unwrap();
            let parsed: Role = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn token_usage_accumulates() {
        let mut usage = TokenUsage { input: 10, output: 5 };
        usage.add(TokenUsage { input: 3, output: 7 });
        assert_eq!(usage.input, 13);
        assert_eq!(usage.output, 12);
        assert_eq!(usage.total(), 25);
    }

    #[test]
    fn topical_text_merges_title_summary_and_tags() {
        let convo = Conversation {
            id: "c1".into(),
            session_id: "s1".into(),
            gateway_id: "g1".into(),
            user_id: None,
            status: ConversationStatus::Active,
            depth: 1,
            previous_convo_id: None,
            related_convo_ids: vec![],
            title: Some("OAuth callbacks".into()),
            tags: vec!["oauth".into()],
            topics: vec!["tokens".into()],
            summary: Some("Refresh flow debugging".into()),
            decisions: vec![],
            state_updates: vec![],
            message_count: 0,
            first_message_at: Utc::now(),
            last_message_at: Utc::now(),
            closed_at: None,
        };
        let text = convo.topical_text();
        assert!(text.contains("OAuth callbacks"));
        assert!(text.contains("Refresh flow debugging"));
        assert!(text.contains("oauth"));
        assert!(text.contains("tokens"));
    }
}
