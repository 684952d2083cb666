use crate::model::{
    ActiveRun, Conversation, ConversationId, Decision, Message, MessageDraft, MessageId,
    RunState, Session, SessionId, StateUpdate, UsageRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Verdict from the budget collaborator, consulted before any model call.
#[derive(Debug, Clone, Default)]
pub struct BudgetVerdict {
    pub blocked: bool,
    pub reason: Option<String>,
    /// Advisory hint only. Never silently overrides an explicit
    /// user-chosen model; the caller decides whether to surface it.
    pub suggested_model: Option<String>,
}

/// Partial update applied to a conversation. `None` leaves a field
/// untouched; closed conversations accept only summarizer fields.
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub topics: Option<Vec<String>>,
    pub summary: Option<String>,
    pub decisions: Option<Vec<Decision>>,
    pub state_updates: Option<Vec<StateUpdate>>,
}

/// Message store client — the persistence seam the core talks through.
///
/// Every method is a single round-trip; the core holds no locks across
/// calls and assumes single-writer access to a session's active
/// conversation (the channel sequencer provides that).
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name, for logs and diagnostics.
    fn name(&self) -> &str;

    // ── Sessions ─────────────────────────────────────────────

    async fn find_or_create_session(
        &self,
        agent_id: &str,
        channel_id: &str,
        external_user_id: &str,
    ) -> anyhow::Result<Session>;

    async fn get_session(&self, id: &SessionId) -> anyhow::Result<Option<Session>>;

    /// Bump `message_count` / `last_message_at` for an inbound message.
    async fn touch_session(&self, id: &SessionId, at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn update_session_meta(
        &self,
        id: &SessionId,
        meta: serde_json::Value,
    ) -> anyhow::Result<()>;

    // ── Conversations ────────────────────────────────────────

    async fn get_active_conversation(
        &self,
        session_id: &SessionId,
    ) -> anyhow::Result<Option<Conversation>>;

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> anyhow::Result<Option<Conversation>>;

    /// Insert a new conversation. Backends must reject a second active
    /// conversation for the same session.
    async fn create_conversation(&self, convo: Conversation) -> anyhow::Result<Conversation>;

    async fn close_conversation(
        &self,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn update_conversation(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
    ) -> anyhow::Result<()>;

    /// Bump `message_count` / `last_message_at` for a continuation.
    async fn bump_conversation(
        &self,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Recently closed conversations across a gateway, newest first,
    /// excluding the given ids. Used by the resume-topic search.
    async fn find_related_conversations(
        &self,
        gateway_id: &str,
        exclude: &[ConversationId],
        limit: usize,
    ) -> anyhow::Result<Vec<Conversation>>;

    /// Walk `previous_convo_id` links starting from `id`, newest first,
    /// at most `max_depth` entries including `id` itself.
    async fn get_conversation_chain(
        &self,
        id: &ConversationId,
        max_depth: usize,
    ) -> anyhow::Result<Vec<Conversation>>;

    // ── Messages ─────────────────────────────────────────────

    /// Persist a message, assigning `seq` atomically. `seq` is strictly
    /// increasing and gapless per session.
    async fn create_message(&self, draft: MessageDraft) -> anyhow::Result<Message>;

    async fn list_messages_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> anyhow::Result<Vec<Message>>;

    /// Last `limit` messages of a conversation, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> anyhow::Result<Vec<Message>>;

    /// Re-home a message after a tool-triggered conversation switch.
    async fn update_message_conversation(
        &self,
        message_id: &MessageId,
        conversation_id: &ConversationId,
    ) -> anyhow::Result<()>;

    // ── Usage / budget ───────────────────────────────────────

    async fn check_budget(&self, session_id: &SessionId) -> anyhow::Result<BudgetVerdict>;

    async fn record_usage(&self, record: UsageRecord) -> anyhow::Result<()>;

    // ── Worker records (tool invocation observability) ───────

    async fn create_worker(
        &self,
        session_id: &SessionId,
        tool_call_id: &str,
        tool_name: &str,
    ) -> anyhow::Result<String>;

    async fn complete_worker(&self, worker_id: &str, success: bool) -> anyhow::Result<()>;

    // ── Active runs ──────────────────────────────────────────

    async fn create_run(&self, session_id: &SessionId) -> anyhow::Result<ActiveRun>;

    async fn set_run_state(&self, run_id: &str, state: RunState) -> anyhow::Result<()>;

    async fn delete_run(&self, run_id: &str) -> anyhow::Result<()>;
}
