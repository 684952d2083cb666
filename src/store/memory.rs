//! In-memory store backend.
//!
//! Backs tests and single-process deployments. All state lives behind
//! one mutex; every trait method is a single critical section, matching
//! the single-round-trip contract of the [`Store`] trait.

use super::traits::{BudgetVerdict, ConversationPatch, Store};
use crate::model::{
    ActiveRun, Conversation, ConversationId, ConversationStatus, Message, MessageDraft,
    MessageId, RunState, Session, SessionId, UsageRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct WorkerRecord {
    session_id: SessionId,
    tool_call_id: String,
    tool_name: String,
    completed: Option<bool>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: Vec<Message>,
    seq_counters: HashMap<SessionId, u64>,
    usage: Vec<UsageRecord>,
    workers: HashMap<String, WorkerRecord>,
    runs: HashMap<String, ActiveRun>,
}

/// Process-local store with an optional spend ceiling for budget checks.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    spend_limit_usd: Option<f64>,
    cheaper_model_hint: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            spend_limit_usd: None,
            cheaper_model_hint: None,
        }
    }

    /// Block turns once recorded spend reaches `limit_usd`.
    pub fn with_spend_limit(mut self, limit_usd: f64, cheaper_model: Option<String>) -> Self {
        self.spend_limit_usd = Some(limit_usd);
        self.cheaper_model_hint = cheaper_model;
        self
    }

    fn session_key(agent_id: &str, channel_id: &str, external_user_id: &str) -> String {
        format!("{agent_id}:{channel_id}:{external_user_id}")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Test helper: shift a conversation's timestamps into the past so
    /// gap-based behavior can be exercised without sleeping.
    pub(crate) async fn age_conversation(&self, id: &ConversationId, by: chrono::Duration) {
        let mut inner = self.inner.lock();
        if let Some(convo) = inner.conversations.get_mut(id) {
            convo.first_message_at -= by;
            convo.last_message_at -= by;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_or_create_session(
        &self,
        agent_id: &str,
        channel_id: &str,
        external_user_id: &str,
    ) -> anyhow::Result<Session> {
        let key = Self::session_key(agent_id, channel_id, external_user_id);
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.sessions.values().find(|s| {
            Self::session_key(&s.agent_id, &s.channel_id, &s.external_user_id) == key
        }) {
            return Ok(existing.clone());
        }
        let session = Session {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            channel_id: channel_id.to_string(),
            external_user_id: external_user_id.to_string(),
            last_message_at: Utc::now(),
            message_count: 0,
            meta: serde_json::Value::Null,
        };
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &SessionId) -> anyhow::Result<Option<Session>> {
        Ok(self.inner.lock().sessions.get(id).cloned())
    }

    async fn touch_session(&self, id: &SessionId, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("unknown session: {id}"))?;
        session.message_count += 1;
        session.last_message_at = at;
        Ok(())
    }

    async fn update_session_meta(
        &self,
        id: &SessionId,
        meta: serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("unknown session: {id}"))?;
        session.meta = meta;
        Ok(())
    }

    async fn get_active_conversation(
        &self,
        session_id: &SessionId,
    ) -> anyhow::Result<Option<Conversation>> {
        Ok(self
            .inner
            .lock()
            .conversations
            .values()
            .find(|c| c.session_id == *session_id && c.status == ConversationStatus::Active)
            .cloned())
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> anyhow::Result<Option<Conversation>> {
        Ok(self.inner.lock().conversations.get(id).cloned())
    }

    async fn create_conversation(&self, convo: Conversation) -> anyhow::Result<Conversation> {
        let mut inner = self.inner.lock();
        if convo.status == ConversationStatus::Active {
            let clash = inner.conversations.values().any(|c| {
                c.session_id == convo.session_id && c.status == ConversationStatus::Active
            });
            anyhow::ensure!(
                !clash,
                "session {} already has an active conversation",
                convo.session_id
            );
        }
        inner.conversations.insert(convo.id.clone(), convo.clone());
        Ok(convo)
    }

    async fn close_conversation(
        &self,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let convo = inner
            .conversations
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("unknown conversation: {id}"))?;
        convo.status = ConversationStatus::Closed;
        convo.closed_at = Some(at);
        Ok(())
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let convo = inner
            .conversations
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("unknown conversation: {id}"))?;
        if let Some(title) = patch.title {
            convo.title = Some(title);
        }
        if let Some(tags) = patch.tags {
            convo.tags = tags;
        }
        if let Some(topics) = patch.topics {
            convo.topics = topics;
        }
        if let Some(summary) = patch.summary {
            convo.summary = Some(summary);
        }
        if let Some(decisions) = patch.decisions {
            convo.decisions = decisions;
        }
        if let Some(updates) = patch.state_updates {
            convo.state_updates = updates;
        }
        Ok(())
    }

    async fn bump_conversation(
        &self,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let convo = inner
            .conversations
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("unknown conversation: {id}"))?;
        convo.message_count += 1;
        convo.last_message_at = at;
        Ok(())
    }

    async fn find_related_conversations(
        &self,
        gateway_id: &str,
        exclude: &[ConversationId],
        limit: usize,
    ) -> anyhow::Result<Vec<Conversation>> {
        let inner = self.inner.lock();
        let mut closed: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| {
                c.gateway_id == gateway_id
                    && c.status == ConversationStatus::Closed
                    && !exclude.contains(&c.id)
            })
            .cloned()
            .collect();
        closed.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        closed.truncate(limit);
        Ok(closed)
    }

    async fn get_conversation_chain(
        &self,
        id: &ConversationId,
        max_depth: usize,
    ) -> anyhow::Result<Vec<Conversation>> {
        let inner = self.inner.lock();
        let mut chain = Vec::new();
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            if chain.len() >= max_depth {
                break;
            }
            let Some(convo) = inner.conversations.get(&current) else {
                break;
            };
            cursor = convo.previous_convo_id.clone();
            chain.push(convo.clone());
        }
        Ok(chain)
    }

    async fn create_message(&self, draft: MessageDraft) -> anyhow::Result<Message> {
        let mut inner = self.inner.lock();
        anyhow::ensure!(
            inner.sessions.contains_key(&draft.session_id),
            "unknown session: {}",
            draft.session_id
        );
        let seq = inner
            .seq_counters
            .entry(draft.session_id.clone())
            .and_modify(|s| *s += 1)
            .or_insert(1);
        let message = Message {
            id: Uuid::new_v4().to_string(),
            session_id: draft.session_id,
            conversation_id: draft.conversation_id,
            role: draft.role,
            content: draft.content,
            seq: *seq,
            tokens: draft.tokens,
            cost: draft.cost,
            model: draft.model,
            latency_ms: draft.latency_ms,
            metadata: draft.metadata,
            created_at: Utc::now(),
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> anyhow::Result<Vec<Message>> {
        let inner = self.inner.lock();
        let mut out: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id.as_deref() == Some(conversation_id.as_str()))
            .cloned()
            .collect();
        out.sort_by_key(|m| m.seq);
        Ok(out)
    }

    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> anyhow::Result<Vec<Message>> {
        let mut all = self.list_messages_by_conversation(conversation_id).await?;
        if all.len() > limit {
            all.drain(..all.len() - limit);
        }
        Ok(all)
    }

    async fn update_message_conversation(
        &self,
        message_id: &MessageId,
        conversation_id: &ConversationId,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == *message_id)
            .ok_or_else(|| anyhow::anyhow!("unknown message: {message_id}"))?;
        message.conversation_id = Some(conversation_id.clone());
        Ok(())
    }

    async fn check_budget(&self, _session_id: &SessionId) -> anyhow::Result<BudgetVerdict> {
        let Some(limit) = self.spend_limit_usd else {
            return Ok(BudgetVerdict::default());
        };
        let spent: f64 = self.inner.lock().usage.iter().map(|u| u.cost_usd).sum();
        if spent >= limit {
            return Ok(BudgetVerdict {
                blocked: true,
                reason: Some(format!("spend limit reached (${spent:.2} of ${limit:.2})")),
                suggested_model: self.cheaper_model_hint.clone(),
            });
        }
        Ok(BudgetVerdict::default())
    }

    async fn record_usage(&self, record: UsageRecord) -> anyhow::Result<()> {
        self.inner.lock().usage.push(record);
        Ok(())
    }

    async fn create_worker(
        &self,
        session_id: &SessionId,
        tool_call_id: &str,
        tool_name: &str,
    ) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.inner.lock().workers.insert(
            id.clone(),
            WorkerRecord {
                session_id: session_id.clone(),
                tool_call_id: tool_call_id.to_string(),
                tool_name: tool_name.to_string(),
                completed: None,
            },
        );
        Ok(id)
    }

    async fn complete_worker(&self, worker_id: &str, success: bool) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let worker = inner
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| anyhow::anyhow!("unknown worker: {worker_id}"))?;
        worker.completed = Some(success);
        Ok(())
    }

    async fn create_run(&self, session_id: &SessionId) -> anyhow::Result<ActiveRun> {
        let run = ActiveRun {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.clone(),
            state: RunState::Thinking,
            started_at: Utc::now(),
        };
        self.inner.lock().runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn set_run_state(&self, run_id: &str, state: RunState) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| anyhow::anyhow!("unknown run: {run_id}"))?;
        run.state = state;
        Ok(())
    }

    async fn delete_run(&self, run_id: &str) -> anyhow::Result<()> {
        self.inner.lock().runs.remove(run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn draft(session_id: &str, content: &str) -> MessageDraft {
        MessageDraft {
            session_id: session_id.into(),
            role: Role::User,
            content: content.into(),
            ..MessageDraft::default()
        }
    }

    fn convo(id: &str, session_id: &str, status: ConversationStatus) -> Conversation {
        Conversation {
            id: id.into(),
            session_id: session_id.into(),
            gateway_id: "gw".into(),
            user_id: None,
            status,
            depth: 1,
            previous_convo_id: None,
            related_convo_ids: vec![],
            title: None,
            tags: vec![],
            topics: vec![],
            summary: None,
            decisions: vec![],
            state_updates: vec![],
            message_count: 0,
            first_message_at: Utc::now(),
            last_message_at: Utc::now(),
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn find_or_create_session_is_idempotent() {
        let store = MemoryStore::new();
        let a = store
            .find_or_create_session("agent", "telegram", "u1")
            .await
            .unwrap();
        let b = store
            .find_or_create_session("agent", "telegram", "u1")
            .await
            .unwrap();
        assert_eq!(a.id, b.id);

        let other = store
            .find_or_create_session("agent", "discord", "u1")
            .await
            .unwrap();
        assert_ne!(a.id, other.id);
    }

    #[tokio::test]
    async fn seq_is_monotonic_and_gapless_per_session() {
        let store = MemoryStore::new();
        let s1 = store
            .find_or_create_session("agent", "telegram", "u1")
            .await
            .unwrap();
        let s2 = store
            .find_or_create_session("agent", "telegram", "u2")
            .await
            .unwrap();

        for i in 0..5 {
            let m = store.create_message(draft(&s1.id, "hi")).await.unwrap();
            assert_eq!(m.seq, i + 1);
        }
        let m = store.create_message(draft(&s2.id, "hi")).await.unwrap();
        assert_eq!(m.seq, 1, "seq counters are per session");
    }

    #[tokio::test]
    async fn second_active_conversation_per_session_is_rejected() {
        let store = MemoryStore::new();
        let session = store
            .find_or_create_session("agent", "telegram", "u1")
            .await
            .unwrap();
        store
            .create_conversation(convo("c1", &session.id, ConversationStatus::Active))
            .await
            .unwrap();
        assert!(store
            .create_conversation(convo("c2", &session.id, ConversationStatus::Active))
            .await
            .is_err());

        store
            .close_conversation(&"c1".into(), Utc::now())
            .await
            .unwrap();
        store
            .create_conversation(convo("c2", &session.id, ConversationStatus::Active))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn chain_walk_stops_at_depth_limit() {
        let store = MemoryStore::new();
        let session = store
            .find_or_create_session("agent", "telegram", "u1")
            .await
            .unwrap();
        let mut prev: Option<String> = None;
        for i in 0..8u32 {
            let mut c = convo(&format!("c{i}"), &session.id, ConversationStatus::Closed);
            c.depth = i + 1;
            c.previous_convo_id = prev.clone();
            c.closed_at = Some(Utc::now());
            store.create_conversation(c).await.unwrap();
            prev = Some(format!("c{i}"));
        }
        let chain = store.get_conversation_chain(&"c7".into(), 5).await.unwrap();
        assert_eq!(chain.len(), 5);
        assert_eq!(chain[0].id, "c7");
        assert_eq!(chain[4].id, "c3");
    }

    #[tokio::test]
    async fn budget_blocks_once_limit_reached() {
        let store = MemoryStore::new().with_spend_limit(0.5, Some("mini".into()));
        let session = store
            .find_or_create_session("agent", "telegram", "u1")
            .await
            .unwrap();

        let verdict = store.check_budget(&session.id).await.unwrap();
        assert!(!verdict.blocked);

        store
            .record_usage(UsageRecord {
                session_id: session.id.clone(),
                conversation_id: None,
                model: "big".into(),
                tokens: crate::model::TokenUsage { input: 1, output: 1 },
                cost_usd: 0.6,
                latency_ms: 10,
                recorded_at: Utc::now(),
            })
            .await
            .unwrap();

        let verdict = store.check_budget(&session.id).await.unwrap();
        assert!(verdict.blocked);
        assert_eq!(verdict.suggested_model.as_deref(), Some("mini"));
    }

    #[tokio::test]
    async fn update_message_conversation_rehomes_once_written() {
        let store = MemoryStore::new();
        let session = store
            .find_or_create_session("agent", "telegram", "u1")
            .await
            .unwrap();
        let mut d = draft(&session.id, "hello");
        d.conversation_id = Some("c1".into());
        let message = store.create_message(d).await.unwrap();

        store
            .update_message_conversation(&message.id, &"c2".into())
            .await
            .unwrap();
        let listed = store.list_messages_by_conversation(&"c2".into()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, message.id);
    }
}
