//! Conversation segmentation engine.
//!
//! Resolves every inbound user message to exactly one conversation,
//! creating, closing, and chaining conversations as topics shift. The
//! decision order is fixed: no active conversation, explicit intent,
//! long gap, periodic classification, fast path. Heuristics run first
//! so most messages never touch the classifier.

pub mod chain;
pub mod intent;
pub mod keywords;

use crate::classify::{spawn_summarize, Summarizer, TopicClassifier, TopicVerdict};
use crate::config::SegmentationConfig;
use crate::model::{Conversation, ConversationId, ConversationStatus, SessionId};
use crate::store::Store;
use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct SegmentationEngine {
    store: Arc<dyn Store>,
    classifier: Arc<dyn TopicClassifier>,
    summarizer: Arc<dyn Summarizer>,
    config: SegmentationConfig,
}

impl SegmentationEngine {
    pub fn new(
        store: Arc<dyn Store>,
        classifier: Arc<dyn TopicClassifier>,
        summarizer: Arc<dyn Summarizer>,
        config: SegmentationConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            summarizer,
            config,
        }
    }

    /// Resolve an inbound user message to its conversation id. Runs
    /// before the message is persisted; the returned conversation is
    /// active and already counts this message.
    pub async fn resolve_conversation(
        &self,
        session_id: &SessionId,
        gateway_id: &str,
        user_id: Option<&str>,
        text: &str,
    ) -> Result<ConversationId> {
        let now = Utc::now();

        let Some(active) = self.store.get_active_conversation(session_id).await? else {
            debug!(session_id = %session_id, "no active conversation, starting one");
            return self
                .start_conversation(session_id, gateway_id, user_id, text, &[], None)
                .await;
        };

        // Explicit new-topic intent always wins, and never searches
        // history: the user asked for a clean slate.
        if intent::wants_new_topic(text) {
            info!(conversation_id = %active.id, "explicit new-topic intent, closing");
            self.close_and_summarize(&active).await?;
            let convo = self
                .create_conversation(session_id, gateway_id, user_id, None, Vec::new(), None, &[])
                .await?;
            return Ok(convo.id);
        }

        let gap = now.signed_duration_since(active.last_message_at);
        if gap >= Duration::hours(self.config.gap_hours) {
            return self
                .resolve_after_gap(&active, session_id, gateway_id, user_id, text)
                .await;
        }

        if self.classification_due(&active) {
            return self
                .classify_and_continue(&active, session_id, gateway_id, user_id, text)
                .await;
        }

        // Fast path: recent activity, no trigger. Stay put.
        self.store.bump_conversation(&active.id, now).await?;
        Ok(active.id)
    }

    /// Render chain context for a conversation's prompt, walking at most
    /// `max_chain_depth` ancestors.
    pub async fn build_chain_context(&self, conversation_id: &ConversationId) -> Result<String> {
        let chain = self
            .store
            .get_conversation_chain(conversation_id, self.config.max_chain_depth)
            .await?;
        // The head of the chain is the active conversation itself; only
        // ancestors carry context worth rendering.
        Ok(chain::render_chain_context(&chain[1.min(chain.len())..]))
    }

    /// Periodic classification fires when the prospective message count
    /// reaches the start threshold and every `classify_interval`
    /// messages after that.
    fn classification_due(&self, active: &Conversation) -> bool {
        let prospective = active.message_count + 1;
        prospective >= self.config.classify_start
            && prospective % self.config.classify_interval == 0
    }

    async fn resolve_after_gap(
        &self,
        active: &Conversation,
        session_id: &SessionId,
        gateway_id: &str,
        user_id: Option<&str>,
        text: &str,
    ) -> Result<ConversationId> {
        let score = keywords::overlap(&active.topical_text(), text);
        let related = if score >= self.config.overlap_threshold {
            true
        } else {
            // Low overlap is inconclusive; ask the classifier with the
            // conversation metadata as sole context. On failure, chain
            // rather than fragment.
            match self
                .classifier
                .classify_topic(&[], text, active, gateway_id)
                .await
            {
                Ok(verdict) => verdict.same_topic,
                Err(e) => {
                    warn!(error = %e, "gap classifier failed, assuming same topic");
                    true
                }
            }
        };

        // A long gap always closes the stale conversation, related or
        // not. Relatedness only decides whether the new one chains.
        self.close_and_summarize(active).await?;

        if related {
            info!(previous = %active.id, overlap = score, "gap return, chaining to previous topic");
            let convo = self
                .create_conversation(
                    session_id,
                    gateway_id,
                    user_id,
                    active.title.clone(),
                    active.tags.clone(),
                    Some(active),
                    &[],
                )
                .await?;
            Ok(convo.id)
        } else {
            self.start_conversation(
                session_id,
                gateway_id,
                user_id,
                text,
                &[active.id.clone()],
                None,
            )
            .await
        }
    }

    async fn classify_and_continue(
        &self,
        active: &Conversation,
        session_id: &SessionId,
        gateway_id: &str,
        user_id: Option<&str>,
        text: &str,
    ) -> Result<ConversationId> {
        let now = Utc::now();
        let window = self
            .store
            .recent_messages(&active.id, self.config.recent_window)
            .await
            .unwrap_or_default();

        let verdict = match self
            .classifier
            .classify_topic(&window, text, active, gateway_id)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                // Classification is advisory; on failure the message
                // stays in the active conversation.
                warn!(error = %e, conversation_id = %active.id, "classifier failed, staying");
                self.store.bump_conversation(&active.id, now).await?;
                return Ok(active.id.clone());
            }
        };

        if verdict.same_topic {
            self.backfill_metadata(active, &verdict).await;
            self.store.bump_conversation(&active.id, now).await?;
            return Ok(active.id.clone());
        }

        info!(conversation_id = %active.id, "classifier detected topic shift, closing");
        self.close_and_summarize(active).await?;
        self.start_conversation(
            session_id,
            gateway_id,
            user_id,
            text,
            &[active.id.clone()],
            Some(verdict),
        )
        .await
    }

    /// Fill in title/tags the classifier suggested, without clobbering
    /// anything already set.
    async fn backfill_metadata(&self, active: &Conversation, verdict: &TopicVerdict) {
        let mut patch = crate::store::ConversationPatch::default();
        if active.title.is_none() {
            patch.title = verdict.suggested_title.clone();
        }
        if active.tags.is_empty() && !verdict.new_tags.is_empty() {
            patch.tags = Some(verdict.new_tags.clone());
        }
        if patch.title.is_none() && patch.tags.is_none() {
            return;
        }
        if let Err(e) = self.store.update_conversation(&active.id, patch).await {
            warn!(error = %e, conversation_id = %active.id, "metadata backfill failed");
        }
    }

    async fn close_and_summarize(&self, convo: &Conversation) -> Result<()> {
        self.store.close_conversation(&convo.id, Utc::now()).await?;
        spawn_summarize(self.summarizer.clone(), convo.id.clone());
        Ok(())
    }

    /// Start a conversation for a message that does not continue the
    /// active one (or when none exists): search recently closed
    /// conversations on this gateway for a topical match and chain to
    /// the best one, otherwise start at depth 1.
    async fn start_conversation(
        &self,
        session_id: &SessionId,
        gateway_id: &str,
        user_id: Option<&str>,
        text: &str,
        exclude: &[ConversationId],
        seed: Option<TopicVerdict>,
    ) -> Result<ConversationId> {
        let (title, tags) = match seed {
            Some(v) => (v.suggested_title, v.new_tags),
            None => (None, Vec::new()),
        };

        // A requested clean slate never resumes old topics.
        if intent::wants_new_topic(text) {
            let convo = self
                .create_conversation(session_id, gateway_id, user_id, title, tags, None, &[])
                .await?;
            return Ok(convo.id);
        }

        let threshold = if intent::wants_resume(text) {
            self.config.resume_overlap_threshold
        } else {
            self.config.overlap_threshold
        };

        let candidates = self
            .store
            .find_related_conversations(gateway_id, exclude, self.config.search_window)
            .await?;

        let mut scored: Vec<(usize, &Conversation)> = candidates
            .iter()
            .map(|c| (keywords::overlap(&c.topical_text(), text), c))
            .filter(|(score, _)| *score >= threshold)
            .collect();
        // Stable sort keeps recency order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        if let Some(&(score, best)) = scored.first() {
            let related: Vec<ConversationId> = scored
                .iter()
                .skip(1)
                .take(self.config.related_limit)
                .map(|(_, c)| c.id.clone())
                .collect();
            info!(previous = %best.id, overlap = score, "resuming earlier topic");
            let convo = self
                .create_conversation(
                    session_id,
                    gateway_id,
                    user_id,
                    title.or_else(|| best.title.clone()),
                    tags,
                    Some(best),
                    &related,
                )
                .await?;
            return Ok(convo.id);
        }

        let convo = self
            .create_conversation(session_id, gateway_id, user_id, title, tags, None, &[])
            .await?;
        Ok(convo.id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_conversation(
        &self,
        session_id: &SessionId,
        gateway_id: &str,
        user_id: Option<&str>,
        title: Option<String>,
        tags: Vec<String>,
        previous: Option<&Conversation>,
        related: &[ConversationId],
    ) -> Result<Conversation> {
        let now = Utc::now();
        let convo = Conversation {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.clone(),
            gateway_id: gateway_id.to_string(),
            user_id: user_id.map(str::to_string),
            status: ConversationStatus::Active,
            depth: previous.map_or(1, |p| p.depth + 1),
            previous_convo_id: previous.map(|p| p.id.clone()),
            related_convo_ids: related.to_vec(),
            title,
            tags,
            topics: Vec::new(),
            summary: None,
            decisions: Vec::new(),
            state_updates: Vec::new(),
            // Counts the inbound message being resolved.
            message_count: 1,
            first_message_at: now,
            last_message_at: now,
            closed_at: None,
        };
        self.store.create_conversation(convo).await
    }
}
