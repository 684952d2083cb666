//! Topic classification and conversation summarization seams.
//!
//! Both are external collaborators: the classifier is consulted only
//! when the segmentation heuristics are inconclusive or the periodic
//! trigger fires, and the summarizer runs fire-and-forget after a
//! conversation closes. Failures of either never surface to the user.

use crate::model::{Conversation, ConversationId, Message};
use async_trait::async_trait;
use std::sync::Arc;

/// Classifier verdict for "does this message continue the active topic".
#[derive(Debug, Clone, Default)]
pub struct TopicVerdict {
    pub same_topic: bool,
    pub suggested_title: Option<String>,
    pub new_tags: Vec<String>,
}

#[async_trait]
pub trait TopicClassifier: Send + Sync {
    /// Judge whether `new_text` continues `active`. `window` holds the
    /// recent messages of the active conversation (possibly empty when
    /// only the conversation summary is available as context).
    async fn classify_topic(
        &self,
        window: &[Message],
        new_text: &str,
        active: &Conversation,
        gateway_id: &str,
    ) -> anyhow::Result<TopicVerdict>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Compress a closed conversation into summary/decisions/state
    /// updates, writing them back through the store.
    async fn summarize_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> anyhow::Result<()>;
}

/// Kick off summarization without blocking the response path. Failures
/// are logged and dropped.
pub fn spawn_summarize(summarizer: Arc<dyn Summarizer>, conversation_id: ConversationId) {
    tokio::spawn(async move {
        if let Err(e) = summarizer.summarize_conversation(&conversation_id).await {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "summarization failed");
        }
    });
}

/// No-op summarizer for deployments without a summarization backend.
pub struct NoopSummarizer;

#[async_trait]
impl Summarizer for NoopSummarizer {
    async fn summarize_conversation(
        &self,
        _conversation_id: &ConversationId,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
