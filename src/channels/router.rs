//! Inbound message router.
//!
//! The router is the top of the pipeline: dedup, session resolution,
//! budget gate, conversation segmentation, then the turn orchestrator,
//! finally chunked delivery back through the channel. A newer message
//! from the same session cancels the in-flight turn.

use crate::agent::{Orchestrator, TurnRequest, TurnSink};
use crate::config::Config;
use crate::error::TurnError;
use crate::gate::{message_key, DedupStore};
use crate::model::{MessageDraft, Role, SessionId};
use crate::providers::ChatMessage;
use crate::segmentation::SegmentationEngine;
use crate::store::Store;
use crate::tools::TurnContext;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chunk_text;
use super::sequencer::Sequencer;
use super::traits::{Channel, InboundMessage};
use crate::agent::NoopSink;

/// How many persisted messages feed the model as history.
const HISTORY_WINDOW: usize = 40;

pub struct Router {
    store: Arc<dyn Store>,
    segmentation: SegmentationEngine,
    orchestrator: Orchestrator,
    dedup: Arc<dyn DedupStore>,
    config: Config,
    /// One token per session; replaced (and the old one cancelled) when
    /// a newer message arrives.
    in_flight: Mutex<HashMap<SessionId, CancellationToken>>,
}

impl Router {
    pub fn new(
        store: Arc<dyn Store>,
        segmentation: SegmentationEngine,
        orchestrator: Orchestrator,
        dedup: Arc<dyn DedupStore>,
        config: Config,
    ) -> Self {
        Self {
            store,
            segmentation,
            orchestrator,
            dedup,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Process one inbound message end to end. Returns `Ok(())` for
    /// handled-and-dropped cases (duplicates, cancellations, budget
    /// blocks); errors are reserved for infrastructure failures.
    pub async fn handle_inbound(
        &self,
        channel: &dyn Channel,
        inbound: InboundMessage,
        sink: &dyn TurnSink,
    ) -> anyhow::Result<()> {
        let session = self
            .store
            .find_or_create_session(&self.config.agent_id, &inbound.channel, &inbound.external_user_id)
            .await?;

        let key = message_key(&session.id, &inbound.text);
        if self.dedup.seen(key) {
            debug!(session_id = %session.id, "dropping duplicate inbound message");
            return Ok(());
        }
        self.dedup.remember(key);

        self.store.touch_session(&session.id, Utc::now()).await?;

        // A newer message supersedes whatever turn is still running.
        let cancel = self.replace_in_flight(&session.id);

        // Budget gate runs before any model work; the block reason is
        // persisted so the refusal shows up in history.
        let verdict = self.store.check_budget(&session.id).await?;
        if verdict.blocked {
            let mut reply = verdict
                .reason
                .unwrap_or_else(|| "Usage budget exhausted.".to_string());
            if let Some(model) = verdict.suggested_model {
                reply.push_str(&format!(" Consider switching to '{model}'."));
            }
            info!(session_id = %session.id, "turn blocked by budget gate");
            self.store
                .create_message(MessageDraft {
                    session_id: session.id.clone(),
                    role: Role::Assistant,
                    content: reply.clone(),
                    ..MessageDraft::default()
                })
                .await?;
            channel.send(&inbound.external_user_id, &reply).await?;
            return Ok(());
        }

        // Segmentation failures degrade to an unsegmented turn rather
        // than dropping the message.
        let conversation_id = match self
            .segmentation
            .resolve_conversation(
                &session.id,
                &self.config.gateway_id,
                Some(&inbound.external_user_id),
                &inbound.text,
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, session_id = %session.id, "segmentation failed");
                None
            }
        };

        let user_message = self
            .store
            .create_message(MessageDraft {
                session_id: session.id.clone(),
                conversation_id: conversation_id.clone(),
                role: Role::User,
                content: inbound.text.clone(),
                ..MessageDraft::default()
            })
            .await?;

        let system_prompt = self.build_system_prompt(conversation_id.as_deref()).await;
        let history = self
            .build_history(conversation_id.as_deref(), &inbound.text)
            .await?;

        channel.start_typing(&inbound.external_user_id).await;
        let result = self
            .orchestrator
            .run_turn(
                TurnRequest {
                    system_prompt,
                    history,
                    model: self.config.default_model.clone(),
                    temperature: self.config.default_temperature,
                    context: TurnContext {
                        gateway_id: self.config.gateway_id.clone(),
                        agent_id: self.config.agent_id.clone(),
                        session_id: session.id.clone(),
                        user_id: Some(inbound.external_user_id.clone()),
                        user_role: None,
                    },
                    conversation_id,
                    user_message_id: Some(user_message.id),
                },
                &cancel,
                sink,
            )
            .await;
        channel.stop_typing(&inbound.external_user_id).await;

        match result {
            Ok(outcome) => {
                for chunk in chunk_text(&outcome.text, channel.max_message_len()) {
                    channel.send(&inbound.external_user_id, &chunk).await?;
                }
                Ok(())
            }
            // Superseded by a newer message; say nothing.
            Err(TurnError::Cancelled) => Ok(()),
            Err(e) => {
                warn!(error = %e, session_id = %session.id, "turn failed");
                channel
                    .send(
                        &inbound.external_user_id,
                        "Sorry, something went wrong handling that message.",
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Queue an inbound message on its per-user lane so messages from
    /// one user process in arrival order while users stay independent.
    pub fn dispatch(
        self: &Arc<Self>,
        sequencer: &Sequencer,
        channel: Arc<dyn Channel>,
        inbound: InboundMessage,
    ) {
        let key = format!("{}:{}", inbound.channel, inbound.external_user_id);
        let router = Arc::clone(self);
        sequencer.enqueue(
            &key,
            Box::pin(async move {
                if let Err(e) = router
                    .handle_inbound(channel.as_ref(), inbound, &NoopSink)
                    .await
                {
                    tracing::error!(error = %e, "inbound handling failed");
                }
            }),
        );
    }

    fn replace_in_flight(&self, session_id: &SessionId) -> CancellationToken {
        let mut in_flight = self.in_flight.lock();
        if let Some(previous) = in_flight.remove(session_id) {
            previous.cancel();
        }
        let token = CancellationToken::new();
        in_flight.insert(session_id.clone(), token.clone());
        token
    }

    async fn build_system_prompt(&self, conversation_id: Option<&str>) -> String {
        let mut prompt = String::from("You are a helpful assistant.");
        if let Some(id) = conversation_id {
            match self.segmentation.build_chain_context(&id.to_string()).await {
                Ok(context) if !context.is_empty() => {
                    prompt.push_str("\n\n");
                    prompt.push_str(&context);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to build chain context"),
            }
        }
        prompt
    }

    /// Conversation history for the model, oldest first, ending with
    /// the just-persisted user message. Without a conversation the turn
    /// runs on the inbound message alone.
    async fn build_history(
        &self,
        conversation_id: Option<&str>,
        inbound_text: &str,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let Some(convo_id) = conversation_id else {
            return Ok(vec![ChatMessage::user(inbound_text)]);
        };
        let messages = self
            .store
            .recent_messages(&convo_id.to_string(), HISTORY_WINDOW)
            .await?;
        Ok(messages
            .into_iter()
            .filter(|m| m.role != Role::System)
            .map(|m| match m.role {
                Role::Assistant => ChatMessage::assistant(m.content),
                _ => ChatMessage::user(m.content),
            })
            .collect())
    }
}
