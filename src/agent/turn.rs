//! The tool-calling round loop.
//!
//! One turn is one user message answered. Each round streams a model
//! response; rounds repeat while the model requests tools, up to a hard
//! cap. Cancellation is checked at round boundaries and on every text
//! delta; a cancelled turn persists nothing and emits no completion
//! event. Tool failures feed back to the model as error results and
//! never abort the turn.

use crate::config::AgentConfig;
use crate::error::TurnError;
use crate::model::{
    ConversationId, MessageDraft, MessageId, Role, RunState, SessionId, TokenUsage, ToolCall,
    UsageRecord,
};
use crate::pricing::PricingRegistry;
use crate::providers::{ChatMessage, ChatRequest, ModelProvider, ToolDefinition};
use crate::store::Store;
use crate::tools::{ToolExecutor, TurnContext};
use chrono::Utc;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::TurnSink;
use super::postprocess::postprocess;

/// How long a completed run record lingers before the janitor removes it.
const RUN_LINGER_SECS: u64 = 5;

/// Everything needed to answer one user message. `history` already ends
/// with the new user message; `user_message_id` identifies it for
/// re-homing after a tool-triggered conversation switch.
pub struct TurnRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub context: TurnContext,
    pub conversation_id: Option<ConversationId>,
    pub user_message_id: Option<MessageId>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub text: String,
    /// Final home of the turn; differs from the request's when a tool
    /// switched conversations.
    pub conversation_id: Option<ConversationId>,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub rounds: usize,
    pub tool_calls: usize,
    pub latency_ms: u64,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    provider: Arc<dyn ModelProvider>,
    tools: Arc<dyn ToolExecutor>,
    config: AgentConfig,
    response_prefix: Option<String>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn ModelProvider>,
        tools: Arc<dyn ToolExecutor>,
        config: AgentConfig,
        response_prefix: Option<String>,
    ) -> Self {
        Self {
            store,
            provider,
            tools,
            config,
            response_prefix,
        }
    }

    /// Run one turn to completion. On success the final assistant
    /// message is persisted and usage recorded; on [`TurnError::Cancelled`]
    /// nothing is persisted.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
        sink: &dyn TurnSink,
    ) -> Result<TurnOutcome, TurnError> {
        let started = Instant::now();
        let session_id: SessionId = request.context.session_id.clone();

        // Run records are observability only; their writes never fail a turn.
        let run_id = match self.store.create_run(&session_id).await {
            Ok(run) => Some(run.id),
            Err(e) => {
                warn!(error = %e, "failed to create run record");
                None
            }
        };

        sink.on_typing().await;

        let tool_defs = self.tools.definitions();
        let mut messages = request.history.clone();
        let mut conversation_id = request.conversation_id.clone();
        let mut switched = false;
        let mut usage = TokenUsage::default();
        let mut final_text = String::new();
        let mut rounds = 0;
        let mut tool_calls_total = 0;

        for round in 0..self.config.max_rounds {
            if cancel.is_cancelled() {
                self.discard_run(&run_id).await;
                return Err(TurnError::Cancelled);
            }

            let round_outcome = match self
                .stream_round(&request, &messages, &tool_defs, cancel, sink, &run_id, round)
                .await
            {
                Ok(outcome) => outcome,
                Err(TurnError::Cancelled) => return Err(TurnError::Cancelled),
                Err(e) => {
                    self.fail_run(&run_id, sink, &e).await;
                    return Err(e);
                }
            };
            rounds += 1;
            usage.add(round_outcome.usage);
            final_text = round_outcome.text;
            messages.push(round_outcome.message);

            if round_outcome.tool_calls.is_empty() {
                break;
            }
            // Results from a final-round batch could never reach the
            // model, so the cap stops before executing them.
            if round + 1 == self.config.max_rounds {
                debug!(rounds, "round cap reached with pending tool calls");
                break;
            }

            tool_calls_total += round_outcome.tool_calls.len();
            let results = self
                .run_tool_batch(
                    &round_outcome.tool_calls,
                    &request,
                    &mut conversation_id,
                    &mut switched,
                    sink,
                )
                .await;
            messages.push(ChatMessage::tool_results(&results));
        }

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let text = postprocess(&final_text, self.response_prefix.as_deref());
        let cost_usd = PricingRegistry::global().cost_for(&request.model, usage);

        // Persisting the reply is the one critical store write.
        if let Err(e) = self
            .store
            .create_message(MessageDraft {
                session_id: session_id.clone(),
                conversation_id: conversation_id.clone(),
                role: Role::Assistant,
                content: text.clone(),
                tokens: Some(usage),
                cost: Some(cost_usd),
                model: Some(request.model.clone()),
                latency_ms: Some(latency_ms),
                metadata: None,
            })
            .await
        {
            let e = TurnError::Store(e);
            self.fail_run(&run_id, sink, &e).await;
            return Err(e);
        }

        if let Some(convo_id) = &conversation_id {
            if let Err(e) = self.store.bump_conversation(convo_id, Utc::now()).await {
                warn!(error = %e, conversation_id = %convo_id, "bump after reply failed");
            }
        }

        if let Err(e) = self
            .store
            .record_usage(UsageRecord {
                session_id,
                conversation_id: conversation_id.clone(),
                model: request.model.clone(),
                tokens: usage,
                cost_usd,
                latency_ms,
                recorded_at: Utc::now(),
            })
            .await
        {
            warn!(error = %e, "failed to record usage");
        }

        self.mark_run(&run_id, RunState::Complete).await;
        self.spawn_run_janitor(&run_id);

        info!(rounds, tool_calls = tool_calls_total, cost_usd, latency_ms, "turn complete");
        sink.on_done(&text).await;

        Ok(TurnOutcome {
            text,
            conversation_id,
            usage,
            cost_usd,
            rounds,
            tool_calls: tool_calls_total,
            latency_ms,
        })
    }

    /// Stream one model round, surfacing deltas and collecting tool calls.
    #[allow(clippy::too_many_arguments)]
    async fn stream_round(
        &self,
        request: &TurnRequest,
        messages: &[ChatMessage],
        tool_defs: &[ToolDefinition],
        cancel: &CancellationToken,
        sink: &dyn TurnSink,
        run_id: &Option<String>,
        round: usize,
    ) -> Result<RoundOutcome, TurnError> {
        debug!(round, model = %request.model, "starting model round");
        let mut stream = match self
            .provider
            .stream_chat(ChatRequest {
                system_prompt: &request.system_prompt,
                messages,
                tools: tool_defs,
                model: &request.model,
                temperature: request.temperature,
                max_tokens: self.config.max_tokens,
            })
            .await
        {
            Ok(s) => s,
            Err(e) => return Err(TurnError::Provider(e)),
        };

        let mut buffer = String::new();
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut streaming = false;
        let mut done: Option<(ChatMessage, TokenUsage)> = None;

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(ev) => ev,
                Err(e) => return Err(TurnError::Provider(e)),
            };
            match event {
                crate::providers::StreamEvent::TextDelta(delta) => {
                    if cancel.is_cancelled() {
                        drop(stream);
                        self.discard_run(run_id).await;
                        return Err(TurnError::Cancelled);
                    }
                    if !streaming {
                        streaming = true;
                        self.mark_run(run_id, RunState::Streaming).await;
                    }
                    buffer.push_str(&delta);
                    sink.on_token(&delta, &buffer).await;
                }
                crate::providers::StreamEvent::ToolCallEnd(call) => {
                    sink.on_tool_use(&call.id, &call.name, &call.arguments).await;
                    pending.push(call);
                }
                crate::providers::StreamEvent::Done { message, usage } => {
                    sink.on_token_count(usage).await;
                    done = Some((message, usage));
                }
            }
        }

        let (message, round_usage) = done.ok_or_else(|| {
            TurnError::Provider(anyhow::anyhow!("stream ended without a terminal event"))
        })?;
        // Non-streaming providers emit text only in the terminal message.
        let text = if buffer.is_empty() {
            message.text()
        } else {
            buffer
        };

        Ok(RoundOutcome {
            message,
            text,
            usage: round_usage,
            tool_calls: pending,
        })
    }

    /// Execute a batch of tool calls with worker bookkeeping, applying
    /// at most one conversation switch per turn.
    async fn run_tool_batch(
        &self,
        calls: &[ToolCall],
        request: &TurnRequest,
        conversation_id: &mut Option<ConversationId>,
        switched: &mut bool,
        sink: &dyn TurnSink,
    ) -> Vec<crate::model::ToolResult> {
        let session_id = &request.context.session_id;
        let mut worker_ids: Vec<Option<String>> = Vec::with_capacity(calls.len());
        for call in calls {
            sink.on_tool_start(&call.id, &call.name).await;
            let worker_id = match self
                .store
                .create_worker(session_id, &call.id, &call.name)
                .await
            {
                Ok(id) => {
                    sink.on_agent_start(&id, &call.name).await;
                    Some(id)
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "failed to create worker record");
                    None
                }
            };
            worker_ids.push(worker_id);
        }

        let outcome = self.tools.execute_tools(calls, &request.context).await;

        if let Some(new_id) = &outcome.conversation_switch {
            if *switched {
                warn!(requested = %new_id, "ignoring second conversation switch this turn");
            } else {
                info!(from = ?conversation_id, to = %new_id, "tool switched conversation");
                if let Some(message_id) = &request.user_message_id {
                    if let Err(e) = self
                        .store
                        .update_message_conversation(message_id, new_id)
                        .await
                    {
                        warn!(error = %e, "failed to re-home user message");
                    }
                }
                *conversation_id = Some(new_id.clone());
                *switched = true;
            }
        }

        for (result, worker_id) in outcome.results.iter().zip(worker_ids) {
            if let Some(id) = worker_id {
                if let Err(e) = self.store.complete_worker(&id, !result.is_error).await {
                    warn!(worker_id = %id, error = %e, "failed to complete worker record");
                }
                sink.on_agent_complete(&id, !result.is_error).await;
            }
        }

        outcome.results
    }

    /// Terminal failure: mark the run errored, schedule its sweep, and
    /// close the sink lifecycle with an error event.
    async fn fail_run(&self, run_id: &Option<String>, sink: &dyn TurnSink, error: &TurnError) {
        self.mark_run(run_id, RunState::Error).await;
        self.spawn_run_janitor(run_id);
        sink.on_error(&error.to_string()).await;
    }

    async fn mark_run(&self, run_id: &Option<String>, state: RunState) {
        if let Some(id) = run_id {
            if let Err(e) = self.store.set_run_state(id, state).await {
                warn!(run_id = %id, error = %e, "failed to update run state");
            }
        }
    }

    async fn discard_run(&self, run_id: &Option<String>) {
        if let Some(id) = run_id {
            if let Err(e) = self.store.delete_run(id).await {
                warn!(run_id = %id, error = %e, "failed to delete run record");
            }
        }
    }

    /// Run records in a terminal state (complete or error) linger
    /// briefly so late pollers see it, then get swept.
    fn spawn_run_janitor(&self, run_id: &Option<String>) {
        let Some(id) = run_id.clone() else { return };
        let store = self.store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(RUN_LINGER_SECS)).await;
            if let Err(e) = store.delete_run(&id).await {
                warn!(run_id = %id, error = %e, "run janitor sweep failed");
            }
        });
    }
}

struct RoundOutcome {
    message: ChatMessage,
    text: String,
    usage: TokenUsage,
    tool_calls: Vec<ToolCall>,
}
