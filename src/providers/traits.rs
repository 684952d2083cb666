//! Model provider seam.
//!
//! Providers are external collaborators: the core hands them a chat
//! request and consumes a stream of events. Message content follows the
//! block convention (text, tool_use, tool_result) so multi-tool rounds
//! serialize cleanly.

use crate::model::{TokenUsage, ToolCall, ToolResult};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// Message content: plain text for simple turns, blocks once tools are
/// involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: ChatContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: ChatContent::Text(text.into()),
        }
    }

    /// User-role message carrying one tool_result block per executed
    /// call, in call order.
    pub fn tool_results(results: &[ToolResult]) -> Self {
        let blocks = results
            .iter()
            .map(|r| ContentBlock::ToolResult {
                tool_use_id: r.tool_call_id.clone(),
                content: r.content.clone(),
                is_error: r.is_error,
            })
            .collect();
        Self {
            role: "user".to_string(),
            content: ChatContent::Blocks(blocks),
        }
    }

    /// Concatenated text content, skipping tool blocks.
    pub fn text(&self) -> String {
        match &self.content {
            ChatContent::Text(t) => t.clone(),
            ChatContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Tool surface advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Events yielded while a model response streams in.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text.
    TextDelta(String),
    /// A tool call finished parsing.
    ToolCallEnd(ToolCall),
    /// Terminal event: the complete assistant message plus usage for
    /// this round. The stream ends after this.
    Done {
        message: ChatMessage,
        usage: TokenUsage,
    },
}

pub type ModelStream = BoxStream<'static, anyhow::Result<StreamEvent>>;

#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system_prompt: &'a str,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolDefinition],
    pub model: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Open a streaming chat completion. Transport and protocol errors
    /// surface either here or as `Err` items on the stream.
    async fn stream_chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ModelStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_preserve_call_order_and_errors() {
        let results = vec![
            ToolResult {
                tool_call_id: "t1".into(),
                tool_name: "weather".into(),
                content: "sunny".into(),
                is_error: false,
            },
            ToolResult {
                tool_call_id: "t2".into(),
                tool_name: "search".into(),
                content: "timeout".into(),
                is_error: true,
            },
        ];
        let message = ChatMessage::tool_results(&results);
        assert_eq!(message.role, "user");
        let ChatContent::Blocks(blocks) = &message.content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 2);
        match &blocks[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "t1");
                assert!(!is_error);
            }
            other => panic!("unexpected block: {other:?}"),
        }
        match &blocks[1] {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "t2");
                assert!(is_error);
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn text_skips_tool_blocks() {
        let message = ChatMessage {
            role: "assistant".into(),
            content: ChatContent::Blocks(vec![
                ContentBlock::Text {
                    text: "checking ".into(),
                },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "weather".into(),
                    input: serde_json::json!({"city": "Oslo"}),
                },
                ContentBlock::Text {
                    text: "the weather".into(),
                },
            ]),
        };
        assert_eq!(message.text(), "checking the weather");
    }

    #[test]
    fn content_block_serde_tags_snake_case() {
        let block = ContentBlock::ToolUse {
            id: "t1".into(),
            name: "weather".into(),
            input: serde_json::json!({}),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_use");
    }
}
