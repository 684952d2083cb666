//! Channel seam.
//!
//! A channel is one messaging surface (Telegram, Slack, a CLI). Inbound
//! messages arrive as [`InboundMessage`]; outbound delivery goes through
//! the [`Channel`] trait. Typing indicators default to no-ops since most
//! surfaces lack them.

use async_trait::async_trait;

/// A user message as delivered by a channel adapter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Channel name, e.g. "telegram".
    pub channel: String,
    /// Platform-native user id, stable per user per channel.
    pub external_user_id: String,
    pub text: String,
    pub user_display_name: Option<String>,
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one outbound message. Callers chunk long text first.
    async fn send(&self, external_user_id: &str, text: &str) -> anyhow::Result<()>;

    /// Largest message the platform accepts, in bytes. Used for chunking.
    fn max_message_len(&self) -> usize {
        4096
    }

    async fn start_typing(&self, _external_user_id: &str) {}

    async fn stop_typing(&self, _external_user_id: &str) {}
}
