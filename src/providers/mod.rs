pub mod traits;

pub use traits::{
    ChatContent, ChatMessage, ChatRequest, ContentBlock, ModelProvider, ModelStream, StreamEvent,
    ToolDefinition,
};
