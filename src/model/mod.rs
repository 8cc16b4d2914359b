//! Model inference capability
//!
//! The agent loop only needs "ordered messages + declared tools in, text +
//! tool calls out". [`ModelClient`] captures exactly that; the loop, not the
//! model capability, executes the tool calls.
//!
//! [`ChatClient`] implements it against Ollama's `/api/chat` endpoint.

pub mod chat;

use async_trait::async_trait;

pub use chat::{
    parse_tool_calls_from_text, ChatClient, ChatMessage, ChatRole, FunctionCall, Tool, ToolCall,
    ToolFunction,
};

/// Error type for model calls
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("empty response from model")]
    EmptyResponse,
}

/// One model turn: free text plus the tool calls it requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Pluggable model inference
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the full history plus tool contracts, returning one reply
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<ModelReply, ModelError>;

    /// Single-shot generation without tools
    async fn complete(
        &self,
        model: &str,
        instruction: &str,
        input: &str,
    ) -> Result<String, ModelError> {
        let messages = [ChatMessage::system(instruction), ChatMessage::user(input)];
        Ok(self.chat(model, &messages, &[]).await?.text)
    }
}
