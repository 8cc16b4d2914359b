//! Ollama Chat API with tool calling support
//!
//! This module provides a client for Ollama's `/api/chat` endpoint,
//! which supports tool/function calling for agentic workflows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ModelClient, ModelError, ModelReply};

/// Role of a chat message on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    fn with_role(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Tool, content)
    }

    /// Attach the tool calls the assistant requested in this turn
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        if !tool_calls.is_empty() {
            self.tool_calls = Some(tool_calls);
        }
        self
    }
}

/// A tool call from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// Function call details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition for the model
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String, // Always "function"
    pub function: ToolFunction,
}

impl Tool {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: ToolFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Function specification for a tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value, // JSON Schema
}

/// Response from /api/chat
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: u32,
}

/// Client for Ollama's /api/chat endpoint with tool support
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    /// Sampling temperature sent with every request
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build the request body for `/api/chat`
    fn request_body(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<serde_json::Value, ModelError> {
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.temperature
            }
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
        }
        Ok(body)
    }
}

#[async_trait]
impl ModelClient for ChatClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<ModelReply, ModelError> {
        let endpoint = format!("{}/api/chat", self.base_url);
        let body = self.request_body(model, messages, tools)?;

        let response = self.client.post(&endpoint).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ModelError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;
        let message = chat_response.message;

        // Native tool calls first, then calls embedded in the text body
        let tool_calls = message
            .tool_calls
            .filter(|tc| !tc.is_empty())
            .unwrap_or_else(|| parse_tool_calls_from_text(&message.content));

        Ok(ModelReply {
            text: message.content,
            tool_calls,
        })
    }
}

/// Try to parse tool calls from the response content text
///
/// This handles models that output tool calls as JSON in the text
/// instead of using the native tool_calls field. Only top-level objects of
/// the form `{"name": ..., "arguments": {...}}` are recognised.
pub fn parse_tool_calls_from_text(content: &str) -> Vec<ToolCall> {
    let content = content.trim();

    if let Some(tool_call) = try_parse_tool_call(content) {
        return vec![tool_call];
    }

    let mut tool_calls = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(tool_call) = start.and_then(|s| try_parse_tool_call(&content[s..=i])) {
                        tool_calls.push(tool_call);
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }

    tool_calls
}

/// Try to parse a single tool call from a JSON string
fn try_parse_tool_call(json_str: &str) -> Option<ToolCall> {
    let value: serde_json::Value = serde_json::from_str(json_str).ok()?;
    let name = value.get("name").and_then(|n| n.as_str())?;
    // Some models use "parameters" instead of "arguments"
    let arguments = value
        .get("arguments")
        .or_else(|| value.get("parameters"))
        .filter(|args| args.is_object())?;
    Some(ToolCall::new(name, arguments.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_skips_empty_tool_calls() {
        let msg = ChatMessage::assistant("hi").with_tool_calls(vec![]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(json.contains("\"role\":\"assistant\""));
    }

    #[test]
    fn test_request_body_includes_tools_only_when_present() {
        let client = ChatClient::new("http://localhost:11434/");
        let messages = vec![ChatMessage::user("hello")];

        let body = client.request_body("qwen3", &messages, &[]).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], false);

        let tool = Tool::function("terminal", "Run a command", serde_json::json!({"type": "object"}));
        let body = client.request_body("qwen3", &messages, &[tool]).unwrap();
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "terminal");
    }

    #[test]
    fn test_parse_whole_content_tool_call() {
        let calls = parse_tool_calls_from_text(
            r#"{"name": "terminal", "arguments": {"command": "ls"}}"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "terminal");
        assert_eq!(calls[0].function.arguments["command"], "ls");
    }

    #[test]
    fn test_parse_embedded_tool_calls_with_braces_in_strings() {
        let text = r#"I'll write the file now.
{"name": "createOrUpdateFiles", "parameters": {"files": [{"path": "a.js", "content": "function f() { return '}'; }"}]}}
Then list it: {"name": "listFiles", "arguments": {"path": "."}}"#;
        let calls = parse_tool_calls_from_text(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.name, "createOrUpdateFiles");
        assert_eq!(calls[1].function.name, "listFiles");
    }

    #[test]
    fn test_plain_text_has_no_tool_calls() {
        assert!(parse_tool_calls_from_text("All done. {not json}").is_empty());
    }

    #[test]
    fn test_chat_response_without_content_parses() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"message":{"role":"assistant","tool_calls":[{"function":{"name":"terminal","arguments":{"command":"ls"}}}]},"done":true}"#,
        )
        .unwrap();
        assert!(resp.message.content.is_empty());
        assert_eq!(resp.message.tool_calls.unwrap().len(), 1);
    }
}
