//! Shared stubs for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sandforge::events::{DispatchError, EventDispatcher, JobEvent};
use sandforge::model::{ChatMessage, ModelClient, ModelError, ModelReply, Tool, ToolCall};
use sandforge::sandbox::HealthProbe;

/// Model stub replaying a script for tool-enabled calls.
///
/// Single-shot calls (no tools) answer with `aux_reply`, or fail when it is
/// `None`. Once the script runs dry every call returns empty text.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
    aux_reply: Option<String>,
    aux_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelReply, ModelError>>) -> Arc<Self> {
        Self::with_aux(replies, Some("Todo App"))
    }

    pub fn with_aux(replies: Vec<Result<ModelReply, ModelError>>, aux: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            histories: Mutex::new(Vec::new()),
            aux_reply: aux.map(str::to_string),
            aux_calls: AtomicUsize::new(0),
        })
    }

    /// Histories sent with each tool-enabled call
    pub fn histories(&self) -> Vec<Vec<ChatMessage>> {
        self.histories.lock().unwrap().clone()
    }

    pub fn agent_calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    pub fn aux_calls(&self) -> usize {
        self.aux_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn chat(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<ModelReply, ModelError> {
        if tools.is_empty() {
            self.aux_calls.fetch_add(1, Ordering::SeqCst);
            return match &self.aux_reply {
                Some(text) => Ok(ModelReply {
                    text: text.clone(),
                    tool_calls: vec![],
                }),
                None => Err(ModelError::EmptyResponse),
            };
        }
        self.histories.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ModelReply::default()))
    }
}

pub fn text(content: &str) -> Result<ModelReply, ModelError> {
    Ok(ModelReply {
        text: content.to_string(),
        tool_calls: vec![],
    })
}

pub fn calls(tool_calls: Vec<ToolCall>) -> Result<ModelReply, ModelError> {
    Ok(ModelReply {
        text: String::new(),
        tool_calls,
    })
}

pub fn write_call(files: &[(&str, &str)]) -> ToolCall {
    let files: Vec<serde_json::Value> = files
        .iter()
        .map(|(path, content)| serde_json::json!({"path": path, "content": content}))
        .collect();
    ToolCall::new("createOrUpdateFiles", serde_json::json!({ "files": files }))
}

/// Probe with a switchable answer
pub struct SwitchProbe {
    alive: AtomicBool,
    pub probes: AtomicUsize,
}

impl SwitchProbe {
    pub fn new(alive: bool) -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(alive),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthProbe for SwitchProbe {
    async fn is_alive(&self, _url: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.alive.load(Ordering::SeqCst)
    }
}

/// Dispatcher that records events, optionally rejecting them
#[derive(Default)]
pub struct RecordingDispatcher {
    pub events: Mutex<Vec<JobEvent>>,
    reject: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn send(&self, event: JobEvent) -> Result<(), DispatchError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
