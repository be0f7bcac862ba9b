//! Conversation history sent to the inference engine.

use serde::{Deserialize, Serialize};

/// Response text stored when the inference call fails.
///
/// The request is still completed as solved so the user sees the failure
/// instead of waiting on a request that is silently retried.
pub const INFERENCE_FAILURE_SENTINEL: &str = "❌ Error while querying the model.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One earlier solved request of a dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user_text: String,
    pub response: Option<String>,
}

/// Build the ordered message list for one request.
///
/// `prior` must already be in chronological order. Each exchange adds a
/// user turn and, if it has a non-empty response, an assistant turn. The
/// optional system prompt leads, the current request text closes the list.
pub fn build_history(system_prompt: Option<&str>, prior: &[Exchange], current: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(prior.len() * 2 + 2);

    if let Some(system) = system_prompt.map(str::trim).filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::new(ChatRole::System, system));
    }

    for exchange in prior {
        if !exchange.user_text.is_empty() {
            messages.push(ChatMessage::new(ChatRole::User, exchange.user_text.as_str()));
        }
        if let Some(response) = exchange.response.as_deref().filter(|r| !r.is_empty()) {
            messages.push(ChatMessage::new(ChatRole::Assistant, response));
        }
    }

    messages.push(ChatMessage::new(ChatRole::User, current));
    messages
}
