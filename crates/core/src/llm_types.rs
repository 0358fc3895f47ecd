//! LLM request/response types
//!
//! Common types for interacting with completion providers (Ollama,
//! OpenAI-compatible APIs, llama.cpp).

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationTurn, TurnRole};

/// Sampling options for one completion call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 150,
            stream: false,
        }
    }
}

/// Provider-neutral completion request
///
/// Unset sampling fields fall back to the backend's configured values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Clamped to 0.0..=2.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Extra stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Ask the backend for incremental deltas
    #[serde(default)]
    pub stream: bool,
}

impl Default for GenerateRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            max_tokens: None,
            temperature: Some(0.7),
            top_p: None,
            stop: None,
            stream: false,
        }
    }
}

impl GenerateRequest {
    /// Create a new request with a system message
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            ..Default::default()
        }
    }

    /// Build a request from prepared messages and sampling options
    pub fn from_messages(messages: Vec<Message>, options: CompletionOptions) -> Self {
        Self {
            messages,
            ..Default::default()
        }
        .with_options(options)
    }

    /// Add a user message
    pub fn with_user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_options(self, options: CompletionOptions) -> Self {
        self.with_temperature(options.temperature)
            .with_max_tokens(options.max_tokens)
            .with_streaming(options.stream)
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for Message {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
            TurnRole::System => Role::System,
        };
        Self {
            role,
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A drained completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    pub finish_reason: FinishReason,
}

/// Why a completion ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    /// Hit `max_tokens`
    Length,
    /// Consumer went away before the backend finished
    Cancelled,
    Error,
}

/// One increment of a streamed completion
///
/// A stream ends with exactly one chunk where `is_final` is set; its
/// `delta` is empty and `finish_reason` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            is_final: false,
            finish_reason: None,
        }
    }

    pub fn final_chunk(finish_reason: FinishReason) -> Self {
        Self {
            delta: String::new(),
            is_final: true,
            finish_reason: Some(finish_reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_builder() {
        let req = GenerateRequest::new("You are a helpful assistant")
            .with_user_message("Hello")
            .with_max_tokens(100)
            .with_temperature(0.5)
            .with_streaming(true);

        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.max_tokens, Some(100));
        assert_eq!(req.temperature, Some(0.5));
        assert!(req.stream);
    }

    #[test]
    fn test_temperature_clamped() {
        let req = GenerateRequest::new("s").with_temperature(5.0);
        assert_eq!(req.temperature, Some(2.0));
    }

    #[test]
    fn test_from_messages_applies_options() {
        let req = GenerateRequest::from_messages(
            vec![Message::user("hi")],
            CompletionOptions {
                temperature: 0.3,
                max_tokens: 300,
                stream: false,
            },
        );
        assert_eq!(req.max_tokens, Some(300));
        assert_eq!(req.temperature, Some(0.3));
        assert!(!req.stream);
    }

    #[test]
    fn test_message_from_turn() {
        let turn = ConversationTurn::assistant("Sure");
        let msg = Message::from(&turn);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Sure");
        assert_eq!(Role::System.as_str(), "system");
    }

    #[test]
    fn test_stream_chunk() {
        let chunk = StreamChunk::text("Hello");
        assert!(!chunk.is_final);
        assert_eq!(chunk.delta, "Hello");

        let final_chunk = StreamChunk::final_chunk(FinishReason::Stop);
        assert!(final_chunk.is_final);
    }
}
