//! Abstraction over the upstream text-generation service.
//!
//! The pipeline depends on nothing beyond this shape: one opaque, possibly
//! slow, possibly failing call that turns messages into text plus token
//! counts. Errors propagate unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Author of one chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation sent upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who authored the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A user-authored message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant-authored message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request for one upstream generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamRequest {
    /// Model identifier.
    pub model: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Output token ceiling.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Response from one upstream generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamResponse {
    /// Generated text.
    pub text: String,
    /// Input tokens billed.
    pub input_tokens: u64,
    /// Output tokens billed.
    pub output_tokens: u64,
}

/// The single point of contact with the text-generation service.
///
/// Implementations wrap a real provider SDK in production and a scripted
/// stub in tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Perform one generation call.
    async fn invoke(&self, request: UpstreamRequest) -> Result<UpstreamResponse, GenerationError>;
}
