//! Minimal provider-agnostic contract for streaming one chat completion.
//!
//! This crate intentionally defines only the shared request/event lifecycle
//! and the error taxonomy a host needs to classify failures. It excludes
//! provider transport details, wire payloads, and multi-request
//! orchestration concerns.

use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier for one streaming generation request.
pub type RequestId = u64;

/// Shared cancellation flag for a request.
pub type CancelSignal = Arc<AtomicBool>;

/// Role of a provider-facing chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// Provider-neutral chat history item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2048
}

/// Sampling settings captured per conversation and sent with every request.
///
/// Fields absent from stored data deserialize to the compiled-in defaults so
/// older snapshots keep loading as the schema grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default)]
    pub presence_penalty: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            system_prompt: None,
            top_p: None,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Input required to start one streaming request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub request_id: RequestId,
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    pub settings: GenerationSettings,
}

/// Token accounting reported by the terminal completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    #[must_use]
    pub fn totalled(total_tokens: u32) -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens,
        }
    }
}

/// Classified transport failure.
///
/// Transports map wire-level failures into this taxonomy; hosts surface one
/// human-readable message per terminal error via [`TransportError::user_message`].
/// Malformed individual stream frames are expected to be logged and skipped
/// by the transport itself; `MalformedFrame` only terminates a request when a
/// transport cannot continue at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("quota exhausted: {0}")]
    Quota(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("service unavailable: {0}")]
    Network(String),
    #[error("malformed stream frame: {0}")]
    MalformedFrame(String),
    #[error("request was cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns true when this error represents cooperative cancellation,
    /// which is never user-visible as an error.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Human-readable classified message for the store's error banner.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(_) => {
                "API key is missing or invalid. Check your provider credentials.".to_string()
            }
            Self::Quota(_) => {
                "Your account balance is insufficient for this request.".to_string()
            }
            Self::RateLimit(_) => "Rate limit reached. Wait a moment and try again.".to_string(),
            Self::Network(_) => {
                "The completion service is unreachable. Check your connection.".to_string()
            }
            Self::Cancelled => "Generation was stopped.".to_string(),
            Self::MalformedFrame(message) | Self::Other(message) => {
                format!("Generation failed: {message}")
            }
        }
    }
}

/// Transport-emitted lifecycle event for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk {
        request_id: RequestId,
        text: String,
    },
    Done {
        request_id: RequestId,
        usage: Option<Usage>,
    },
    Error {
        request_id: RequestId,
        error: TransportError,
    },
    Cancelled {
        request_id: RequestId,
    },
}

impl StreamEvent {
    /// Returns the request identifier associated with this event.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Chunk { request_id, .. }
            | Self::Done { request_id, .. }
            | Self::Error { request_id, .. }
            | Self::Cancelled { request_id } => *request_id,
        }
    }

    /// Returns true when this event terminates the request lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Error { .. } | Self::Cancelled { .. }
        )
    }
}

/// Per-million-token pricing in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt: f64,
    pub completion: f64,
}

/// One selectable completion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub context_length: u32,
    pub pricing: ModelPricing,
}

impl ModelInfo {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        context_length: u32,
        pricing: ModelPricing,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            context_length,
            pricing,
        }
    }
}

/// Compiled-in model list used when neither a cached list nor a live
/// transport response is available.
#[must_use]
pub fn fallback_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new(
            "gpt-4o-mini",
            "GPT-4o Mini",
            128_000,
            ModelPricing {
                prompt: 0.15,
                completion: 0.60,
            },
        ),
        ModelInfo::new(
            "gpt-4o",
            "GPT-4o",
            128_000,
            ModelPricing {
                prompt: 2.50,
                completion: 10.00,
            },
        ),
        ModelInfo::new(
            "o3-mini",
            "o3 Mini",
            200_000,
            ModelPricing {
                prompt: 1.10,
                completion: 4.40,
            },
        ),
    ]
}

/// Transport interface for executing one streaming request.
pub trait ChatTransport: Send + Sync + 'static {
    /// Executes a request and emits lifecycle events in provider order:
    /// zero or more `Chunk` events followed by exactly one terminal event.
    ///
    /// Transports must honor `cancel` cooperatively and stop emitting once
    /// they observe it. Returning `Err` is equivalent to emitting a terminal
    /// `Error` event; hosts handle either form.
    fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamEvent),
    ) -> Result<(), TransportError>;

    /// Lists selectable models.
    ///
    /// Transports without a live model endpoint fall back to the
    /// compiled-in list.
    fn list_models(&self) -> Result<Vec<ModelInfo>, TransportError> {
        Ok(fallback_models())
    }
}
