//! Provider contract re-exports used by `chat_client`.

pub use chat_provider::{
    fallback_models, CancelSignal, ChatMessage, ChatRequest, ChatRole, ChatTransport,
    GenerationSettings, ModelInfo, ModelPricing, RequestId, StreamEvent, TransportError, Usage,
};
