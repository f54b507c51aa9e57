mod backend;
mod clock;
mod error;
mod paths;
mod schema;
mod store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use clock::epoch_ms;
pub use error::{HistoryStoreError, ImportError};
pub use paths::{storage_file_name, storage_root};
pub use schema::{
    AppSettings, Conversation, ConversationMetadata, ExportPayload, Message, MessageRole,
    DEFAULT_CONVERSATION_TITLE, EXPORT_VERSION,
};
pub use store::{
    HistoryStore, ImportMode, ImportSummary, CONVERSATIONS_KEY, MODELS_KEY, SETTINGS_KEY,
};
