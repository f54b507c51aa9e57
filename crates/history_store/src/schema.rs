use chat_provider::GenerationSettings;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::epoch_ms;

/// Title assigned to a conversation until the first user message derives one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Version string stamped into exported snapshots.
pub const EXPORT_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub token_count: Option<u32>,
    #[serde(default)]
    pub error: bool,
}

impl Message {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp_ms: epoch_ms(),
            model: None,
            token_count: None,
            error: false,
        }
    }

    /// Empty assistant message created before streaming begins and filled
    /// incrementally by chunk events.
    #[must_use]
    pub fn placeholder(model_id: impl Into<String>) -> Self {
        let mut message = Self::new(MessageRole::Assistant, String::new());
        message.model = Some(model_id.into());
        message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversationMetadata {
    #[serde(default)]
    pub message_count: u32,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub model_id: String,
    #[serde(default)]
    pub settings: GenerationSettings,
    #[serde(default)]
    pub metadata: ConversationMetadata,
}

impl Conversation {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        model_id: impl Into<String>,
        settings: GenerationSettings,
    ) -> Self {
        let now = epoch_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            messages: Vec::new(),
            created_at_ms: now,
            updated_at_ms: now,
            model_id: model_id.into(),
            settings,
            metadata: ConversationMetadata::default(),
        }
    }

    /// Bumps `updated_at_ms` without ever moving it backwards.
    pub fn touch(&mut self) {
        self.updated_at_ms = self.updated_at_ms.max(epoch_ms());
    }

    /// Locates a message by stable id. Positions can shift under concurrent
    /// mutation, so id-addressed lookup is the only supported form.
    #[must_use]
    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|message| message.id == message_id)
    }

    #[must_use]
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == message_id)
    }
}

fn default_theme() -> String {
    "system".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Global defaults applied to new conversations.
///
/// Stored fields merge over the compiled-in defaults during deserialization,
/// so snapshots written before a field existed keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(flatten)]
    pub generation: GenerationSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            default_model: default_model(),
            generation: GenerationSettings::default(),
        }
    }
}

/// Versioned snapshot produced by export and consumed by import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub version: String,
    pub exported_at: u64,
    pub conversations: Vec<Conversation>,
    pub settings: AppSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_message_starts_empty_with_model_label() {
        let message = Message::placeholder("gpt-4o");

        assert_eq!(message.role, MessageRole::Assistant);
        assert!(message.content.is_empty());
        assert_eq!(message.model.as_deref(), Some("gpt-4o"));
        assert!(message.token_count.is_none());
        assert!(!message.error);
    }

    #[test]
    fn touch_never_moves_updated_at_backwards() {
        let mut conversation =
            Conversation::new("t", "gpt-4o-mini", GenerationSettings::default());
        conversation.updated_at_ms = u64::MAX;

        conversation.touch();

        assert_eq!(conversation.updated_at_ms, u64::MAX);
    }

    #[test]
    fn message_lookup_is_id_addressed() {
        let mut conversation =
            Conversation::new("t", "gpt-4o-mini", GenerationSettings::default());
        let first = Message::new(MessageRole::User, "one");
        let second = Message::new(MessageRole::User, "two");
        let second_id = second.id.clone();
        conversation.messages.push(first);
        conversation.messages.push(second);

        conversation.messages.swap(0, 1);

        assert_eq!(
            conversation.message(&second_id).map(|m| m.content.as_str()),
            Some("two")
        );
    }

    #[test]
    fn app_settings_fill_missing_fields_with_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"theme":"dark"}"#).expect("partial settings");

        assert_eq!(settings.theme, "dark");
        assert_eq!(settings.default_model, "gpt-4o-mini");
        assert_eq!(settings.generation, GenerationSettings::default());
    }

    #[test]
    fn app_settings_round_trip_flattens_generation_fields() {
        let settings = AppSettings::default();
        let raw = serde_json::to_string(&settings).expect("serialize settings");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");

        assert!(value.get("temperature").is_some());
        assert!(value.get("generation").is_none());
    }

    #[test]
    fn message_round_trip_preserves_optional_fields() {
        let mut message = Message::new(MessageRole::Assistant, "partial");
        message.token_count = Some(5);
        message.error = true;

        let raw = serde_json::to_string(&message).expect("serialize message");
        let restored: Message = serde_json::from_str(&raw).expect("deserialize message");

        assert_eq!(restored, message);
    }
}
