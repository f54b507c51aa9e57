use std::time::{Duration, Instant};

use chat_provider::{
    ChatMessage, ChatRole, GenerationSettings, ModelInfo, RequestId, TransportError, Usage,
};
use history_store::{
    epoch_ms, AppSettings, Conversation, HistoryStore, HistoryStoreError, ImportError, ImportMode,
    ImportSummary, Message, MessageRole, DEFAULT_CONVERSATION_TITLE,
};

use crate::save::{SaveScheduler, SaveTarget, SaveTargets, DEFAULT_SAVE_DEBOUNCE};
use crate::stream::StreamBuffer;

const TITLE_MAX_CHARS: usize = 50;
const ERROR_NO_ACTIVE_CONVERSATION: &str = "No active conversation to send a message to.";
const ERROR_GENERATION_IN_PROGRESS: &str =
    "A response is already being generated. Stop it before sending another message.";

/// Seam between the store and the session controller.
///
/// The store never talks to a transport directly; it asks its host to start
/// or cancel a generation and receives stream events back through the
/// `on_stream_*` handlers.
pub trait GenerationHost {
    fn start_generation(
        &mut self,
        model_id: String,
        messages: Vec<ChatMessage>,
        settings: GenerationSettings,
    ) -> Result<RequestId, String>;

    fn cancel_generation(&mut self, request_id: RequestId);
}

/// The store-side record of the one active generation: which conversation
/// and which placeholder message the stream writes into. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSession {
    pub request_id: RequestId,
    pub conversation_id: String,
    pub message_id: String,
}

/// Single source of truth for conversations, messages, and settings.
///
/// All mutation is id-addressed; event handlers ignore any request id that
/// no longer matches the current session, which makes trailing
/// post-cancellation events harmless.
pub struct App {
    conversations: Vec<Conversation>,
    active_conversation_id: Option<String>,
    settings: AppSettings,
    models: Vec<ModelInfo>,
    session: Option<GenerationSession>,
    stream: StreamBuffer,
    saver: SaveScheduler,
    history: HistoryStore,
    error: Option<String>,
    last_saved_ms: Option<u64>,
}

impl App {
    #[must_use]
    pub fn new(history: HistoryStore) -> Self {
        Self::with_save_debounce(history, DEFAULT_SAVE_DEBOUNCE)
    }

    #[must_use]
    pub fn with_save_debounce(history: HistoryStore, delay: Duration) -> Self {
        Self {
            conversations: Vec::new(),
            active_conversation_id: None,
            settings: AppSettings::default(),
            models: chat_provider::fallback_models(),
            session: None,
            stream: StreamBuffer::new(),
            saver: SaveScheduler::new(delay),
            history,
            error: None,
            last_saved_ms: None,
        }
    }

    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    #[must_use]
    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == conversation_id)
    }

    #[must_use]
    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    #[must_use]
    pub fn active_conversation(&self) -> Option<&Conversation> {
        let active_id = self.active_conversation_id.as_deref()?;
        self.conversation(active_id)
    }

    #[must_use]
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    #[must_use]
    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn current_session(&self) -> Option<&GenerationSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    #[must_use]
    pub fn last_saved_ms(&self) -> Option<u64> {
        self.last_saved_ms
    }

    /// Render-time view of the in-flight streamed text.
    #[must_use]
    pub fn stream(&self) -> &StreamBuffer {
        &self.stream
    }

    #[must_use]
    pub fn has_pending_save(&self) -> bool {
        self.saver.is_pending()
    }

    /// Creates a conversation at the head of the list and makes it active.
    pub fn create_conversation(&mut self, title: Option<&str>) -> String {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE);
        let conversation = Conversation::new(
            title,
            self.settings.default_model.clone(),
            self.settings.generation.clone(),
        );
        let conversation_id = conversation.id.clone();

        self.conversations.insert(0, conversation);
        self.active_conversation_id = Some(conversation_id.clone());
        self.schedule_save(SaveTarget::Conversations);

        conversation_id
    }

    /// Switches which conversation is displayed. An in-flight session is not
    /// paused or redirected; it keeps writing into its original conversation.
    pub fn set_active_conversation(&mut self, conversation_id: &str) {
        if self.conversation(conversation_id).is_none() {
            log::warn!("cannot activate unknown conversation '{conversation_id}'");
            return;
        }

        self.active_conversation_id = Some(conversation_id.to_string());
    }

    pub fn add_message(&mut self, conversation_id: &str, role: MessageRole, content: &str) {
        if self.push_message(conversation_id, role, content).is_some() {
            self.schedule_save(SaveTarget::Conversations);
        }
    }

    /// Replaces the content of exactly one message, addressed by id.
    ///
    /// While a generation session is active the write is suppressed; the
    /// session's terminal event triggers the persistence pass instead.
    pub fn update_message(&mut self, conversation_id: &str, message_id: &str, content: &str) {
        let generating = self.session.is_some();
        let Some(conversation) = find_conversation_mut(&mut self.conversations, conversation_id)
        else {
            log::warn!("ignoring update for unknown conversation '{conversation_id}'");
            return;
        };
        let Some(message) = conversation.message_mut(message_id) else {
            log::warn!("ignoring update for unknown message '{message_id}'");
            return;
        };

        message.content = content.to_string();
        conversation.touch();

        if !generating {
            self.schedule_save(SaveTarget::Conversations);
        }
    }

    pub fn delete_message(&mut self, conversation_id: &str, message_id: &str) {
        let Some(conversation) = find_conversation_mut(&mut self.conversations, conversation_id)
        else {
            log::warn!("ignoring delete for unknown conversation '{conversation_id}'");
            return;
        };

        let before = conversation.messages.len();
        conversation.messages.retain(|message| message.id != message_id);
        if conversation.messages.len() == before {
            log::warn!("ignoring delete for unknown message '{message_id}'");
            return;
        }

        refresh_metadata(conversation);
        conversation.touch();
        self.schedule_save(SaveTarget::Conversations);
    }

    pub fn delete_conversation(&mut self, conversation_id: &str) {
        let before = self.conversations.len();
        self.conversations
            .retain(|conversation| conversation.id != conversation_id);
        if self.conversations.len() == before {
            log::warn!("ignoring delete for unknown conversation '{conversation_id}'");
            return;
        }

        if self.active_conversation_id.as_deref() == Some(conversation_id) {
            self.active_conversation_id =
                self.conversations.first().map(|conversation| conversation.id.clone());
        }

        self.schedule_save(SaveTarget::Conversations);
    }

    pub fn rename_conversation(&mut self, conversation_id: &str, title: &str) {
        let Some(conversation) = find_conversation_mut(&mut self.conversations, conversation_id)
        else {
            log::warn!("ignoring rename for unknown conversation '{conversation_id}'");
            return;
        };

        conversation.title = title.to_string();
        conversation.touch();
        self.schedule_save(SaveTarget::Conversations);
    }

    pub fn update_conversation_model(&mut self, conversation_id: &str, model_id: &str) {
        let Some(conversation) = find_conversation_mut(&mut self.conversations, conversation_id)
        else {
            log::warn!("ignoring model change for unknown conversation '{conversation_id}'");
            return;
        };

        conversation.model_id = model_id.to_string();
        conversation.touch();
        self.schedule_save(SaveTarget::Conversations);
    }

    pub fn update_conversation_settings(
        &mut self,
        conversation_id: &str,
        settings: GenerationSettings,
    ) {
        let Some(conversation) = find_conversation_mut(&mut self.conversations, conversation_id)
        else {
            log::warn!("ignoring settings change for unknown conversation '{conversation_id}'");
            return;
        };

        conversation.settings = settings;
        conversation.touch();
        self.schedule_save(SaveTarget::Conversations);
    }

    pub fn update_app_settings(&mut self, settings: AppSettings) {
        self.settings = settings;
        self.schedule_save(SaveTarget::Settings);
    }

    /// Installs and persists a model list fetched by the embedder.
    pub fn set_models(&mut self, models: Vec<ModelInfo>) {
        if let Err(error) = self.history.save_models(&models) {
            log::error!("failed to persist model cache: {error}");
        }

        self.models = models;
    }

    /// Appends the user message, creates the assistant placeholder, and asks
    /// the host to start streaming into it.
    ///
    /// Failures are reported through the error field, never by panicking. A
    /// send while a session is active is rejected outright; the session slot
    /// is never silently overwritten.
    pub fn send_message(&mut self, content: &str, host: &mut dyn GenerationHost) {
        let Some(conversation_id) = self.active_conversation_id.clone() else {
            log::warn!("send_message without an active conversation");
            self.error = Some(ERROR_NO_ACTIVE_CONVERSATION.to_string());
            return;
        };

        if self.session.is_some() {
            log::warn!("rejecting send_message while a generation session is active");
            self.error = Some(ERROR_GENERATION_IN_PROGRESS.to_string());
            return;
        }

        self.error = None;

        if self
            .push_message(&conversation_id, MessageRole::User, content)
            .is_none()
        {
            self.error = Some(ERROR_NO_ACTIVE_CONVERSATION.to_string());
            return;
        }

        let Some(conversation) = find_conversation_mut(&mut self.conversations, &conversation_id)
        else {
            return;
        };

        // The request carries every prior message; only the still-empty
        // placeholder stays out of the history.
        let request_history: Vec<ChatMessage> =
            conversation.messages.iter().map(to_chat_message).collect();
        let placeholder = Message::placeholder(conversation.model_id.clone());
        let message_id = placeholder.id.clone();
        conversation.messages.push(placeholder);
        conversation.metadata.message_count += 1;
        conversation.touch();
        let model_id = conversation.model_id.clone();
        let settings = conversation.settings.clone();

        self.schedule_save(SaveTarget::Conversations);

        match host.start_generation(model_id, request_history, settings) {
            Ok(request_id) => {
                self.session = Some(GenerationSession {
                    request_id,
                    conversation_id,
                    message_id: message_id.clone(),
                });
                self.stream.start_stream(message_id);
            }
            Err(error) => {
                log::warn!("failed to start generation: {error}");
                if let Some(conversation) =
                    find_conversation_mut(&mut self.conversations, &conversation_id)
                {
                    conversation.messages.retain(|message| message.id != message_id);
                    refresh_metadata(conversation);
                }
                self.error = Some(format!("Failed to start generation: {error}"));
            }
        }
    }

    /// Cancels the current session, if any. Idempotent.
    ///
    /// The session slot and `is_generating` clear synchronously even though
    /// the transport may take arbitrarily long to actually stop producing
    /// events; anything it still emits is stale and ignored.
    pub fn stop_generation(&mut self, host: &mut dyn GenerationHost) {
        let Some(session) = self.session.take() else {
            return;
        };

        host.cancel_generation(session.request_id);
        self.stream.end_stream();
        self.schedule_save(SaveTarget::Conversations);
    }

    pub fn on_stream_chunk(&mut self, request_id: RequestId, text: &str) {
        let Some((conversation_id, message_id)) = self.session_target(request_id) else {
            return;
        };
        let Some(conversation) = find_conversation_mut(&mut self.conversations, &conversation_id)
        else {
            return;
        };
        let Some(message) = conversation.message_mut(&message_id) else {
            return;
        };

        message.content.push_str(text);
        conversation.touch();
        self.stream.append_token(text);
    }

    pub fn on_stream_done(&mut self, request_id: RequestId, usage: Option<Usage>) {
        let Some((conversation_id, message_id)) = self.session_target(request_id) else {
            return;
        };

        self.session = None;
        if let Some(conversation) =
            find_conversation_mut(&mut self.conversations, &conversation_id)
        {
            if let Some(usage) = usage {
                if let Some(message) = conversation.message_mut(&message_id) {
                    message.token_count = Some(usage.total_tokens);
                }
                conversation.metadata.total_tokens += u64::from(usage.total_tokens);
            }
            conversation.touch();
        }

        self.stream.end_stream();
        self.finalize_session_write();
    }

    pub fn on_stream_error(&mut self, request_id: RequestId, error: &TransportError) {
        let Some((conversation_id, message_id)) = self.session_target(request_id) else {
            return;
        };

        self.session = None;
        self.stream.end_stream();

        if error.is_cancellation() {
            // Cooperative cancellation is not user-visible as an error.
            self.schedule_save(SaveTarget::Conversations);
            return;
        }

        if let Some(conversation) =
            find_conversation_mut(&mut self.conversations, &conversation_id)
        {
            // Partial content already appended stays in place.
            if let Some(message) = conversation.message_mut(&message_id) {
                message.error = true;
            }
            conversation.touch();
        }

        self.error = Some(error.user_message());
        self.finalize_session_write();
    }

    pub fn on_stream_cancelled(&mut self, request_id: RequestId) {
        // Usually stale: stop_generation already cleared the slot. A
        // transport that cancels itself finalizes the same way.
        if self.session_target(request_id).is_none() {
            return;
        }

        self.session = None;
        self.stream.end_stream();
        self.schedule_save(SaveTarget::Conversations);
    }

    /// Loads persisted state, newest conversation first; the head entry
    /// becomes active.
    pub fn load_from_storage(&mut self) {
        let mut conversations = self.history.load_conversations();
        conversations.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        self.conversations = conversations;
        self.settings = self.history.load_settings();

        let models = self.history.load_models();
        self.models = if models.is_empty() {
            chat_provider::fallback_models()
        } else {
            models
        };

        self.active_conversation_id = self
            .conversations
            .first()
            .map(|conversation| conversation.id.clone());
    }

    /// Writes immediately, bypassing the debounce and clearing any pending
    /// timer so debounced and manual writes cannot interleave.
    pub fn save_to_storage(&mut self) {
        let mut targets = self.saver.take_all();
        targets.conversations = true;
        targets.settings = true;
        self.write_now(targets);
    }

    /// Pumps the debounce scheduler. Returns true when a write happened.
    pub fn flush_due_saves(&mut self) -> bool {
        let targets = self.saver.take_due(Instant::now());
        if targets.is_empty() {
            return false;
        }

        self.write_now(targets);
        true
    }

    /// Persists current state and serializes the versioned export snapshot.
    pub fn export_data(&mut self) -> Result<String, HistoryStoreError> {
        self.save_to_storage();
        self.history.export_json()
    }

    /// Imports an exported snapshot and adopts the resulting conversation
    /// set. `Replace` installs the imported set wholesale; `Merge` unions by
    /// conversation id, skipping ids already present.
    pub fn import_data(
        &mut self,
        raw: &str,
        mode: ImportMode,
    ) -> Result<ImportSummary, ImportError> {
        self.save_to_storage();
        let summary = self.history.import_data(raw, mode)?;

        let mut conversations = self.history.load_conversations();
        conversations.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        self.conversations = conversations;
        self.active_conversation_id = self
            .conversations
            .first()
            .map(|conversation| conversation.id.clone());

        Ok(summary)
    }

    fn push_message(
        &mut self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Option<String> {
        let Some(conversation) = find_conversation_mut(&mut self.conversations, conversation_id)
        else {
            log::warn!("ignoring message for unknown conversation '{conversation_id}'");
            return None;
        };

        if role == MessageRole::User && conversation.title == DEFAULT_CONVERSATION_TITLE {
            conversation.title = derive_title(content);
        }

        let message = Message::new(role, content);
        let message_id = message.id.clone();
        conversation.messages.push(message);
        conversation.metadata.message_count += 1;
        conversation.touch();

        Some(message_id)
    }

    fn session_target(&self, request_id: RequestId) -> Option<(String, String)> {
        let session = self.session.as_ref()?;
        if session.request_id != request_id {
            return None;
        }

        Some((session.conversation_id.clone(), session.message_id.clone()))
    }

    /// End-of-session persistence: immediate, and absorbs any pending
    /// debounced work so the terminal write is the last writer.
    fn finalize_session_write(&mut self) {
        let mut targets = self.saver.take_all();
        targets.conversations = true;
        self.write_now(targets);
    }

    fn schedule_save(&mut self, target: SaveTarget) {
        self.saver.schedule(target, Instant::now());
    }

    fn write_now(&mut self, targets: SaveTargets) {
        let mut wrote = false;

        if targets.conversations {
            match self.history.save_conversations(&self.conversations) {
                Ok(()) => wrote = true,
                Err(error) => log::error!("failed to persist conversations: {error}"),
            }
        }

        if targets.settings {
            match self.history.save_settings(&self.settings) {
                Ok(()) => wrote = true,
                Err(error) => log::error!("failed to persist settings: {error}"),
            }
        }

        if wrote {
            self.last_saved_ms = Some(epoch_ms());
        }
    }
}

fn find_conversation_mut<'a>(
    conversations: &'a mut [Conversation],
    conversation_id: &str,
) -> Option<&'a mut Conversation> {
    conversations
        .iter_mut()
        .find(|conversation| conversation.id == conversation_id)
}

fn refresh_metadata(conversation: &mut Conversation) {
    conversation.metadata.message_count = conversation.messages.len() as u32;
    conversation.metadata.total_tokens = conversation
        .messages
        .iter()
        .filter_map(|message| message.token_count)
        .map(u64::from)
        .sum();
}

fn derive_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        title.push('…');
        title
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        MessageRole::User => ChatRole::User,
        MessageRole::Assistant => ChatRole::Assistant,
        MessageRole::System => ChatRole::System,
    };

    ChatMessage::new(role, message.content.clone())
}
