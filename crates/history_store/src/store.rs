use std::collections::HashSet;
use std::path::Path;

use chat_provider::ModelInfo;

use crate::backend::{FileBackend, StorageBackend};
use crate::clock::epoch_ms;
use crate::error::{HistoryStoreError, ImportError};
use crate::paths::storage_root;
use crate::schema::{AppSettings, Conversation, ExportPayload, EXPORT_VERSION};

pub const CONVERSATIONS_KEY: &str = "conversations";
pub const SETTINGS_KEY: &str = "settings";
pub const MODELS_KEY: &str = "models";

const REQUIRED_EXPORT_FIELDS: [&str; 4] = ["version", "exported_at", "conversations", "settings"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Wipe existing conversations and install the imported set.
    Replace,
    /// Union by conversation id, skipping ids already present.
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// The only component that touches durable storage.
///
/// Loads are corruption tolerant: malformed stored data is logged and
/// recovered to the empty/default state, never surfaced to the caller.
pub struct HistoryStore {
    backend: Box<dyn StorageBackend>,
}

impl HistoryStore {
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Opens a file-backed store under `base` using the standard storage root.
    #[must_use]
    pub fn open_dir(base: &Path) -> Self {
        Self::new(Box::new(FileBackend::new(storage_root(base))))
    }

    pub fn save_conversations(
        &mut self,
        conversations: &[Conversation],
    ) -> Result<(), HistoryStoreError> {
        self.write_json(CONVERSATIONS_KEY, conversations)
    }

    #[must_use]
    pub fn load_conversations(&self) -> Vec<Conversation> {
        self.read_json_or(CONVERSATIONS_KEY, Vec::new)
    }

    pub fn save_settings(&mut self, settings: &AppSettings) -> Result<(), HistoryStoreError> {
        self.write_json(SETTINGS_KEY, settings)
    }

    #[must_use]
    pub fn load_settings(&self) -> AppSettings {
        self.read_json_or(SETTINGS_KEY, AppSettings::default)
    }

    pub fn save_models(&mut self, models: &[ModelInfo]) -> Result<(), HistoryStoreError> {
        self.write_json(MODELS_KEY, models)
    }

    #[must_use]
    pub fn load_models(&self) -> Vec<ModelInfo> {
        self.read_json_or(MODELS_KEY, Vec::new)
    }

    /// Builds a versioned snapshot of everything currently stored.
    #[must_use]
    pub fn export_data(&self) -> ExportPayload {
        ExportPayload {
            version: EXPORT_VERSION.to_string(),
            exported_at: epoch_ms(),
            conversations: self.load_conversations(),
            settings: self.load_settings(),
        }
    }

    /// Serializes the export snapshot for writing to a file.
    pub fn export_json(&self) -> Result<String, HistoryStoreError> {
        serde_json::to_string_pretty(&self.export_data())
            .map_err(|source| HistoryStoreError::serialize("export", source))
    }

    /// Validates and installs an exported snapshot.
    ///
    /// Settings are left untouched; import only affects the conversation set.
    pub fn import_data(
        &mut self,
        raw: &str,
        mode: ImportMode,
    ) -> Result<ImportSummary, ImportError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(ImportError::InvalidJson)?;
        let object = value.as_object().ok_or_else(|| {
            ImportError::InvalidStructure("top level must be a JSON object".to_string())
        })?;

        for field in REQUIRED_EXPORT_FIELDS {
            if !object.contains_key(field) {
                return Err(ImportError::MissingField { field });
            }
        }

        let payload: ExportPayload = serde_json::from_value(value)
            .map_err(|source| ImportError::InvalidStructure(source.to_string()))?;

        let summary = match mode {
            ImportMode::Replace => {
                let imported = payload.conversations.len();
                self.save_conversations(&payload.conversations)?;
                ImportSummary {
                    imported,
                    skipped: 0,
                }
            }
            ImportMode::Merge => {
                let mut existing = self.load_conversations();
                let known: HashSet<String> =
                    existing.iter().map(|conversation| conversation.id.clone()).collect();

                let mut summary = ImportSummary::default();
                for conversation in payload.conversations {
                    if known.contains(&conversation.id) {
                        summary.skipped += 1;
                    } else {
                        existing.push(conversation);
                        summary.imported += 1;
                    }
                }

                self.save_conversations(&existing)?;
                summary
            }
        };

        log::info!(
            "imported {} conversations ({} skipped)",
            summary.imported,
            summary.skipped
        );
        Ok(summary)
    }

    fn write_json<T: serde::Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<(), HistoryStoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|source| HistoryStoreError::serialize(key, source))?;
        self.backend.write(key, &raw)
    }

    fn read_json_or<T, F>(&self, key: &str, fallback: F) -> T
    where
        T: serde::de::DeserializeOwned,
        F: FnOnce() -> T,
    {
        let raw = match self.backend.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return fallback(),
            Err(error) => {
                log::warn!("failed to read storage key '{key}': {error}");
                return fallback();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(error) => {
                log::warn!("discarding corrupted storage key '{key}': {error}");
                fallback()
            }
        }
    }
}
