use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize value for storage key '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HistoryStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn serialize(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialize {
            key: key.into(),
            source,
        }
    }
}

/// Import rejections, with a distinct variant per failure class so callers
/// can report unparseable JSON separately from structural problems.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("import payload is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("import payload has invalid structure: {0}")]
    InvalidStructure(String),

    #[error("failed to persist imported conversations: {0}")]
    Storage(#[from] HistoryStoreError),
}
