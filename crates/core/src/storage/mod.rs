pub mod file;
pub mod memory;

use crate::domain::prediction::{HistoryList, PredictionRecord};
use std::fmt;
use std::sync::Arc;

pub use file::FileBackend;
pub use memory::InMemoryBackend;

/// Storage slot holding the serialized history.
pub const HISTORY_KEY: &str = "retention_prediction_history";

/// Single-origin key-value storage, in the manner of browser local storage.
///
/// Values are opaque text. Implementations make no transactional
/// guarantees: two writers sharing a backend race and the last write wins.
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct StoreError {
    pub key: String,
    pub stage: &'static str,
    pub detail: String,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "history store error (key={}, stage={}): {}",
            self.key, self.stage, self.detail
        )
    }
}

impl std::error::Error for StoreError {}

/// Outcome of reading the history slot.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryLoad {
    /// Nothing stored yet.
    Absent,
    Loaded(HistoryList),
    /// Stored text was unreadable and has been treated as empty.
    Recovered { reason: String },
}

impl HistoryLoad {
    pub fn into_history(self) -> HistoryList {
        match self {
            HistoryLoad::Loaded(history) => history,
            HistoryLoad::Absent | HistoryLoad::Recovered { .. } => HistoryList::new(),
        }
    }
}

#[derive(Clone)]
pub struct HistoryStore {
    backend: Arc<dyn KeyValueBackend>,
    key: String,
}

impl fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryStore").field("key", &self.key).finish()
    }
}

impl HistoryStore {
    pub fn open(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self::open_with_key(backend, HISTORY_KEY)
    }

    /// Uses `key` as the storage slot. `FileBackend` only accepts keys made of
    /// ASCII letters, digits, `-` and `_`.
    pub fn open_with_key(backend: Arc<dyn KeyValueBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> HistoryLoad {
        let text = match self.backend.get(&self.key) {
            Ok(Some(text)) => text,
            Ok(None) => return HistoryLoad::Absent,
            Err(err) => {
                return HistoryLoad::Recovered {
                    reason: format!("{err:#}"),
                }
            }
        };

        match HistoryList::from_json(&text) {
            Ok(history) => HistoryLoad::Loaded(history),
            Err(err) => HistoryLoad::Recovered {
                reason: err.to_string(),
            },
        }
    }

    /// Current history; unreadable or missing data yields an empty list.
    pub fn get_history(&self) -> HistoryList {
        let load = self.load();
        if let HistoryLoad::Recovered { reason } = &load {
            tracing::warn!(key = %self.key, %reason, "stored history unreadable; treating as empty");
        }
        load.into_history()
    }

    /// Prepends `record` and writes the bounded list back.
    pub fn save_history(&self, record: PredictionRecord) -> Result<(), StoreError> {
        let mut history = self.get_history();
        history.prepend(record);

        let text = history.to_json().map_err(|e| StoreError {
            key: self.key.clone(),
            stage: "serialize",
            detail: e.to_string(),
        })?;

        self.backend.set(&self.key, &text).map_err(|e| StoreError {
            key: self.key.clone(),
            stage: "write",
            detail: format!("{e:#}"),
        })?;

        tracing::debug!(key = %self.key, entries = history.len(), "history saved");
        Ok(())
    }
}
