use crate::domain::prediction::{HistoryList, PredictionRecord};
use crate::export::{self, ExportArtifact, ExportError};
use crate::render::{self, DisplayRow};
use crate::storage::HistoryStore;

/// Whether a prediction made it into persisted history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Saved,
    NotSaved(String),
}

impl Persisted {
    pub fn is_saved(&self) -> bool {
        matches!(self, Persisted::Saved)
    }
}

/// One front-end lifetime: the history store plus the latest prediction
/// made during it. The latest prediction is never persisted on its own.
#[derive(Debug)]
pub struct PredictionSession {
    store: HistoryStore,
    latest: Option<PredictionRecord>,
}

impl PredictionSession {
    pub fn open(store: HistoryStore) -> Self {
        tracing::debug!(key = store.key(), "prediction session opened");
        Self {
            store,
            latest: None,
        }
    }

    /// Ends the session, handing the store back.
    pub fn close(self) -> HistoryStore {
        tracing::debug!(
            key = self.store.key(),
            had_prediction = self.latest.is_some(),
            "prediction session closed"
        );
        self.store
    }

    /// Becomes the latest prediction even when the history write fails.
    pub fn record_prediction(&mut self, record: PredictionRecord) -> Persisted {
        let outcome = match self.store.save_history(record.clone()) {
            Ok(()) => Persisted::Saved,
            Err(err) => {
                tracing::warn!(error = %err, "prediction not saved to history");
                Persisted::NotSaved(err.detail)
            }
        };
        self.latest = Some(record);
        outcome
    }

    pub fn latest(&self) -> Option<&PredictionRecord> {
        self.latest.as_ref()
    }

    pub fn history(&self) -> HistoryList {
        self.store.get_history()
    }

    pub fn rows(&self) -> Vec<DisplayRow> {
        render::render_rows(&self.history())
    }

    pub fn export_single_report(&self) -> Result<ExportArtifact, ExportError> {
        export::export_single_report(self.latest())
    }

    pub fn export_history_report(&self) -> Result<ExportArtifact, ExportError> {
        export::export_history_report(&self.history())
    }
}
