use super::store::StoreError;
use crate::documents::DocumentId;
use std::time::Duration;
use thiserror::Error;

/// Failures inside a bulk step. None of them escape
/// [`BulkJobController::step`](super::BulkJobController::step): each is
/// turned into a failed `StepReport`.
#[derive(Debug, Error)]
pub enum BulkError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("document listing failed: {0:#}")]
    Documents(anyhow::Error),

    #[error("{source:#}")]
    Generation {
        document: DocumentId,
        source: anyhow::Error,
    },

    #[error("timed out after {after:?}")]
    Timeout { document: DocumentId, after: Duration },
}

impl BulkError {
    /// Document the failure is about, if any.
    pub fn document(&self) -> Option<&DocumentId> {
        match self {
            BulkError::Generation { document, .. } | BulkError::Timeout { document, .. } => {
                Some(document)
            }
            _ => None,
        }
    }
}
