//! Transient state for editing one note.
//!
//! # Invariants
//! - The snapshot taken at `open` is never mutated.
//! - `submit` sends id, name and description only; the note's image key
//!   stays whatever the record store already holds.
//! - `close` is idempotent; a successful `submit` closes the session.

use crate::model::note::Note;
use crate::service::sync_orchestrator::{
    MutationReport, SyncError, SyncOrchestrator, UpdateNoteRequest,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditSessionError {
    #[error("edit session is closed")]
    Closed,
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// In-progress edit of a single note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    snapshot: Option<Note>,
}

impl EditSession {
    /// Captures `note` as it was when editing started.
    pub fn open(note: Note) -> Self {
        Self {
            snapshot: Some(note),
        }
    }

    pub fn snapshot(&self) -> Option<&Note> {
        self.snapshot.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Applies new text through the orchestrator and closes the session.
    ///
    /// On failure the session stays open so the caller can retry.
    pub async fn submit(
        &mut self,
        orchestrator: &SyncOrchestrator,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<MutationReport, EditSessionError> {
        let id = self.snapshot.as_ref().ok_or(EditSessionError::Closed)?.id;
        let report = orchestrator
            .update(UpdateNoteRequest {
                id,
                name: name.into(),
                description: description.into(),
            })
            .await?;
        self.close();
        Ok(report)
    }

    pub fn close(&mut self) {
        self.snapshot = None;
    }
}
