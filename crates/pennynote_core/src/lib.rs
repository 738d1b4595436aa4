//! Core domain logic for PennyNote.
//!
//! Keeps owner-scoped note records and their optional image blobs
//! consistent, and republishes a resolved feed after every mutation.

pub mod app;
pub mod attachment;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use app::{AppError, CoreApp};
pub use attachment::resolver::{AttachmentResolver, ResolveError, SignedUrlResolver, UrlSigner};
pub use attachment::store::{
    AttachmentHandle, AttachmentStore, BlobPath, FsAttachmentStore, StorageError,
};
pub use config::{ConfigError, CoreConfig, LoggingConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::note::{
    AttachmentKey, AttachmentRef, Note, NoteId, NoteValidationError, OwnerIdentity, ResolvedUrl,
};
pub use repo::note_repo::{NoteRecordStore, RepoError, RepoResult, SqliteNoteRecordStore};
pub use service::edit_session::{EditSession, EditSessionError};
pub use service::sync_orchestrator::{
    AttachmentOutcome, AttachmentUpload, CreateNoteRequest, DeleteNoteRequest, FeedSnapshot,
    MutationReport, SyncError, SyncOrchestrator, SyncPhase, UpdateNoteRequest,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
