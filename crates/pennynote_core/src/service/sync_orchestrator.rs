//! Mutation + refresh orchestration for one owner's note feed.
//!
//! # Responsibility
//! - Apply create/update/delete requests against the record store (and the
//!   attachment store on create).
//! - Re-read the full note list after every mutation, resolve image keys and
//!   publish the result as the new feed snapshot.
//!
//! # Invariants
//! - A failed record-store mutation aborts with no refresh and no publish.
//! - An attachment upload failure after a successful create is reported as a
//!   partial success; the record is not rolled back.
//! - Published snapshots never contain `AttachmentRef::Key`.
//! - A single note's failed resolution degrades that note to `Absent` only.
//! - Refreshes are not mutually excluded. Each takes a generation when it
//!   finishes resolving; a snapshot older than the published one is dropped.

use crate::attachment::resolver::AttachmentResolver;
use crate::attachment::store::{AttachmentStore, StorageError};
use crate::model::note::{
    validate_note_fields, AttachmentKey, AttachmentRef, Note, NoteId, NoteValidationError,
    OwnerIdentity,
};
use crate::repo::note_repo::{NoteRecordStore, RepoError};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Orchestrator failures surfaced to the UI collaborator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] NoteValidationError),
    #[error("note not found: {0}")]
    NotFound(NoteId),
    #[error("note record store failed: {0}")]
    RecordStore(#[source] RepoError),
    /// The mutation was applied, but the follow-up list fetch failed.
    ///
    /// `note_id` and `attachment` describe the applied mutation exactly as
    /// a `MutationReport` would; only the feed is stale.
    #[error("note {note_id} saved but feed refresh failed: {source}")]
    Refresh {
        note_id: NoteId,
        attachment: AttachmentOutcome,
        #[source]
        source: RepoError,
    },
}

impl From<RepoError> for SyncError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::RecordStore(other),
        }
    }
}

/// Image chosen in the create form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    /// Original file name; becomes the attachment key.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateNoteRequest {
    pub name: String,
    pub description: String,
    pub attachment: Option<AttachmentUpload>,
}

/// Edits text fields only; there is deliberately no image field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNoteRequest {
    pub id: NoteId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteNoteRequest {
    pub id: NoteId,
}

/// Coarse orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Refreshing,
}

/// Attachment-resolved note list as published to readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    generation: u64,
    notes: Vec<Note>,
}

impl FeedSnapshot {
    /// Refresh counter; 0 means nothing has been fetched yet.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn find(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// What happened to the attachment part of a mutation.
#[derive(Debug)]
pub enum AttachmentOutcome {
    NotRequested,
    Uploaded(AttachmentKey),
    /// Record exists with this key, but its blob was not stored.
    Failed {
        key: AttachmentKey,
        error: StorageError,
    },
}

/// Result of one successful mutation and its refresh.
#[derive(Debug)]
pub struct MutationReport {
    /// Id of the created/updated/deleted note.
    pub note_id: NoteId,
    /// The note as it appears in `feed`; `None` after delete or if another
    /// caller removed it before the refresh.
    pub note: Option<Note>,
    pub attachment: AttachmentOutcome,
    pub feed: Arc<FeedSnapshot>,
}

impl MutationReport {
    /// Record written, attachment upload failed.
    pub fn is_partial(&self) -> bool {
        matches!(self.attachment, AttachmentOutcome::Failed { .. })
    }
}

/// Sequences mutation, list and resolution for one owner.
pub struct SyncOrchestrator {
    owner: OwnerIdentity,
    records: Arc<dyn NoteRecordStore>,
    attachments: Arc<dyn AttachmentStore>,
    resolver: Arc<dyn AttachmentResolver>,
    in_flight: AtomicUsize,
    generation: AtomicU64,
    feed: watch::Sender<Arc<FeedSnapshot>>,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SyncOrchestrator {
    pub fn new(
        owner: OwnerIdentity,
        records: Arc<dyn NoteRecordStore>,
        attachments: Arc<dyn AttachmentStore>,
        resolver: Arc<dyn AttachmentResolver>,
    ) -> Self {
        let (feed, _) = watch::channel(Arc::new(FeedSnapshot::default()));
        Self {
            owner,
            records,
            attachments,
            resolver,
            in_flight: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            feed,
        }
    }

    pub fn owner(&self) -> &OwnerIdentity {
        &self.owner
    }

    pub fn phase(&self) -> SyncPhase {
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            SyncPhase::Idle
        } else {
            SyncPhase::Refreshing
        }
    }

    /// Last published snapshot.
    pub fn current_feed(&self) -> Arc<FeedSnapshot> {
        self.feed.borrow().clone()
    }

    /// Receiver that observes every future publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.feed.subscribe()
    }

    /// Fetches, resolves and publishes the feed without mutating anything.
    pub async fn refresh(&self) -> Result<Arc<FeedSnapshot>, SyncError> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.refresh_feed().await.map_err(SyncError::RecordStore)
    }

    /// Creates a note, uploads its image if any, then refreshes.
    ///
    /// The upload uses the key stored on the created record.
    pub async fn create(&self, request: CreateNoteRequest) -> Result<MutationReport, SyncError> {
        validate_note_fields(&request.name, &request.description)?;
        let key = match &request.attachment {
            Some(upload) => AttachmentKey::from_upload_name(&upload.file_name)?,
            None => None,
        };

        let _guard = InFlightGuard::enter(&self.in_flight);
        let note = self
            .records
            .create(&self.owner, &request.name, &request.description, key.as_ref())
            .await
            .inspect_err(|err| self.log_mutation_error("note_create", err))?;

        let attachment = match (note.image.key(), request.attachment) {
            (Some(stored_key), Some(upload)) => {
                self.upload_attachment(note.id, stored_key, &upload.bytes)
                    .await
            }
            _ => AttachmentOutcome::NotRequested,
        };

        self.finish_mutation("note_create", note.id, attachment).await
    }

    /// Replaces name/description; the stored image key is never sent.
    pub async fn update(&self, request: UpdateNoteRequest) -> Result<MutationReport, SyncError> {
        validate_note_fields(&request.name, &request.description)?;

        let _guard = InFlightGuard::enter(&self.in_flight);
        let note = self
            .records
            .update(&self.owner, request.id, &request.name, &request.description)
            .await
            .inspect_err(|err| self.log_mutation_error("note_update", err))?;

        self.finish_mutation("note_update", note.id, AttachmentOutcome::NotRequested)
            .await
    }

    /// Deletes the record. Its blob, if any, is left in place.
    pub async fn delete(&self, request: DeleteNoteRequest) -> Result<MutationReport, SyncError> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.records
            .delete(&self.owner, request.id)
            .await
            .inspect_err(|err| self.log_mutation_error("note_delete", err))?;

        self.finish_mutation("note_delete", request.id, AttachmentOutcome::NotRequested)
            .await
    }

    async fn upload_attachment(
        &self,
        note_id: NoteId,
        key: &AttachmentKey,
        bytes: &[u8],
    ) -> AttachmentOutcome {
        match self.attachments.put(&self.owner, key, bytes).await {
            Ok(()) => AttachmentOutcome::Uploaded(key.clone()),
            Err(error) => {
                warn!(
                    "event=attachment_upload module=sync status=partial owner={} note_id={note_id} key={key} error={error}",
                    self.owner
                );
                AttachmentOutcome::Failed {
                    key: key.clone(),
                    error,
                }
            }
        }
    }

    async fn finish_mutation(
        &self,
        event: &'static str,
        note_id: NoteId,
        attachment: AttachmentOutcome,
    ) -> Result<MutationReport, SyncError> {
        let feed = match self.refresh_feed().await {
            Ok(feed) => feed,
            Err(source) => {
                error!(
                    "event={event} module=sync status=error owner={} note_id={note_id} error_code=refresh_failed error={source}",
                    self.owner
                );
                return Err(SyncError::Refresh {
                    note_id,
                    attachment,
                    source,
                });
            }
        };

        let status = if matches!(attachment, AttachmentOutcome::Failed { .. }) {
            "partial"
        } else {
            "ok"
        };
        info!(
            "event={event} module=sync status={status} owner={} note_id={note_id} generation={}",
            self.owner,
            feed.generation()
        );

        Ok(MutationReport {
            note_id,
            note: feed.find(note_id).cloned(),
            attachment,
            feed,
        })
    }

    async fn refresh_feed(&self) -> Result<Arc<FeedSnapshot>, RepoError> {
        let stored = self.records.list(&self.owner).await?;
        let notes = join_all(stored.into_iter().map(|note| self.resolve_note(note))).await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(FeedSnapshot { generation, notes });
        self.publish(snapshot.clone());
        debug!(
            "event=feed_publish module=sync status=ok owner={} generation={generation} notes={}",
            self.owner,
            snapshot.len()
        );
        Ok(snapshot)
    }

    /// Replaces the visible feed unless it already holds a newer generation.
    ///
    /// On a multi-threaded runtime two refreshes can take generations in one
    /// order and reach this point in the other.
    fn publish(&self, snapshot: Arc<FeedSnapshot>) -> bool {
        self.feed.send_if_modified(|current| {
            if current.generation >= snapshot.generation {
                return false;
            }
            *current = snapshot;
            true
        })
    }

    async fn resolve_note(&self, mut note: Note) -> Note {
        let key = match &note.image {
            AttachmentRef::Key(key) => key.clone(),
            _ => return note,
        };
        note.image = match self.resolver.resolve(&self.owner, &key).await {
            Ok(Some(url)) => AttachmentRef::Url(url),
            Ok(None) => {
                warn!(
                    "event=attachment_resolve module=sync status=orphan owner={} note_id={} key={key}",
                    self.owner, note.id
                );
                AttachmentRef::Absent
            }
            Err(err) => {
                warn!(
                    "event=attachment_resolve module=sync status=error owner={} note_id={} key={key} error={err}",
                    self.owner, note.id
                );
                AttachmentRef::Absent
            }
        };
        note
    }

    fn log_mutation_error(&self, event: &str, err: &RepoError) {
        let code = match err {
            RepoError::Validation(_) => "validation_failed",
            RepoError::NotFound(_) => "not_found",
            _ => "record_store_failed",
        };
        error!(
            "event={event} module=sync status=error owner={} error_code={code} error={err}",
            self.owner
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{FeedSnapshot, SyncOrchestrator};
    use crate::attachment::resolver::{SignedUrlResolver, UrlSigner};
    use crate::attachment::store::FsAttachmentStore;
    use crate::db::open_db_in_memory;
    use crate::model::note::OwnerIdentity;
    use crate::repo::note_repo::SqliteNoteRecordStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn orchestrator(media_root: &std::path::Path) -> SyncOrchestrator {
        let records =
            Arc::new(SqliteNoteRecordStore::try_new(open_db_in_memory().unwrap()).unwrap());
        let blobs = Arc::new(FsAttachmentStore::new(media_root));
        let signer = UrlSigner::new(
            b"0123456789abcdef".to_vec(),
            "https://media.example.com",
            Duration::from_secs(60),
        );
        let resolver = Arc::new(SignedUrlResolver::new(blobs.clone(), signer));
        SyncOrchestrator::new(OwnerIdentity::new("alice").unwrap(), records, blobs, resolver)
    }

    fn snapshot(generation: u64) -> Arc<FeedSnapshot> {
        Arc::new(FeedSnapshot {
            generation,
            notes: Vec::new(),
        })
    }

    #[test]
    fn late_snapshot_never_replaces_a_newer_one() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let mut rx = orchestrator.subscribe();

        assert!(orchestrator.publish(snapshot(2)));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().generation(), 2);

        assert!(!orchestrator.publish(snapshot(1)));
        assert!(!orchestrator.publish(snapshot(2)));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(orchestrator.current_feed().generation(), 2);

        assert!(orchestrator.publish(snapshot(3)));
        assert_eq!(orchestrator.current_feed().generation(), 3);
    }
}
