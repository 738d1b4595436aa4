#![allow(dead_code)]

use async_trait::async_trait;
use pennynote_core::db::open_db_in_memory;
use pennynote_core::{
    AttachmentHandle, AttachmentKey, AttachmentResolver, AttachmentStore, FsAttachmentStore, Note,
    NoteId, NoteRecordStore, OwnerIdentity, RepoError, RepoResult, SignedUrlResolver,
    SqliteNoteRecordStore, StorageError, SyncOrchestrator, UrlSigner,
};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const SECRET: &[u8] = b"test-signing-secret-0123";
pub const BASE_URL: &str = "https://media.test";

static CLOCK: AtomicI64 = AtomicI64::new(1_700_000_000);

pub fn test_clock() -> i64 {
    CLOCK.load(Ordering::SeqCst)
}

pub fn advance_clock(secs: i64) {
    CLOCK.fetch_add(secs, Ordering::SeqCst);
}

pub fn signer() -> UrlSigner {
    UrlSigner::new(SECRET.to_vec(), BASE_URL, Duration::from_secs(900))
}

pub fn owner(value: &str) -> OwnerIdentity {
    OwnerIdentity::new(value).unwrap()
}

pub fn key(value: &str) -> AttachmentKey {
    AttachmentKey::new(value).unwrap()
}

pub fn sqlite_records() -> Arc<SqliteNoteRecordStore> {
    Arc::new(SqliteNoteRecordStore::try_new(open_db_in_memory().unwrap()).unwrap())
}

/// Real stores on a temp media root plus direct handles for assertions.
pub struct Harness {
    pub dir: TempDir,
    pub owner: OwnerIdentity,
    pub records: Arc<dyn NoteRecordStore>,
    pub blobs: Arc<FsAttachmentStore>,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(|blobs| blobs, |records| records)
    }

    /// `wrap_put` decides which store the orchestrator uploads through;
    /// `wrap_records` decides which record store it talks to.
    pub fn build(
        wrap_put: impl FnOnce(Arc<dyn AttachmentStore>) -> Arc<dyn AttachmentStore>,
        wrap_records: impl FnOnce(Arc<dyn NoteRecordStore>) -> Arc<dyn NoteRecordStore>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(FsAttachmentStore::new(dir.path()));
        let resolver: Arc<dyn AttachmentResolver> = Arc::new(SignedUrlResolver::with_clock(
            blobs.clone(),
            signer(),
            test_clock,
        ));
        let uploads: Arc<dyn AttachmentStore> = blobs.clone();
        Self::assemble(dir, blobs, wrap_put(uploads), resolver, wrap_records)
    }

    pub fn with_resolver_store(lookup: Arc<dyn AttachmentStore>, dir: TempDir) -> Self {
        let blobs = Arc::new(FsAttachmentStore::new(dir.path()));
        let resolver: Arc<dyn AttachmentResolver> =
            Arc::new(SignedUrlResolver::with_clock(lookup, signer(), test_clock));
        Self::assemble(dir, blobs.clone(), blobs, resolver, |records| records)
    }

    fn assemble(
        dir: TempDir,
        blobs: Arc<FsAttachmentStore>,
        uploads: Arc<dyn AttachmentStore>,
        resolver: Arc<dyn AttachmentResolver>,
        wrap_records: impl FnOnce(Arc<dyn NoteRecordStore>) -> Arc<dyn NoteRecordStore>,
    ) -> Self {
        let owner = owner("us-east-1:0f1e2d3c");
        let records: Arc<dyn NoteRecordStore> = sqlite_records();
        let records = wrap_records(records);
        let orchestrator =
            SyncOrchestrator::new(owner.clone(), records.clone(), uploads, resolver);
        Self {
            dir,
            owner,
            records,
            blobs,
            orchestrator,
        }
    }

    /// Notes exactly as persisted, with attachment keys unresolved.
    pub async fn stored_notes(&self) -> Vec<Note> {
        self.records.list(&self.owner).await.unwrap()
    }

    pub fn blob_bytes(&self, owner: &OwnerIdentity, name: &str) -> Option<Vec<u8>> {
        std::fs::read(
            self.dir
                .path()
                .join("media")
                .join(owner.as_str())
                .join(name),
        )
        .ok()
    }
}

/// Upload path that always fails, as a dropped connection would.
pub struct RejectingPuts {
    pub inner: Arc<dyn AttachmentStore>,
    pub attempts: AtomicUsize,
}

impl RejectingPuts {
    pub fn wrap(inner: Arc<dyn AttachmentStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AttachmentStore for RejectingPuts {
    async fn put(
        &self,
        _owner: &OwnerIdentity,
        _key: &AttachmentKey,
        _bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable("upload rejected".to_string()))
    }

    async fn get(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
    ) -> Result<Option<AttachmentHandle>, StorageError> {
        self.inner.get(owner, key).await
    }

    async fn read(&self, handle: &AttachmentHandle) -> Result<Vec<u8>, StorageError> {
        self.inner.read(handle).await
    }
}

/// Lookup path that fails for one key only.
pub struct BrokenLookup {
    pub inner: Arc<dyn AttachmentStore>,
    pub broken_key: AttachmentKey,
}

#[async_trait]
impl AttachmentStore for BrokenLookup {
    async fn put(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.inner.put(owner, key, bytes).await
    }

    async fn get(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
    ) -> Result<Option<AttachmentHandle>, StorageError> {
        if key == &self.broken_key {
            return Err(StorageError::Unavailable("lookup timed out".to_string()));
        }
        self.inner.get(owner, key).await
    }

    async fn read(&self, handle: &AttachmentHandle) -> Result<Vec<u8>, StorageError> {
        self.inner.read(handle).await
    }
}

/// Record store whose mutations or listing can be made to fail or wait.
pub struct ScriptedRecords {
    pub inner: Arc<dyn NoteRecordStore>,
    pub fail_create: bool,
    pub fail_list: bool,
    pub list_gate: Option<Arc<Notify>>,
    pub list_calls: AtomicUsize,
}

impl ScriptedRecords {
    pub fn new(inner: Arc<dyn NoteRecordStore>) -> Self {
        Self {
            inner,
            fail_create: false,
            fail_list: false,
            list_gate: None,
            list_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NoteRecordStore for ScriptedRecords {
    async fn list(&self, owner: &OwnerIdentity) -> RepoResult<Vec<Note>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.list_gate {
            gate.notified().await;
        }
        if self.fail_list {
            return Err(RepoError::InvalidData("list unavailable".to_string()));
        }
        self.inner.list(owner).await
    }

    async fn create(
        &self,
        owner: &OwnerIdentity,
        name: &str,
        description: &str,
        attachment_key: Option<&AttachmentKey>,
    ) -> RepoResult<Note> {
        if self.fail_create {
            return Err(RepoError::LockPoisoned);
        }
        self.inner
            .create(owner, name, description, attachment_key)
            .await
    }

    async fn update(
        &self,
        owner: &OwnerIdentity,
        id: NoteId,
        name: &str,
        description: &str,
    ) -> RepoResult<Note> {
        self.inner.update(owner, id, name, description).await
    }

    async fn delete(&self, owner: &OwnerIdentity, id: NoteId) -> RepoResult<()> {
        self.inner.delete(owner, id).await
    }
}
