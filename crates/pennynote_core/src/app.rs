//! Wiring of configuration into concrete stores.
//!
//! # Responsibility
//! - Open the SQLite record store and the filesystem blob store once.
//! - Hand out per-owner orchestrators sharing those stores.
//! - Serve blob bytes behind a verified signed URL.

use crate::attachment::resolver::{now_unix, ResolveError, SignedUrlResolver, UrlSigner};
use crate::attachment::store::{AttachmentStore, BlobPath, FsAttachmentStore, StorageError};
use crate::config::{ConfigError, CoreConfig};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::note::OwnerIdentity;
use crate::repo::note_repo::{RepoError, SqliteNoteRecordStore};
use crate::service::sync_orchestrator::SyncOrchestrator;
use log::info;
use rusqlite::Connection;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no blob stored at `{0}`")]
    MissingBlob(BlobPath),
}

/// Shared stores for every owner served by this process.
pub struct CoreApp {
    records: Arc<SqliteNoteRecordStore>,
    attachments: Arc<FsAttachmentStore>,
    resolver: Arc<SignedUrlResolver>,
}

impl CoreApp {
    /// Opens the database file and media root named by `config`.
    pub fn open(config: &CoreConfig) -> Result<Self, AppError> {
        config.validate()?;
        let conn = open_db(&config.database_path)?;
        info!(
            "event=app_open module=app status=ok database={} media_root={}",
            config.database_path.display(),
            config.media_root.display()
        );
        Self::with_connection(config, conn)
    }

    /// Same as `open` but keeps note records in memory.
    pub fn open_in_memory(config: &CoreConfig) -> Result<Self, AppError> {
        config.validate()?;
        Self::with_connection(config, open_db_in_memory()?)
    }

    fn with_connection(config: &CoreConfig, conn: Connection) -> Result<Self, AppError> {
        let records = Arc::new(SqliteNoteRecordStore::try_new(conn)?);
        let attachments = Arc::new(FsAttachmentStore::new(&config.media_root));
        let signer = UrlSigner::new(
            config.url_signing_secret.as_bytes(),
            config.media_base_url.trim(),
            config.url_ttl(),
        );
        let resolver = Arc::new(SignedUrlResolver::new(attachments.clone(), signer));
        Ok(Self {
            records,
            attachments,
            resolver,
        })
    }

    /// Orchestrator acting on behalf of `owner`.
    pub fn orchestrator_for(&self, owner: OwnerIdentity) -> SyncOrchestrator {
        SyncOrchestrator::new(
            owner,
            self.records.clone(),
            self.attachments.clone(),
            self.resolver.clone(),
        )
    }

    /// Verifies a resolved URL and returns the bytes it grants access to.
    pub async fn fetch_signed(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolver.signer().verify(url, now_unix())?;
        let handle = self
            .attachments
            .get(path.owner(), path.key())
            .await?
            .ok_or_else(|| AppError::MissingBlob(path.clone()))?;
        Ok(self.attachments.read(&handle).await?)
    }
}
