//! Attachment blob store contract and filesystem implementation.
//!
//! # Invariants
//! - `put` is an idempotent overwrite: same owner + key means same blob.
//! - `get` returns `Ok(None)` for a missing blob; `Err` is reserved for
//!   transport/permission failures.
//! - Writes go to a temp file and are renamed into place.

use crate::model::note::{AttachmentKey, OwnerIdentity};
use async_trait::async_trait;
use log::{debug, error, warn};
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Top-level prefix of every attachment path.
pub const MEDIA_PREFIX: &str = "media";
const TMP_FILENAME_INFIX: &str = ".tmp.";

/// Blob store failures (transport/permission), distinct from a missing blob.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("insufficient permissions to access `{path}`")]
    Permission { path: BlobPath },
    #[error("storage i/o failed for `{path}`: {source}")]
    Io {
        path: BlobPath,
        #[source]
        source: std::io::Error,
    },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    fn from_io(path: BlobPath, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::PermissionDenied => Self::Permission { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Logical, owner-scoped location of one blob: `media/{owner}/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobPath {
    owner: OwnerIdentity,
    key: AttachmentKey,
}

impl BlobPath {
    pub fn new(owner: &OwnerIdentity, key: &AttachmentKey) -> Self {
        Self {
            owner: owner.clone(),
            key: key.clone(),
        }
    }

    pub fn owner(&self) -> &OwnerIdentity {
        &self.owner
    }

    pub fn key(&self) -> &AttachmentKey {
        &self.key
    }

    /// Filesystem location of this blob below `root`.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        root.join(MEDIA_PREFIX)
            .join(self.owner.as_str())
            .join(self.key.as_str())
    }
}

impl Display for BlobPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{MEDIA_PREFIX}/{}/{}", self.owner, self.key)
    }
}

/// Retrievable reference to an existing blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentHandle {
    pub path: BlobPath,
    pub size: u64,
}

/// Owner-scoped put/get of binary attachments.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Writes `bytes` at `media/{owner}/{key}`, replacing any previous blob.
    async fn put(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
        bytes: &[u8],
    ) -> Result<(), StorageError>;

    /// Looks up the blob at `media/{owner}/{key}`.
    async fn get(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
    ) -> Result<Option<AttachmentHandle>, StorageError>;

    /// Reads the bytes behind a handle obtained from `get`.
    async fn read(&self, handle: &AttachmentHandle) -> Result<Vec<u8>, StorageError>;
}

/// Attachment store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tmp_path_for(target: &Path) -> PathBuf {
        let mut file_name = target
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(format!("{TMP_FILENAME_INFIX}{}", Uuid::new_v4().simple()));
        target.with_file_name(file_name)
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn put(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let blob = BlobPath::new(owner, key);
        let target = blob.to_fs_path(&self.root);
        debug!(
            "event=attachment_put module=attachment status=start path={blob} size={}",
            bytes.len()
        );

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StorageError::from_io(blob.clone(), err))?;
        }

        let tmp = Self::tmp_path_for(&target);
        fs::write(&tmp, bytes)
            .await
            .map_err(|err| StorageError::from_io(blob.clone(), err))?;

        if let Err(err) = fs::rename(&tmp, &target).await {
            error!(
                "event=attachment_put module=attachment status=error path={blob} error_code=rename_failed error={err}"
            );
            if let Err(cleanup_err) = fs::remove_file(&tmp).await {
                warn!(
                    "event=attachment_put module=attachment status=error path={blob} error_code=tmp_cleanup_failed error={cleanup_err}"
                );
            }
            return Err(StorageError::from_io(blob, err));
        }

        debug!("event=attachment_put module=attachment status=ok path={blob}");
        Ok(())
    }

    async fn get(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
    ) -> Result<Option<AttachmentHandle>, StorageError> {
        let blob = BlobPath::new(owner, key);
        match fs::metadata(blob.to_fs_path(&self.root)).await {
            Ok(meta) if meta.is_file() => Ok(Some(AttachmentHandle {
                size: meta.len(),
                path: blob,
            })),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::from_io(blob, err)),
        }
    }

    async fn read(&self, handle: &AttachmentHandle) -> Result<Vec<u8>, StorageError> {
        fs::read(handle.path.to_fs_path(&self.root))
            .await
            .map_err(|err| StorageError::from_io(handle.path.clone(), err))
    }
}
