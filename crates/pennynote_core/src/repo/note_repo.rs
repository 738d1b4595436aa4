//! Note record store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide owner-scoped list/create/update/delete over note records.
//! - Persist the attachment key verbatim; never touch blobs.
//!
//! # Invariants
//! - Every query is constrained by `owner`; another owner's note is
//!   indistinguishable from a missing one (`NotFound`).
//! - `update` only writes `name`/`description`; `image` is never part of
//!   the statement.
//! - `delete` removes the record only; its blob is left in place.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::note::{
    validate_note_fields, AttachmentKey, AttachmentRef, Note, NoteId, NoteValidationError,
    OwnerIdentity,
};
use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::spawn_blocking;

const NOTE_SELECT_SQL: &str = "SELECT id, name, description, image FROM notes";

pub type RepoResult<T> = Result<T, RepoError>;

/// Record store error for note persistence and query operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Validation(#[from] NoteValidationError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("note not found: {0}")]
    NotFound(NoteId),
    #[error("invalid persisted note data: {0}")]
    InvalidData(String),
    #[error("note store requires schema version {expected_version}, got {actual_version}")]
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    #[error("note store connection lock is poisoned")]
    LockPoisoned,
    #[error("note store task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Owner-scoped CRUD over structured note records.
///
/// Implementations enforce owner visibility per call; the returned `image`
/// is always `AttachmentRef::Key` or `AttachmentRef::Absent`.
#[async_trait]
pub trait NoteRecordStore: Send + Sync {
    /// Returns every note visible to `owner`, in store-native order.
    async fn list(&self, owner: &OwnerIdentity) -> RepoResult<Vec<Note>>;

    /// Validates and stores a new note, assigning its id.
    ///
    /// The attachment key is stored as given; no blob existence check.
    async fn create(
        &self,
        owner: &OwnerIdentity,
        name: &str,
        description: &str,
        attachment_key: Option<&AttachmentKey>,
    ) -> RepoResult<Note>;

    /// Replaces `name` and `description` of an owner-visible note.
    async fn update(
        &self,
        owner: &OwnerIdentity,
        id: NoteId,
        name: &str,
        description: &str,
    ) -> RepoResult<Note>;

    /// Removes an owner-visible note record.
    async fn delete(&self, owner: &OwnerIdentity, id: NoteId) -> RepoResult<()>;
}

/// SQLite-backed multi-tenant note store.
///
/// Statements run on tokio's blocking pool, so a busy database never
/// stalls the async caller's worker thread.
pub struct SqliteNoteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNoteRecordStore {
    /// Wraps a migrated connection.
    ///
    /// Rejects connections that have not been through `open_db*`.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| RepoError::LockPoisoned)?;
            op(&conn)
        })
        .await
        .map_err(|err| RepoError::Task(err.to_string()))?
    }
}

#[async_trait]
impl NoteRecordStore for SqliteNoteRecordStore {
    async fn list(&self, owner: &OwnerIdentity) -> RepoResult<Vec<Note>> {
        let owner = owner.clone();
        self.with_conn(move |conn| list_sync(conn, &owner)).await
    }

    async fn create(
        &self,
        owner: &OwnerIdentity,
        name: &str,
        description: &str,
        attachment_key: Option<&AttachmentKey>,
    ) -> RepoResult<Note> {
        validate_note_fields(name, description)?;
        let owner = owner.clone();
        let name = name.to_string();
        let description = description.to_string();
        let attachment_key = attachment_key.cloned();
        self.with_conn(move |conn| {
            create_sync(conn, &owner, &name, &description, attachment_key.as_ref())
        })
        .await
    }

    async fn update(
        &self,
        owner: &OwnerIdentity,
        id: NoteId,
        name: &str,
        description: &str,
    ) -> RepoResult<Note> {
        validate_note_fields(name, description)?;
        let owner = owner.clone();
        let name = name.to_string();
        let description = description.to_string();
        self.with_conn(move |conn| update_sync(conn, &owner, id, &name, &description))
            .await
    }

    async fn delete(&self, owner: &OwnerIdentity, id: NoteId) -> RepoResult<()> {
        let owner = owner.clone();
        self.with_conn(move |conn| delete_sync(conn, &owner, id)).await
    }
}

fn list_sync(conn: &Connection, owner: &OwnerIdentity) -> RepoResult<Vec<Note>> {
    let mut stmt = conn.prepare(&format!(
        "{NOTE_SELECT_SQL}
         WHERE owner = ?1
         ORDER BY created_at DESC, rowid DESC;"
    ))?;
    let mut rows = stmt.query([owner.as_str()])?;
    let mut notes = Vec::new();
    while let Some(row) = rows.next()? {
        notes.push(parse_note_row(row)?);
    }
    Ok(notes)
}

fn get_sync(conn: &Connection, owner: &OwnerIdentity, id: NoteId) -> RepoResult<Note> {
    let mut stmt = conn.prepare(&format!("{NOTE_SELECT_SQL} WHERE id = ?1 AND owner = ?2;"))?;
    let note = stmt
        .query_row(params![id.to_string(), owner.as_str()], |row| {
            Ok(parse_note_row(row))
        })
        .optional()?;
    match note {
        Some(note) => note,
        None => Err(RepoError::NotFound(id)),
    }
}

fn create_sync(
    conn: &Connection,
    owner: &OwnerIdentity,
    name: &str,
    description: &str,
    attachment_key: Option<&AttachmentKey>,
) -> RepoResult<Note> {
    let id = NoteId::generate();
    let now = now_epoch_ms();
    conn.execute(
        "INSERT INTO notes (id, owner, name, description, image, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
        params![
            id.to_string(),
            owner.as_str(),
            name,
            description,
            attachment_key.map(AttachmentKey::as_str),
            now,
        ],
    )?;
    debug!(
        "event=note_create module=repo status=ok owner={owner} note_id={id} has_image={}",
        attachment_key.is_some()
    );
    get_sync(conn, owner, id)
}

fn update_sync(
    conn: &Connection,
    owner: &OwnerIdentity,
    id: NoteId,
    name: &str,
    description: &str,
) -> RepoResult<Note> {
    let changed = conn.execute(
        "UPDATE notes
         SET
            name = ?3,
            description = ?4,
            updated_at = ?5
         WHERE id = ?1
           AND owner = ?2;",
        params![id.to_string(), owner.as_str(), name, description, now_epoch_ms()],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(id));
    }
    debug!("event=note_update module=repo status=ok owner={owner} note_id={id}");
    get_sync(conn, owner, id)
}

fn delete_sync(conn: &Connection, owner: &OwnerIdentity, id: NoteId) -> RepoResult<()> {
    let changed = conn.execute(
        "DELETE FROM notes WHERE id = ?1 AND owner = ?2;",
        params![id.to_string(), owner.as_str()],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(id));
    }
    debug!("event=note_delete module=repo status=ok owner={owner} note_id={id}");
    Ok(())
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let id_text: String = row.get("id")?;
    let id = NoteId::parse(&id_text)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid uuid value `{id_text}` in notes.id")))?;

    // A key that no longer passes validation is treated like a missing blob.
    let image = match row.get::<_, Option<String>>("image")? {
        Some(value) if value.is_empty() => AttachmentRef::Absent,
        Some(value) => match AttachmentKey::new(value) {
            Ok(key) => AttachmentRef::Key(key),
            Err(err) => {
                warn!("event=note_read module=repo status=degraded note_id={id} error={err}");
                AttachmentRef::Absent
            }
        },
        None => AttachmentRef::Absent,
    };

    Ok(Note {
        id,
        name: row.get("name")?,
        description: row.get("description")?,
        image,
    })
}

fn now_epoch_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let actual_version = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
