//! Note domain model.
//!
//! # Responsibility
//! - Define `Note` and the value types it is built from.
//! - Validate user-supplied fields before any store is touched.
//!
//! # Invariants
//! - `name` and `description` are never blank on a persisted note.
//! - `AttachmentKey` is always a single, safe path segment.
//! - `OwnerIdentity` is always a single, safe path segment.
//! - `AttachmentRef::Key` only exists between the record store and the
//!   resolver; readers see `Url` or `Absent`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

const MAX_ATTACHMENT_KEY_BYTES: usize = 255;
const ACCEPTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

static OWNER_IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9:._-]+$").expect("valid owner identity regex"));

/// Validation failures for user-supplied note fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteValidationError {
    #[error("note name is required")]
    EmptyName,
    #[error("note description is required")]
    EmptyDescription,
    #[error("invalid attachment key `{key}`: {reason}")]
    InvalidAttachmentKey { key: String, reason: &'static str },
    #[error("unsupported image type for `{0}`; expected png or jpeg")]
    UnsupportedImageType(String),
    #[error("invalid owner identity `{0}`")]
    InvalidOwnerIdentity(String),
}

/// Store-assigned note identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Mints a fresh id. Only record stores should call this.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl From<Uuid> for NoteId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque per-caller principal supplied by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerIdentity(String);

impl OwnerIdentity {
    pub fn new(value: impl Into<String>) -> Result<Self, NoteValidationError> {
        let value = value.into();
        if !OWNER_IDENTITY_RE.is_match(&value) || value == "." || value == ".." {
            return Err(NoteValidationError::InvalidOwnerIdentity(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerIdentity {
    type Error = NoteValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerIdentity> for String {
    fn from(value: OwnerIdentity) -> Self {
        value.0
    }
}

impl Display for OwnerIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blob location of an attachment, as persisted on a note.
///
/// Keys are the uploaded file name, not a content hash: two uploads with
/// the same name by the same owner share one blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttachmentKey(String);

impl AttachmentKey {
    pub fn new(value: impl Into<String>) -> Result<Self, NoteValidationError> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("key is empty")
        } else if value.len() > MAX_ATTACHMENT_KEY_BYTES {
            Some("key is longer than 255 bytes")
        } else if value == "." || value == ".." {
            Some("key is a relative path component")
        } else if value.contains(['/', '\\']) {
            Some("key contains a path separator")
        } else if value.chars().any(char::is_control) {
            Some("key contains control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(NoteValidationError::InvalidAttachmentKey { key: value, reason }),
            None => Ok(Self(value)),
        }
    }

    /// Builds a key from an uploaded file name.
    ///
    /// Returns `Ok(None)` when no file was chosen (blank name), and rejects
    /// anything that is not a png/jpeg by extension.
    pub fn from_upload_name(file_name: &str) -> Result<Option<Self>, NoteValidationError> {
        if file_name.trim().is_empty() {
            return Ok(None);
        }
        let key = Self::new(file_name)?;
        if !key.is_accepted_image() {
            return Err(NoteValidationError::UnsupportedImageType(key.0));
        }
        Ok(Some(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_accepted_image(&self) -> bool {
        self.0
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| ACCEPTED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }
}

impl TryFrom<String> for AttachmentKey {
    type Error = NoteValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AttachmentKey> for String {
    fn from(value: AttachmentKey) -> Self {
        value.0
    }
}

impl Display for AttachmentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time-limited, fetchable URL for a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedUrl(String);

impl ResolvedUrl {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResolvedUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Explicit form of the note image field at a given layer boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttachmentRef {
    /// Persisted blob location; never handed to readers.
    Key(AttachmentKey),
    /// Resolved, time-limited URL for readers.
    Url(ResolvedUrl),
    /// No image, or an orphaned key whose blob is missing.
    #[default]
    Absent,
}

impl AttachmentRef {
    pub fn from_stored(value: Option<AttachmentKey>) -> Self {
        value.map_or(Self::Absent, Self::Key)
    }

    pub fn key(&self) -> Option<&AttachmentKey> {
        match self {
            Self::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&ResolvedUrl> {
        match self {
            Self::Url(url) => Some(url),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Owner-scoped text note with an optional image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub name: String,
    pub description: String,
    pub image: AttachmentRef,
}

/// Rejects blank names/descriptions.
///
/// Whitespace-only values count as blank.
pub fn validate_note_fields(name: &str, description: &str) -> Result<(), NoteValidationError> {
    if name.trim().is_empty() {
        return Err(NoteValidationError::EmptyName);
    }
    if description.trim().is_empty() {
        return Err(NoteValidationError::EmptyDescription);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        validate_note_fields, AttachmentKey, AttachmentRef, Note, NoteId, NoteValidationError,
        OwnerIdentity, ResolvedUrl,
    };

    #[test]
    fn blank_fields_are_rejected() {
        assert_eq!(
            validate_note_fields("  ", "body"),
            Err(NoteValidationError::EmptyName)
        );
        assert_eq!(
            validate_note_fields("title", "\n\t"),
            Err(NoteValidationError::EmptyDescription)
        );
        assert!(validate_note_fields("title", "body").is_ok());
    }

    #[test]
    fn attachment_key_rejects_path_traversal() {
        for bad in ["", ".", "..", "a/b.png", "a\\b.png", "x\u{0}.png"] {
            assert!(
                matches!(
                    AttachmentKey::new(bad),
                    Err(NoteValidationError::InvalidAttachmentKey { .. })
                ),
                "`{bad}` should be rejected"
            );
        }
        assert!(AttachmentKey::new("my photo.jpg").is_ok());
    }

    #[test]
    fn upload_name_filters_image_types() {
        assert_eq!(AttachmentKey::from_upload_name("   ").unwrap(), None);
        assert_eq!(
            AttachmentKey::from_upload_name("Cat.JPEG")
                .unwrap()
                .unwrap()
                .as_str(),
            "Cat.JPEG"
        );
        assert!(matches!(
            AttachmentKey::from_upload_name("notes.txt"),
            Err(NoteValidationError::UnsupportedImageType(_))
        ));
        assert!(matches!(
            AttachmentKey::from_upload_name("png"),
            Err(NoteValidationError::UnsupportedImageType(_))
        ));
    }

    #[test]
    fn owner_identity_accepts_identity_pool_format() {
        assert!(OwnerIdentity::new("us-east-1:2f0c6a1e-aaaa-bbbb-cccc-123456789abc").is_ok());
        assert!(OwnerIdentity::new("..").is_err());
        assert!(OwnerIdentity::new("alice/bob").is_err());
        assert!(OwnerIdentity::new("").is_err());
    }

    #[test]
    fn attachment_ref_from_stored_value() {
        assert!(AttachmentRef::from_stored(None).is_absent());
        let key = AttachmentKey::new("a.png").unwrap();
        assert_eq!(AttachmentRef::from_stored(Some(key.clone())).key(), Some(&key));
    }

    #[test]
    fn note_json_tags_the_image_form() {
        let note = Note {
            id: NoteId::generate(),
            name: "Test".to_string(),
            description: "Hello".to_string(),
            image: AttachmentRef::Url(ResolvedUrl::new("https://m.test/media/a/b.png?x=1")),
        };

        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["image"]["kind"], "url");
        assert_eq!(json["image"]["value"], "https://m.test/media/a/b.png?x=1");
        assert_eq!(json["id"], note.id.to_string());

        let absent = serde_json::to_value(AttachmentRef::Absent).unwrap();
        assert_eq!(absent, serde_json::json!({ "kind": "absent" }));
    }
}
