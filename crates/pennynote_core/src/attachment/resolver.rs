//! Attachment key to time-limited URL resolution.
//!
//! # Responsibility
//! - Mint HMAC-signed, expiring URLs for owner-scoped blobs.
//! - Verify such URLs and map them back to the blob they point at.
//!
//! # Invariants
//! - A missing blob resolves to `None`, never to an error.
//! - Two resolutions of the same key always point at the same `BlobPath`;
//!   only `expires`/`signature` may differ.
//! - URLs are never cached here; every call signs afresh.

use crate::attachment::store::{AttachmentStore, BlobPath, StorageError, MEDIA_PREFIX};
use crate::model::note::{AttachmentKey, NoteValidationError, OwnerIdentity, ResolvedUrl};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

const EXPIRES_PARAM: &str = "expires";
const SIGNATURE_PARAM: &str = "signature";

/// Signed URL verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("url is not a media url of this resolver: {0}")]
    InvalidUrl(String),
    #[error("url expired at {expires_at}")]
    Expired { expires_at: i64 },
    #[error("url signature does not match")]
    InvalidSignature,
    #[error(transparent)]
    InvalidPath(#[from] NoteValidationError),
}

/// Converts stored attachment keys into retrievable URLs.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    /// Returns a fresh time-limited URL, or `None` if the blob is missing.
    ///
    /// `Err` only reports transport failures of the underlying store.
    async fn resolve(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
    ) -> Result<Option<ResolvedUrl>, StorageError>;
}

/// Mints and verifies HMAC-SHA256 signed media URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
    ttl: Duration,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs `path` so that it stays valid until `now + ttl`.
    pub fn sign(&self, path: &BlobPath, now_unix: i64) -> ResolvedUrl {
        let expires = now_unix.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX));
        let signature = URL_SAFE_NO_PAD.encode(self.mac_for(path, expires).finalize().into_bytes());
        ResolvedUrl::new(format!(
            "{}/{MEDIA_PREFIX}/{}/{}?{EXPIRES_PARAM}={expires}&{SIGNATURE_PARAM}={signature}",
            self.base_url,
            urlencoding::encode(path.owner().as_str()),
            urlencoding::encode(path.key().as_str()),
        ))
    }

    /// Checks signature and expiry of `url`, returning the blob it names.
    pub fn verify(&self, url: &str, now_unix: i64) -> Result<BlobPath, ResolveError> {
        let invalid = || ResolveError::InvalidUrl(url.to_string());

        let rest = url
            .strip_prefix(self.base_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.strip_prefix(MEDIA_PREFIX))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let (path_part, query) = rest.split_once('?').ok_or_else(invalid)?;
        let (owner_part, key_part) = path_part.split_once('/').ok_or_else(invalid)?;

        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some((EXPIRES_PARAM, value)) => expires = value.parse::<i64>().ok(),
                Some((SIGNATURE_PARAM, value)) => signature = Some(value),
                _ => return Err(invalid()),
            }
        }
        let expires = expires.ok_or_else(invalid)?;
        let signature = signature
            .and_then(|value| URL_SAFE_NO_PAD.decode(value).ok())
            .ok_or(ResolveError::InvalidSignature)?;

        let owner = OwnerIdentity::new(decode_segment(owner_part).ok_or_else(invalid)?)?;
        let key = AttachmentKey::new(decode_segment(key_part).ok_or_else(invalid)?)?;
        let path = BlobPath::new(&owner, &key);

        self.mac_for(&path, expires)
            .verify_slice(&signature)
            .map_err(|_| ResolveError::InvalidSignature)?;
        if now_unix >= expires {
            return Err(ResolveError::Expired {
                expires_at: expires,
            });
        }
        Ok(path)
    }

    fn mac_for(&self, path: &BlobPath, expires: i64) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("hmac accepts keys of any length");
        mac.update(path.to_string().as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }
}

/// Resolver that checks blob existence, then signs a URL for it.
pub struct SignedUrlResolver {
    store: Arc<dyn AttachmentStore>,
    signer: UrlSigner,
    clock: fn() -> i64,
}

impl SignedUrlResolver {
    pub fn new(store: Arc<dyn AttachmentStore>, signer: UrlSigner) -> Self {
        Self::with_clock(store, signer, now_unix)
    }

    /// Same as `new` with an injected unix-seconds clock.
    pub fn with_clock(store: Arc<dyn AttachmentStore>, signer: UrlSigner, clock: fn() -> i64) -> Self {
        Self {
            store,
            signer,
            clock,
        }
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }
}

#[async_trait]
impl AttachmentResolver for SignedUrlResolver {
    async fn resolve(
        &self,
        owner: &OwnerIdentity,
        key: &AttachmentKey,
    ) -> Result<Option<ResolvedUrl>, StorageError> {
        let Some(handle) = self.store.get(owner, key).await? else {
            debug!(
                "event=attachment_resolve module=attachment status=absent owner={owner} key={key}"
            );
            return Ok(None);
        };
        let url = self.signer.sign(&handle.path, (self.clock)());
        trace!("event=attachment_resolve module=attachment status=ok path={}", handle.path);
        Ok(Some(url))
    }
}

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Decodes one path segment, accepting only the form `sign` produces.
fn decode_segment(value: &str) -> Option<String> {
    let decoded = urlencoding::decode(value).ok()?;
    (urlencoding::encode(&decoded) == value).then(|| decoded.into_owned())
}
