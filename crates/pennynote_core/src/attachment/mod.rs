//! Owner-scoped blob storage for note images and URL resolution.
//!
//! # Responsibility
//! - Put/get image blobs at `media/{owner}/{key}`.
//! - Turn stored attachment keys into time-limited URLs.
//!
//! # Invariants
//! - Blob paths are always derived through `BlobPath`; no caller builds them.
//! - A missing blob is a normal state, never a storage error.

pub mod resolver;
pub mod store;
