//! Domain model for owner-scoped notes and their optional image attachment.
//!
//! # Responsibility
//! - Define canonical data structures shared by stores and the orchestrator.
//! - Model the stored-key vs resolved-url duality of `Note::image` explicitly.
//!
//! # Invariants
//! - Every note is identified by a store-assigned, immutable `NoteId`.
//! - Owner identity scopes records and blob paths but is not a note field.

pub mod note;
