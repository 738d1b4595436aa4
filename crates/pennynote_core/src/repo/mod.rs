//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the owner-scoped note record store contract.
//! - Isolate SQLite query details from orchestration.
//!
//! # Invariants
//! - Write paths validate note fields before SQL mutations.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod note_repo;
