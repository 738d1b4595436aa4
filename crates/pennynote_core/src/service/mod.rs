//! Core use-case services.
//!
//! # Responsibility
//! - Sequence record, blob and resolution calls into one logical operation.
//! - Keep UI collaborators decoupled from store details.

pub mod edit_session;
pub mod sync_orchestrator;
