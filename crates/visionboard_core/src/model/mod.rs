//! Domain model for vision board cards.
//!
//! # Responsibility
//! - Define the canonical `Dream` record shared by store, board and FFI.
//!
//! # Invariants
//! - Every Dream is identified by a stable, non-nil `DreamId`.
//! - Deletion is a hard delete; there are no tombstones in the model.

pub mod dream;
