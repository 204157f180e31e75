//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts for Dreams, history and sync bookkeeping.
//! - Isolate SQLite query details from the object store.
//!
//! # Invariants
//! - Repository writes enforce `Dream::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod dream_repo;
pub mod history_repo;
pub mod sync_state_repo;
