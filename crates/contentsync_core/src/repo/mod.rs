//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Idempotency of unit creation, association and linking is enforced by
//!   unique constraints inside the repository, never by callers.
//! - Repository APIs return semantic errors (`UnitNotFound`) in addition to
//!   DB transport errors.

pub mod association_repo;
pub mod unit_repo;
