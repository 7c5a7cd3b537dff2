//! Content unit and association domain model.
//!
//! # Responsibility
//! - Define the type-agnostic unit record and the repository join row.
//!
//! # Invariants
//! - Units are identified by `(type_id, unit_key)`; `id` is a surrogate
//!   assigned on first persistence.
//! - Removing an association never deletes the unit it points to.

pub mod association;
pub mod content_unit;
