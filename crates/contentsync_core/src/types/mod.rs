//! Pluggable content type schemas.
//!
//! # Responsibility
//! - Describe content types as data (`TypeDefinition`) instead of compiled
//!   per-type structures.
//! - Provide the lookup every store uses to validate unit keys.

pub mod definition;
pub mod registry;
