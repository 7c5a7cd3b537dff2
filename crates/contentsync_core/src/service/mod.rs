//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Validate units against registered type definitions.
//! - Map repository failures into the `ContentError` taxonomy.

pub mod association_service;
pub mod error;
pub mod linking_service;
pub mod unit_service;
