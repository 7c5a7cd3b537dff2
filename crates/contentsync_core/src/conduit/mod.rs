//! Facades consumed by synchronization plugins.

pub mod repo_sync;
